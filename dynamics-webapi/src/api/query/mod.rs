//! OData Query Composition Module
//!
//! Renders a [`Request`](crate::api::Request) into a relative path and query
//! string: system query options, vendor extensions, `$expand` entries and
//! function parameter aliases.

pub mod builder;
pub mod expand;
pub mod filters;
pub mod function;

pub use builder::{ComposedQuery, compose};
pub use expand::render_expand;
pub use filters::{encode_component, normalize_guids, render_filter};
pub use function::render_function;
