//! Dynamics 365 Web API translation layer
//!
//! Turns [`Request`] descriptors into concrete HTTP calls and raw responses,
//! including `$batch` envelopes, back into normalized JSON.

pub mod client;
pub mod constants;
pub mod error;
pub mod headers;
pub mod models;
pub mod operations;
pub mod query;
pub mod response;
pub mod transport;
pub mod validation;

pub use client::DynamicsClient;
pub use error::{ProtocolError, TransportError, TransportErrorCode, WebApiError};
pub use models::{Expand, Request};
pub use operations::{AssembledRequest, Operation, OperationResult};
pub use response::{PagingInfo, ParsedResponse, fetch_xml_with_paging};
pub use transport::{AbortSignal, HttpRequest, HttpResponse, ReqwestTransport, Transport};
