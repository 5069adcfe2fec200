//! Response normalization

pub mod annotations;
pub mod dates;
pub mod paging;
pub mod parser;

pub use dates::parse_date_literal;
pub use paging::{PagingInfo, fetch_xml_with_paging};
pub use parser::{ParseOptions, ParsedResponse, parse_body, parse_response};
