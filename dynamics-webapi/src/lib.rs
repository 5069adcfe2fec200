//! Request/response translation for the Dynamics 365 (Dataverse) Web API

pub mod api;
pub mod config;

pub use api::{
    AbortSignal, DynamicsClient, Expand, Operation, OperationResult, PagingInfo, ParsedResponse, Request,
    WebApiError,
};
pub use config::{BypassConfig, ClientConfig};
