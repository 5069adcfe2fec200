//! Operations, request assembly and batching
//!
//! Every call is assembled into the same [`AssembledRequest`] record, whether
//! it is sent on its own or queued into a batch.

pub mod batch;
pub mod operation;
pub mod request;

pub use batch::{BatchEnvelope, BatchPart, BatchQueue, EncodedBatch, ResponsePart};
pub use operation::{Operation, OperationResult};
pub use request::{AssembledRequest, assemble};
