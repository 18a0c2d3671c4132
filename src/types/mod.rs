//! Public types for the Tollgate API.

mod params;
mod payload;

pub use params::{ParamValue, RequestParams};
pub use payload::{GateResponse, Payload};
