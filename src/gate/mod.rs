//! Gate construction and execution

mod builder;
mod request_gate;

pub use builder::{GateBuilder, Tollgate};
pub use request_gate::RequestGate;
