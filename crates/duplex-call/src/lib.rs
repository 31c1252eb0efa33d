#![doc = include_str!("../README.md")]

mod adapter;
mod call;
mod completion;
mod context;
mod error;
pub mod grpc;
pub mod memory;
mod options;
mod sink;
mod source;
mod telemetry;
#[cfg(test)]
mod testing;
mod transport;

pub use crate::adapter::*;
pub use crate::call::*;
pub use crate::completion::*;
pub use crate::context::*;
pub use crate::error::*;
pub use crate::options::*;
pub use crate::sink::*;
pub use crate::source::*;
pub use crate::transport::*;
