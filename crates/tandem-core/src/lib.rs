//! Tandem core library
//!
//! Normalizes three vendor streaming protocols into one event model, dispatches
//! tool calls through a validating executor, and runs parallel subagent loops.

pub mod agent;
pub mod ai;
pub mod config;
pub mod error;
pub mod mcp;
pub mod paths;
pub mod tools;

pub use error::{CoreError, CoreResult};
