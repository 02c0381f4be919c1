//! # gantry-rpc
//!
//! The flat 38-action dispatcher over the workflow engine and process
//! supervisor: envelope types, a registry of `ActionHandler`s, shared
//! parameter normalization, and stable error codes.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod types;

pub use context::ActionContext;
pub use errors::ActionError;
pub use handlers::register_all;
pub use registry::{ActionHandler, ActionRegistry};
pub use types::{ActionErrorBody, ActionRequest, ActionResponse};
