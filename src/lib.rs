//! Callculon - scheduled HTTP health checks
//!
//! Sends a single GET to a configured endpoint, classifies the response and reports
//! the outcome to Slack. Paths, headers and webhooks may reference secrets with
//! `identifier(token)` tokens that are resolved against a secret store at run time.

pub mod config;
pub mod duration;
pub mod error;
pub mod invoker;
pub mod notify;
pub mod secrets;
pub mod templates;

pub use config::{Configuration, HandlerOptions};
pub use error::*;
pub use invoker::{CheckOutcome, InvocationResult, Invoker};
