//! Core types shared by every layer.
//!
//! - [`ConnState`] and [`error_filter`] for lifecycle reporting and error triage
//! - [`NetworkProtocol`] and [`Endpoint`] for addressing
//! - [`Callbacks`] for observability
//! - error enums and constants

pub mod constants;

mod callback;
mod endpoint;
mod error;
mod protocol;
mod state;

pub use callback::*;
pub use endpoint::*;
pub use error::*;
pub use protocol::*;
pub use state::*;
