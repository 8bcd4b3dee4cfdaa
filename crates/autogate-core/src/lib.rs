//! Shared building blocks for the autogate controller: the error taxonomy,
//! the transient-fault classification used by retry policies, runtime
//! configuration and default constants.

pub mod config;
pub mod constants;
pub mod error;

pub use config::AppConfig;
pub use error::{BoxError, Error, Result, TransientFault};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
