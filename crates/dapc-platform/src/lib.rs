//! dapc-platform: directories and log-file helpers for dapc.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::PlatformError;
pub use paths::{DefaultPaths, PlatformPaths};
