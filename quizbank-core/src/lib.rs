//! Quizbank Core - domain types, storage traits, errors and configuration
//!
//! Shared by the HTTP server and its tests; contains no transport code.

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
