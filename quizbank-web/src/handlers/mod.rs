//! HTTP request handlers that are not tied to a domain module

pub mod health;
pub mod menu;
pub mod response;

pub use health::*;
pub use menu::*;
pub use response::*;
