//! Remote inspector bridge.
//!
//! Accepts a single TCP client speaking the length-prefixed binary plist protocol of the web
//! inspector and routes its messages to registered inspection targets. Each target that allows
//! remote debugging is advertised to the client through a coalesced listing broadcast.

pub mod config;
pub mod error;
pub mod inspector;
pub mod log;
pub mod protocol;
pub mod transport;

pub use error::Error;
pub use inspector::RemoteInspector;
