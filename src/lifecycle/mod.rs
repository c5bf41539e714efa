//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Ctrl+C / SIGTERM
//!     → shutdown.rs (broadcast)
//!     → reload loop, admin server, metrics exporter stop
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
