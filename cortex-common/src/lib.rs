//! Ambient stack shared by every CORTEX crate: error kinds, structured
//! logging bootstrap, environment configuration and an injectable clock.
//!
//! Business logic crates depend only on this crate for cross-cutting
//! concerns; nothing here knows about HTTP, Docker, or storage engines.

pub mod clock;
pub mod config_env;
pub mod error;
pub mod logging;
pub mod request_id;
pub mod retry;

pub use clock::Clock;
pub use error::{CortexError, ErrorKind};
pub use request_id::RequestId;
