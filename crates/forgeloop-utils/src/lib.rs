//! Foundation utilities shared by every forgeloop crate
//!
//! - [`error`]: the error taxonomy and user-facing rendering
//! - [`exit_codes`]: process exit codes derived from errors
//! - [`logging`]: tracing initialisation and structured log helpers
//! - [`atomic_write`]: temp file + fsync + rename writes
//! - [`types`]: small shared enums

pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod types;

pub use error::{ForgeError, UserFriendlyError};
pub use exit_codes::ExitCode;
pub use types::{CollaboratorRole, ConfigSource};
