//! # hud-core
//!
//! Shared foundation for the claude-hud engine crates:
//! - [`HudError`] / [`ErrorCode`] - error taxonomy for all engine operations
//! - [`logging`] - tracing setup and log management
//! - [`clock`] - injectable wall-clock for deterministic tests

pub mod clock;
pub mod error;
pub mod logging;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use error::{ErrorCode, HudError, Result};
pub use logging::{init_logging, init_test_logging, LogGuard};
