//! Foundation types for the noema engine.
//!
//! This module provides fundamental types used throughout the crate:
//! - [`Name`] - Process-wide interned strings (atom values, variable names)
//! - [`IdGen`] - Monotonic id minting with role prefixes
//! - [`Config`] - Recognized engine options and their defaults
//! - [`RunGate`] - Pause/resume/stop gate shared by all workers
//!
//! This module has NO dependencies on other noema modules.

mod config;
mod gate;
mod ids;
mod intern;

pub use config::Config;
pub use gate::RunGate;
pub use ids::{IdGen, now_millis};
pub use intern::Name;
