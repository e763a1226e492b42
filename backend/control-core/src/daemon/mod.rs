//! Daemon process supervision and discovery.
//!
//! This module provides functionality for:
//! - Launching the daemon as a child process and stopping it again ([`supervisor`])
//! - Finding a daemon started elsewhere and reconciling its real control port,
//!   data directory and cookie file with our configuration ([`discovery`])
//! - The OS introspection both rely on, behind the [`probe::SystemProbe`] trait

pub mod discovery;
pub mod probe;
pub mod supervisor;

pub use discovery::{DiscoveryResult, discover};
pub use probe::{NativeProbe, ProcessSnapshot, SystemProbe};
pub use supervisor::{LaunchOutcome, Launcher, ProcessSupervisor, SystemLauncher};
