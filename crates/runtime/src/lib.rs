//! Lifecycle supervision for the external mesh executable.
//!
//! The [`ProcessSupervisor`] owns the single child process of a session. It
//! drives the [`StatusMachine`], records child output into the bounded
//! [`LogBuffer`], and publishes every change through the [`EventBus`].
//! Platform-specific launch decisions live in [`elevation`].

pub mod config;
pub mod elevation;
pub mod error;
pub mod events;
pub mod log_buffer;
pub mod process;
pub mod status;
pub mod supervisor;

pub use config::{Platform, SupervisorConfig};
pub use elevation::{Credential, LaunchPlan, requires_elevation};
pub use error::{Error, ErrorKind, ExitReport, Result};
pub use events::EventBus;
pub use log_buffer::LogBuffer;
pub use status::{StatusChange, StatusMachine};
pub use supervisor::{OperationTicket, ProcessSupervisor};
