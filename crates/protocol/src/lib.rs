//! Wire types for the lanbridge supervisor.
//!
//! This crate contains the serde-serializable values that cross the boundary
//! between the process supervisor and whatever interface layer forwards its
//! state to a display surface.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and a few predicates
//! * Snapshot-friendly: Every type is `Clone` so callers get owned copies
//! * Stable: Field names match the camelCase shape the interface layer expects
//!
//! Lifecycle behavior lives in `lanbridge-runtime`.

pub mod event;
pub mod log;
pub mod session;
pub mod status;

pub use event::*;
pub use log::*;
pub use session::*;
pub use status::*;
