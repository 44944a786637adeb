//! Peer-to-peer LAN tunnel sessions over a supervised mesh process.
//!
//! [`SessionService`] is the entry point. It mints or parses invitation codes,
//! resolves relay nodes, builds the mesh command line and hands it to the
//! [`ProcessSupervisor`](lanbridge_runtime::ProcessSupervisor), which owns the
//! child process and the single authoritative [`Status`].

pub mod arguments;
pub mod config;
pub mod error;
pub mod invitation;
pub mod locate;
pub mod nodes;
pub mod session;

pub use arguments::{ArgumentGenerator, ArgumentRequest, EasyTierArguments, HOST_IP, HostIdentity};
pub use config::LanbridgeConfig;
pub use error::{Error, ErrorKind, Result};
pub use invitation::{InvitationCodec, InvitationData, InvitationError, TokenCodec};
pub use lanbridge_protocol::{FaultKind, LogEntry, LogLevel, LogSource, ProcessFault, Role, SessionInfo, Status, SupervisorEvent};
pub use lanbridge_runtime::{Platform, ProcessSupervisor, SupervisorConfig};
pub use nodes::{NodeDescriptor, NodeResolver, StaticNodeResolver};
pub use session::SessionService;
