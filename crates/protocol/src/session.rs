//! Session descriptor returned to callers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the room this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Host,
	Client,
}

impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Role::Host => "host",
			Role::Client => "client",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Metadata for the single active network room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
	/// Token exchanged out-of-band between host and clients.
	pub invitation_code: String,
	/// Virtual network identity shared by all members.
	pub network_name: String,
	/// Secret authenticating members of the virtual network.
	pub network_secret: String,
	/// Port of the hosted service.
	pub port: u16,
	pub role: Role,
	/// Fixed virtual address the host is reachable at.
	pub host_ip: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub player_name: Option<String>,
	/// Room label carried inside the invitation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub room_label: Option<String>,
}
