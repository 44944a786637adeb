//! Command-line generation for the mesh executable.

use lanbridge_protocol::Role;

use crate::error::{Error, Result};
use crate::invitation::InvitationData;
use crate::nodes::NodeDescriptor;

/// Fixed virtual address of the room host.
pub const HOST_IP: &str = "10.114.114.114";

/// Hostname handed to the mesh process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostIdentity {
	/// Used verbatim.
	Full(String),
	/// Appended to the role's default prefix.
	Suffix(String),
}

/// Everything an [`ArgumentGenerator`] needs to build a command line.
#[derive(Debug, Clone)]
pub struct ArgumentRequest {
	pub invitation_code: String,
	pub invitation: InvitationData,
	pub nodes: Vec<NodeDescriptor>,
	pub role: Role,
	pub hostname: HostIdentity,
	/// Port a client forwards from localhost to the host's service.
	pub port_to_forward: Option<u16>,
}

/// Produces the argument vector passed to the mesh executable.
pub trait ArgumentGenerator: Send + Sync {
	fn generate(&self, request: &ArgumentRequest) -> Result<Vec<String>>;
}

/// Generator for the `easytier-core` command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct EasyTierArguments;

impl EasyTierArguments {
	fn hostname(request: &ArgumentRequest) -> String {
		match (&request.hostname, request.role) {
			(HostIdentity::Full(name), _) => name.clone(),
			(HostIdentity::Suffix(suffix), Role::Host) => format!("Server{suffix}"),
			(HostIdentity::Suffix(suffix), Role::Client) => format!("Client{suffix}"),
		}
	}
}

impl ArgumentGenerator for EasyTierArguments {
	fn generate(&self, request: &ArgumentRequest) -> Result<Vec<String>> {
		let invitation = &request.invitation;
		if invitation.network_name.is_empty() || invitation.network_secret.is_empty() {
			return Err(Error::Arguments("invitation carries no network identity".to_string()));
		}

		let mut args = vec![
			"--network-name".to_string(),
			invitation.network_name.clone(),
			"--network-secret".to_string(),
			invitation.network_secret.clone(),
			"--hostname".to_string(),
			Self::hostname(request),
		];

		match request.role {
			Role::Host => {
				args.push("--ipv4".to_string());
				args.push(HOST_IP.to_string());
			}
			Role::Client => {
				args.push("--dhcp".to_string());
				if let Some(port) = request.port_to_forward {
					for proto in ["tcp", "udp"] {
						args.push("--port-forward".to_string());
						args.push(format!("{proto}://0.0.0.0:{port}/{HOST_IP}:{port}"));
					}
				}
			}
		}

		for node in &request.nodes {
			args.push("-p".to_string());
			args.push(node.url.clone());
		}

		Ok(args)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(role: Role, hostname: HostIdentity, port_to_forward: Option<u16>) -> ArgumentRequest {
		ArgumentRequest {
			invitation_code: "LB1.x".to_string(),
			invitation: InvitationData {
				network_name: "lb-abcdefgh".to_string(),
				network_secret: "s3cr3t".to_string(),
				port: 25565,
				attachment: None,
			},
			nodes: vec![NodeDescriptor::new("tcp://a:1"), NodeDescriptor::new("udp://b:2")],
			role,
			hostname,
			port_to_forward,
		}
	}

	fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
		args.iter().position(|arg| arg == flag).map(|i| args[i + 1].as_str())
	}

	#[test]
	fn host_gets_fixed_address() {
		let args = EasyTierArguments
			.generate(&request(Role::Host, HostIdentity::Full("Server-AB12C".into()), None))
			.unwrap();
		assert_eq!(value_after(&args, "--ipv4"), Some(HOST_IP));
		assert_eq!(value_after(&args, "--hostname"), Some("Server-AB12C"));
		assert_eq!(value_after(&args, "--network-name"), Some("lb-abcdefgh"));
		assert!(!args.contains(&"--dhcp".to_string()));
		assert_eq!(args.iter().filter(|arg| *arg == "-p").count(), 2);
	}

	#[test]
	fn client_forwards_port_over_tcp_and_udp() {
		let args = EasyTierArguments
			.generate(&request(Role::Client, HostIdentity::Suffix("-steve".into()), Some(25565)))
			.unwrap();
		assert!(args.contains(&"--dhcp".to_string()));
		assert_eq!(value_after(&args, "--hostname"), Some("Client-steve"));
		assert!(args.contains(&"tcp://0.0.0.0:25565/10.114.114.114:25565".to_string()));
		assert!(args.contains(&"udp://0.0.0.0:25565/10.114.114.114:25565".to_string()));
	}

	#[test]
	fn missing_identity_is_rejected() {
		let mut req = request(Role::Host, HostIdentity::Full("h".into()), None);
		req.invitation.network_secret.clear();
		assert!(matches!(EasyTierArguments.generate(&req), Err(Error::Arguments(_))));
	}
}
