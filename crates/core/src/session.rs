//! Session facade: the public create / join / disconnect / reset surface.

use std::sync::Arc;
use std::time::Duration;

use lanbridge_protocol::{LogEntry, LogLevel, Role, SessionInfo, Status, SupervisorEvent};
use lanbridge_runtime::process::port_available;
use lanbridge_runtime::{Credential, OperationTicket, ProcessSupervisor};
use rand::Rng;
use tokio::sync::broadcast;
use tracing::info;

use crate::arguments::{ArgumentGenerator, ArgumentRequest, EasyTierArguments, HOST_IP, HostIdentity};
use crate::config::{DEFAULT_NODE_TIMEOUT_MS, LanbridgeConfig};
use crate::error::{Error, Result};
use crate::invitation::{InvitationCodec, InvitationData, TokenCodec};
use crate::nodes::{self, NodeDescriptor, NodeResolver, StaticNodeResolver};

const HOSTNAME_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const HOSTNAME_ID_LEN: usize = 5;

/// Public entry point for running a single mesh session.
///
/// Cheap to clone; clones drive the same supervisor.
#[derive(Clone)]
pub struct SessionService {
	supervisor: ProcessSupervisor,
	codec: Arc<dyn InvitationCodec>,
	resolver: Arc<dyn NodeResolver>,
	generator: Arc<dyn ArgumentGenerator>,
	node_timeout: Duration,
}

impl SessionService {
	/// Creates a service with the default codec, resolver and generator.
	pub fn new(supervisor: ProcessSupervisor) -> Self {
		Self {
			supervisor,
			codec: Arc::new(TokenCodec::new()),
			resolver: Arc::new(StaticNodeResolver::default()),
			generator: Arc::new(EasyTierArguments),
			node_timeout: Duration::from_millis(DEFAULT_NODE_TIMEOUT_MS),
		}
	}

	/// Resolves the executable and builds a service from `config`.
	pub fn from_config(config: &LanbridgeConfig) -> Result<Self> {
		let executable = config.resolve_executable()?;
		let supervisor = ProcessSupervisor::new(config.supervisor_config(executable));
		Ok(Self::new(supervisor)
			.with_resolver(StaticNodeResolver::new(config.relay_nodes()?))
			.with_node_timeout(config.node_timeout()))
	}

	pub fn with_codec(mut self, codec: impl InvitationCodec + 'static) -> Self {
		self.codec = Arc::new(codec);
		self
	}

	pub fn with_resolver(mut self, resolver: impl NodeResolver + 'static) -> Self {
		self.resolver = Arc::new(resolver);
		self
	}

	pub fn with_generator(mut self, generator: impl ArgumentGenerator + 'static) -> Self {
		self.generator = Arc::new(generator);
		self
	}

	pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
		self.node_timeout = timeout;
		self
	}

	pub fn supervisor(&self) -> &ProcessSupervisor {
		&self.supervisor
	}

	/// Hosts a new room forwarding the local service on `port`.
	///
	/// `custom_nodes`, when non-empty, replaces the resolver's relay list.
	pub async fn create_session(&self, port: u16, label: Option<&str>, custom_nodes: &[String]) -> Result<SessionInfo> {
		let ticket = self.supervisor.admit("create session")?;
		info!(target = "lanbridge.session", port, label = ?label, "create session");
		self.supervisor.log_for(ticket, LogLevel::Info, "Creating room as host...");
		let prepared = self.prepare_host(ticket, port, label, custom_nodes).await;
		self.launch(ticket, prepared).await
	}

	/// Joins the room described by `invitation_code` as `player_name`.
	pub async fn join_session(&self, invitation_code: &str, player_name: &str, custom_nodes: &[String]) -> Result<SessionInfo> {
		let ticket = self.supervisor.admit("join session")?;
		info!(target = "lanbridge.session", player = player_name, "join session");
		self.supervisor.log_for(ticket, LogLevel::Info, "Joining room as client...");
		let prepared = self.prepare_client(ticket, invitation_code, player_name, custom_nodes).await;
		self.launch(ticket, prepared).await
	}

	/// Stops the running session. A warning-only no-op when already disconnected.
	pub async fn disconnect(&self) -> Result<()> {
		info!(target = "lanbridge.session", status = %self.supervisor.status(), "disconnect");
		self.supervisor.disconnect().await?;
		Ok(())
	}

	/// Returns to `IDLE` unconditionally. Never fails.
	pub fn reset(&self) {
		self.supervisor.reset();
	}

	pub fn status(&self) -> Status {
		self.supervisor.status()
	}

	pub fn session(&self) -> Option<SessionInfo> {
		self.supervisor.session()
	}

	pub fn logs(&self) -> Vec<LogEntry> {
		self.supervisor.logs()
	}

	pub fn clear_logs(&self) {
		self.supervisor.clear_logs();
	}

	pub fn pid(&self) -> Option<u32> {
		self.supervisor.pid()
	}

	pub fn requires_elevation(&self) -> bool {
		self.supervisor.requires_elevation()
	}

	pub fn set_credential(&self, secret: impl Into<String>) {
		self.supervisor.set_credential(Credential::new(secret));
	}

	pub fn clear_credential(&self) {
		self.supervisor.clear_credential();
	}

	pub fn has_credential(&self) -> bool {
		self.supervisor.has_credential()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
		self.supervisor.subscribe()
	}

	async fn launch(&self, ticket: OperationTicket, prepared: Result<(SessionInfo, Vec<String>)>) -> Result<SessionInfo> {
		let (session, args) = match prepared {
			Ok(prepared) => prepared,
			Err(err) => {
				if !err.is_superseded() {
					self.supervisor.fail_launch(ticket, &err);
				}
				return Err(err);
			}
		};
		self.supervisor.attach_session(ticket, session.clone())?;
		self.supervisor.start(ticket, args).await?;
		Ok(session)
	}

	async fn prepare_host(&self, ticket: OperationTicket, port: u16, label: Option<&str>, custom_nodes: &[String]) -> Result<(SessionInfo, Vec<String>)> {
		let code = self.codec.encode(port, label)?;
		let invitation = self.codec.decode(&code)?;
		self.supervisor.log_for(ticket, LogLevel::Info, format!("Generated invitation code: {code}"));
		if let Some(label) = label {
			self.supervisor.log_for(ticket, LogLevel::Info, format!("Room name: {label}"));
		}
		if port_available(port) {
			self.supervisor.log_for(
				ticket,
				LogLevel::Warn,
				format!("Nothing is listening on port {port} yet; players cannot reach the game until it is started"),
			);
		}

		let nodes = self.resolve_nodes(ticket, custom_nodes).await?;
		let hostname = format!("Server-{}", random_id());
		self.supervisor.log_for(ticket, LogLevel::Info, format!("Host hostname: {hostname}"));

		let args = self.generator.generate(&ArgumentRequest {
			invitation_code: code.clone(),
			invitation: invitation.clone(),
			nodes,
			role: Role::Host,
			hostname: HostIdentity::Full(hostname),
			port_to_forward: None,
		})?;
		Ok((session_info(code, invitation, Role::Host, None), args))
	}

	async fn prepare_client(
		&self,
		ticket: OperationTicket,
		code: &str,
		player_name: &str,
		custom_nodes: &[String],
	) -> Result<(SessionInfo, Vec<String>)> {
		let invitation = self.codec.decode(code)?;
		self.supervisor.log_for(ticket, LogLevel::Info, format!("Parsed invitation code: {code}"));

		let nodes = self.resolve_nodes(ticket, custom_nodes).await?;
		let suffix = format!("-{player_name}");
		self.supervisor.log_for(ticket, LogLevel::Info, format!("Client hostname suffix: {suffix}"));

		let args = self.generator.generate(&ArgumentRequest {
			invitation_code: code.to_string(),
			invitation: invitation.clone(),
			nodes,
			role: Role::Client,
			hostname: HostIdentity::Suffix(suffix),
			port_to_forward: Some(invitation.port),
		})?;
		Ok((session_info(code.to_string(), invitation, Role::Client, Some(player_name.to_string())), args))
	}

	async fn resolve_nodes(&self, ticket: OperationTicket, custom_nodes: &[String]) -> Result<Vec<NodeDescriptor>> {
		if !custom_nodes.is_empty() {
			let nodes = nodes::parse_custom_nodes(custom_nodes)?;
			self.supervisor.log_for(ticket, LogLevel::Info, format!("Using {} custom nodes", nodes.len()));
			return Ok(nodes);
		}

		self.supervisor.log_for(ticket, LogLevel::Info, "Fetching available nodes...");
		let nodes = tokio::time::timeout(self.node_timeout, self.resolver.available_nodes())
			.await
			.map_err(|_| Error::NodeTimeout(self.node_timeout))??;
		self.supervisor.log_for(ticket, LogLevel::Info, format!("Found {} available nodes", nodes.len()));
		Ok(nodes)
	}
}

fn session_info(code: String, invitation: InvitationData, role: Role, player_name: Option<String>) -> SessionInfo {
	SessionInfo {
		invitation_code: code,
		network_name: invitation.network_name,
		network_secret: invitation.network_secret,
		port: invitation.port,
		role,
		host_ip: HOST_IP.to_string(),
		player_name,
		room_label: invitation.attachment,
	}
}

/// Five characters from `[0-9A-Z]`.
fn random_id() -> String {
	let mut rng = rand::rng();
	(0..HOSTNAME_ID_LEN)
		.map(|_| HOSTNAME_ALPHABET[rng.random_range(0..HOSTNAME_ALPHABET.len())] as char)
		.collect()
}
