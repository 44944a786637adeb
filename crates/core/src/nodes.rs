//! Peer relay nodes the mesh process connects through.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Relay used when neither configuration nor the caller provides any.
pub const DEFAULT_NODE: &str = "tcp://public.easytier.cn:11010";

/// URL schemes accepted for custom nodes.
pub const SUPPORTED_SCHEMES: [&str; 5] = ["tcp", "udp", "ws", "wss", "quic"];

/// A reachable relay, e.g. `tcp://relay.example.net:11010`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDescriptor {
	pub url: String,
}

impl NodeDescriptor {
	pub fn new(url: impl Into<String>) -> Self {
		Self { url: url.into() }
	}

	/// Validates `<scheme>://<host>:<port>` and builds a descriptor.
	pub fn parse(input: &str) -> Result<Self> {
		let node = input.trim();
		let invalid = |reason| Error::InvalidNode {
			node: node.to_string(),
			reason,
		};

		let (scheme, rest) = node.split_once("://").ok_or_else(|| invalid("expected <scheme>://<host>:<port>"))?;
		if !SUPPORTED_SCHEMES.contains(&scheme) {
			return Err(invalid("unsupported scheme"));
		}
		let (host, port) = rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
		if host.is_empty() || host.contains('/') {
			return Err(invalid("missing host"));
		}
		if port.parse::<u16>().is_err() {
			return Err(invalid("port must be a number between 0 and 65535"));
		}
		Ok(Self::new(node))
	}
}

/// Parses a caller-provided node list, failing on the first invalid entry.
///
/// Repeated entries are kept once, in first-seen order.
pub fn parse_custom_nodes<S: AsRef<str>>(nodes: &[S]) -> Result<Vec<NodeDescriptor>> {
	let mut seen = HashSet::new();
	let mut parsed = Vec::with_capacity(nodes.len());
	for node in nodes {
		let node = NodeDescriptor::parse(node.as_ref())?;
		if seen.insert(node.url.clone()) {
			parsed.push(node);
		}
	}
	Ok(parsed)
}

/// Source of relay nodes for a new session.
#[async_trait]
pub trait NodeResolver: Send + Sync {
	/// Returns the currently reachable nodes; may be empty.
	async fn available_nodes(&self) -> Result<Vec<NodeDescriptor>>;
}

/// Resolver returning a fixed list.
#[derive(Debug, Clone)]
pub struct StaticNodeResolver {
	nodes: Vec<NodeDescriptor>,
}

impl StaticNodeResolver {
	pub fn new(nodes: Vec<NodeDescriptor>) -> Self {
		Self { nodes }
	}
}

impl Default for StaticNodeResolver {
	fn default() -> Self {
		Self::new(vec![NodeDescriptor::new(DEFAULT_NODE)])
	}
}

#[async_trait]
impl NodeResolver for StaticNodeResolver {
	async fn available_nodes(&self) -> Result<Vec<NodeDescriptor>> {
		Ok(self.nodes.clone())
	}
}
