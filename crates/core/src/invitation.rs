//! Invitation tokens: how a host shares network identity with clients.
//!
//! The default [`TokenCodec`] produces `LB1.<base64url(json)>` tokens carrying
//! a freshly generated network name and secret, the forwarded port and an
//! optional room label.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Prefix identifying tokens produced by [`TokenCodec`].
pub const TOKEN_PREFIX: &str = "LB1.";

const NETWORK_NAME_PREFIX: &str = "lb-";
const NETWORK_NAME_LEN: usize = 8;
const NETWORK_SECRET_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum InvitationError {
	#[error("malformed invitation: {0}")]
	Malformed(String),

	#[error("failed to encode invitation: {0}")]
	Encode(#[from] serde_json::Error),
}

/// Decoded contents of an invitation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationData {
	pub network_name: String,
	pub network_secret: String,
	pub port: u16,
	/// Free-form room label chosen by the host.
	pub attachment: Option<String>,
}

/// Encodes and decodes invitation tokens.
pub trait InvitationCodec: Send + Sync {
	/// Mints a token for a new room forwarding `port`.
	fn encode(&self, port: u16, label: Option<&str>) -> Result<String, InvitationError>;

	/// Parses a token; fails with [`InvitationError::Malformed`] on any defect.
	fn decode(&self, token: &str) -> Result<InvitationData, InvitationError>;
}

#[derive(Serialize, Deserialize)]
struct Payload {
	n: String,
	s: String,
	p: u16,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	a: Option<String>,
}

/// Default codec: versioned base64url-encoded JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec;

impl TokenCodec {
	pub fn new() -> Self {
		Self
	}
}

impl InvitationCodec for TokenCodec {
	fn encode(&self, port: u16, label: Option<&str>) -> Result<String, InvitationError> {
		let payload = Payload {
			n: format!("{NETWORK_NAME_PREFIX}{}", random_alphanumeric(NETWORK_NAME_LEN).to_lowercase()),
			s: random_alphanumeric(NETWORK_SECRET_LEN),
			p: port,
			a: label.filter(|label| !label.is_empty()).map(str::to_string),
		};
		let json = serde_json::to_vec(&payload)?;
		Ok(format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
	}

	fn decode(&self, token: &str) -> Result<InvitationData, InvitationError> {
		let body = token
			.trim()
			.strip_prefix(TOKEN_PREFIX)
			.ok_or_else(|| InvitationError::Malformed(format!("expected {TOKEN_PREFIX} prefix")))?;
		let bytes = URL_SAFE_NO_PAD
			.decode(body)
			.map_err(|err| InvitationError::Malformed(format!("bad encoding: {err}")))?;
		let payload: Payload = serde_json::from_slice(&bytes).map_err(|err| InvitationError::Malformed(format!("bad payload: {err}")))?;
		if payload.n.is_empty() || payload.s.is_empty() {
			return Err(InvitationError::Malformed("missing network identity".to_string()));
		}

		Ok(InvitationData {
			network_name: payload.n,
			network_secret: payload.s,
			port: payload.p,
			attachment: payload.a,
		})
	}
}

fn random_alphanumeric(len: usize) -> String {
	rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}
