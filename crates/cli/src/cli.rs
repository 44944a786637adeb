use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "lanbridge")]
#[command(about = "Host or join a virtual LAN room over a peer-to-peer mesh")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// JSON config file
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Mesh executable to run (skips the search)
	#[arg(long, global = true, value_name = "PATH")]
	pub executable: Option<PathBuf>,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Read the elevation password from the first line of stdin
	#[arg(long, global = true)]
	pub password_stdin: bool,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Create a room forwarding a local port and print its invitation code
	Host {
		/// Local port of the service to share
		#[arg(short, long)]
		port: u16,
		/// Room label embedded in the invitation
		#[arg(short, long)]
		name: Option<String>,
		/// Relay node (`tcp://host:port`); repeat to use several
		#[arg(long = "node", value_name = "URL")]
		nodes: Vec<String>,
	},

	/// Join a room by invitation code
	Join {
		/// Invitation code shared by the host
		code: String,
		/// Player name used in the mesh hostname
		#[arg(long)]
		player: String,
		/// Relay node (`tcp://host:port`); repeat to use several
		#[arg(long = "node", value_name = "URL")]
		nodes: Vec<String>,
	},

	/// Print platform facts and the resolved executable
	Check,
}
