use clap::{ArgAction, Args, Parser, Subcommand};
use termlink::config::{DEFAULT_COLS, DEFAULT_ROWS, DEFAULT_SHELL, TERMINAL_PATH};

#[derive(Parser, Debug)]
#[command(name = "termlink")]
#[command(about = "Remote shell sessions over a console's terminal socket")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Open a session and stream it to stdout; each stdin line is sent as input
	Attach {
		#[command(flatten)]
		server: ServerArgs,

		/// Session name shown in logs
		#[arg(long)]
		name: Option<String>,

		#[arg(long, default_value_t = DEFAULT_COLS)]
		cols: u16,

		#[arg(long, default_value_t = DEFAULT_ROWS)]
		rows: u16,
	},

	/// Authenticate against the server, report the result, and exit
	Check {
		#[command(flatten)]
		server: ServerArgs,
	},
}

/// Where to connect and how to authenticate.
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
	/// Console base URL (http, https, ws, or wss)
	#[arg(long, env = "TERMLINK_URL")]
	pub url: String,

	/// Bearer token for the auth handshake
	#[arg(long, env = "TERMLINK_TOKEN", hide_env_values = true)]
	pub token: String,

	/// Socket path on the server
	#[arg(long, env = "TERMLINK_PATH", default_value = TERMINAL_PATH)]
	pub path: String,

	/// Shell the server should start
	#[arg(long, env = "TERMLINK_SHELL", default_value = DEFAULT_SHELL)]
	pub shell: String,

	/// Handshake timeout in milliseconds
	#[arg(long, default_value_t = 5000)]
	pub auth_timeout_ms: u64,
}
