use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the stderr subscriber. Stdout carries terminal output only.
pub fn init_logging(verbosity: u8) {
	// 0 = errors only, transport chatter off
	// 1 (-v) = session and store lifecycle, transport warnings
	// 2+ (-vv) = debug for everything
	let filter = match verbosity {
		0 => "error,termlink::transport=off",
		1 => "warn,termlink::session=info,termlink::store=info,termlink_cli=info",
		_ => "debug",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_ansi(std::io::stderr().is_terminal())
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
