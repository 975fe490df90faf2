use anyhow::{Context, Result};
use termlink::config::{DEFAULT_COLS, DEFAULT_ROWS};

use super::build_store;
use crate::cli::ServerArgs;

/// Opens one session, reports whether it authenticated, and closes it.
pub async fn run(server: &ServerArgs) -> Result<()> {
	let store = build_store(server, DEFAULT_COLS, DEFAULT_ROWS)?;
	let id = store.create_session(None);
	let session = store.session(id).context("session closed before connecting")?;

	let outcome = session.try_connect().await;
	store.dispose();
	outcome.with_context(|| format!("{}: could not open a session", server.url))?;

	println!("{}: connected", server.url);
	Ok(())
}
