use std::sync::Arc;

use anyhow::{Context, Result, bail};
use termlink::{ConnectionState, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::build_store;
use crate::cli::ServerArgs;
use crate::surface::StdoutSurface;

/// Streams one session to stdout until stdin closes, Ctrl-C, or the session drops.
pub async fn run(server: &ServerArgs, name: Option<&str>, cols: u16, rows: u16) -> Result<()> {
	let store = build_store(server, cols, rows)?;
	let mut events = store.subscribe();
	let id = store.create_session(name);
	let surface = Arc::new(StdoutSurface::new());

	store.attach_surface(id, surface.clone()).await?;
	let session = store.session(id).context("session closed during attach")?;
	if session.state() != ConnectionState::Connected {
		store.dispose();
		bail!("could not open a session on {}", server.url);
	}
	tracing::info!(session = %id, "attached; type lines to send them, Ctrl-D to exit");

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		tokio::select! {
			line = lines.next_line() => match line.context("reading stdin")? {
				Some(line) => {
					if !surface.input(&format!("{line}\r")) {
						tracing::warn!(session = %id, "input dropped, session is not connected");
					}
				}
				None => break,
			},
			_ = tokio::signal::ctrl_c() => break,
			event = events.recv() => match event {
				Ok(SessionEvent::StateChanged { id: changed, state: ConnectionState::Disconnected }) if changed == id => {
					tracing::warn!(session = %id, "session disconnected");
					break;
				}
				Ok(SessionEvent::StateChanged { id: changed, state: ConnectionState::Connecting }) if changed == id => {
					tracing::warn!(session = %id, "connection lost, reconnecting");
				}
				Ok(_) | Err(RecvError::Lagged(_)) => {}
				Err(RecvError::Closed) => break,
			},
		}
	}

	store.dispose();
	Ok(())
}
