mod attach;
mod check;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use termlink::{AlwaysConnected, ConnectionConfig, Endpoint, SessionConfig, SessionStore, StaticCredential};

use crate::cli::{Commands, ServerArgs};

pub async fn dispatch(command: Commands) -> Result<()> {
	match command {
		Commands::Attach { server, name, cols, rows } => attach::run(&server, name.as_deref(), cols, rows).await,
		Commands::Check { server } => check::run(&server).await,
	}
}

fn session_config(server: &ServerArgs, cols: u16, rows: u16) -> Result<SessionConfig> {
	let endpoint = Endpoint::new(&server.url, &server.path).with_context(|| format!("invalid server address {}", server.url))?;
	let connection = ConnectionConfig::default().with_auth_timeout(Duration::from_millis(server.auth_timeout_ms));
	Ok(SessionConfig::new(endpoint)
		.with_shell(server.shell.clone())
		.with_geometry(cols, rows)
		.with_connection(connection))
}

fn build_store(server: &ServerArgs, cols: u16, rows: u16) -> Result<SessionStore> {
	let config = session_config(server, cols, rows)?;
	Ok(SessionStore::new(config, Arc::new(StaticCredential::new(server.token.clone())), Arc::new(AlwaysConnected)))
}
