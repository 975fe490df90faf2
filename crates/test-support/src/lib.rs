//! In-process terminal server for tests.
//!
//! [`MockServer`] speaks the console's socket protocol on an ephemeral port:
//! it answers the auth handshake according to its [`AuthMode`], records
//! every inbound message, and lets a test push frames to, close, or drop the
//! connected clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{RawQuery, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

/// Path the server accepts sockets on.
pub const TERMINAL_PATH: &str = "/ws/terminal";

/// How the server answers an `auth` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
	/// Accept when the token matches, otherwise reply `AUTH_FAILED`.
	Token(String),
	/// Always reply with an `AUTH_FAILED` error.
	Reject,
	/// Reply `{"type":"auth","payload":{"authenticated":false}}`.
	Unauthenticated,
	/// Never reply.
	Silent,
}

enum Command {
	Send(String),
	Close(u16),
	Drop,
}

struct ServerState {
	auth: Mutex<AuthMode>,
	received: Mutex<Vec<Value>>,
	queries: Mutex<Vec<Option<String>>>,
	clients: Mutex<Vec<mpsc::UnboundedSender<Command>>>,
	connections: AtomicUsize,
	greeting: Mutex<Option<String>>,
	arrived: Notify,
}

/// Running mock server; shuts down when dropped.
pub struct MockServer {
	addr: SocketAddr,
	state: Arc<ServerState>,
	task: JoinHandle<()>,
}

impl MockServer {
	/// Starts a server that accepts `token`.
	pub async fn start(token: &str) -> Self {
		Self::with_auth(AuthMode::Token(token.to_string())).await
	}

	pub async fn with_auth(auth: AuthMode) -> Self {
		let state = Arc::new(ServerState {
			auth: Mutex::new(auth),
			received: Mutex::new(Vec::new()),
			queries: Mutex::new(Vec::new()),
			clients: Mutex::new(Vec::new()),
			connections: AtomicUsize::new(0),
			greeting: Mutex::new(None),
			arrived: Notify::new(),
		});
		let app = Router::new().route(TERMINAL_PATH, get(upgrade)).with_state(state.clone());
		let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
		let addr = listener.local_addr().expect("mock server address");
		let task = tokio::spawn(async move {
			if let Err(err) = axum::serve(listener, app.into_make_service()).await {
				tracing::warn!(error = %err, "mock server stopped");
			}
		});
		Self { addr, state, task }
	}

	/// `http://` base URL, as a console would be configured with.
	pub fn base_url(&self) -> String {
		format!("http://{}", self.addr)
	}

	pub fn set_auth(&self, auth: AuthMode) {
		*self.state.auth.lock() = auth;
	}

	/// Output frame sent right after each `subscribe`.
	pub fn set_greeting(&self, text: &str) {
		*self.state.greeting.lock() = Some(text.to_string());
	}

	/// Sockets accepted so far.
	pub fn connection_count(&self) -> usize {
		self.state.connections.load(Ordering::SeqCst)
	}

	/// Raw query string of each accepted socket, in order.
	pub fn queries(&self) -> Vec<Option<String>> {
		self.state.queries.lock().clone()
	}

	pub fn received(&self) -> Vec<Value> {
		self.state.received.lock().clone()
	}

	/// Received messages whose `type` is `kind`.
	pub fn received_of(&self, kind: &str) -> Vec<Value> {
		self.state.received.lock().iter().filter(|m| m["type"] == kind).cloned().collect()
	}

	/// Waits until `count` messages of `kind` have arrived.
	pub async fn wait_for(&self, kind: &str, count: usize) -> Vec<Value> {
		let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
		loop {
			let notified = self.state.arrived.notified();
			let matching = self.received_of(kind);
			if matching.len() >= count {
				return matching;
			}
			if tokio::time::timeout_at(deadline, notified).await.is_err() {
				panic!("timed out waiting for {count} '{kind}' message(s), got {matching:?}");
			}
		}
	}

	/// Waits until `count` sockets have been accepted.
	pub async fn wait_for_connections(&self, count: usize) {
		let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
		loop {
			let notified = self.state.arrived.notified();
			if self.connection_count() >= count {
				return;
			}
			if tokio::time::timeout_at(deadline, notified).await.is_err() {
				panic!("timed out waiting for {count} connection(s), got {}", self.connection_count());
			}
		}
	}

	/// Sends `message` to every live client.
	pub fn push(&self, message: Value) {
		self.push_raw(&message.to_string());
	}

	/// Sends an arbitrary text frame to every live client.
	pub fn push_raw(&self, text: &str) {
		self.broadcast(|| Command::Send(text.to_string()));
	}

	/// Sends an `output` frame to every live client.
	pub fn push_output(&self, data: &str) {
		self.push(json!({"type": "output", "payload": {"data": data}}));
	}

	/// Closes every live client with `code`.
	pub fn close_all(&self, code: u16) {
		self.broadcast(|| Command::Close(code));
	}

	/// Drops every live client without a close frame.
	pub fn drop_all(&self) {
		self.broadcast(|| Command::Drop);
	}

	fn broadcast(&self, command: impl Fn() -> Command) {
		self.state.clients.lock().retain(|client| client.send(command()).is_ok());
	}
}

impl Drop for MockServer {
	fn drop(&mut self) {
		self.task.abort();
		self.drop_all();
	}
}

async fn upgrade(ws: WebSocketUpgrade, RawQuery(query): RawQuery, State(state): State<Arc<ServerState>>) -> impl IntoResponse {
	state.queries.lock().push(query);
	ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>) {
	let (tx, mut rx) = mpsc::unbounded_channel();
	state.clients.lock().push(tx);
	state.connections.fetch_add(1, Ordering::SeqCst);
	state.arrived.notify_waiters();

	loop {
		tokio::select! {
			inbound = socket.recv() => match inbound {
				Some(Ok(Message::Text(text))) => {
					for reply in handle_text(&state, text.as_str()) {
						if socket.send(Message::Text(reply.into())).await.is_err() {
							return;
						}
					}
				}
				Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
				Some(Ok(_)) => {}
			},
			command = rx.recv() => match command {
				Some(Command::Send(text)) => {
					if socket.send(Message::Text(text.into())).await.is_err() {
						return;
					}
				}
				Some(Command::Close(code)) => {
					let frame = CloseFrame { code, reason: String::new().into() };
					let _ = socket.send(Message::Close(Some(frame))).await;
					return;
				}
				Some(Command::Drop) | None => return,
			},
		}
	}
}

fn handle_text(state: &ServerState, text: &str) -> Vec<String> {
	let Ok(message) = serde_json::from_str::<Value>(text) else {
		return Vec::new();
	};
	let kind = message["type"].as_str().unwrap_or_default().to_string();
	let token = message["payload"]["token"].as_str().map(str::to_string);
	state.received.lock().push(message);
	state.arrived.notify_waiters();

	match kind.as_str() {
		"auth" => {
			let reply = match &*state.auth.lock() {
				AuthMode::Token(expected) if token.as_deref() == Some(expected.as_str()) => {
					json!({"type": "auth", "payload": {"authenticated": true, "username": "admin"}})
				}
				AuthMode::Token(_) | AuthMode::Reject => {
					json!({"type": "error", "code": "AUTH_FAILED", "error": "Invalid token"})
				}
				AuthMode::Unauthenticated => json!({"type": "auth", "payload": {"authenticated": false}}),
				AuthMode::Silent => return Vec::new(),
			};
			vec![reply.to_string()]
		}
		"subscribe" => state
			.greeting
			.lock()
			.as_ref()
			.map(|text| vec![json!({"type": "output", "payload": {"data": text}}).to_string()])
			.unwrap_or_default(),
		_ => Vec::new(),
	}
}
