use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use termlink::{AlwaysConnected, ConnectionConfig, ConnectionState, Endpoint, SessionConfig, SessionEvent, SessionStore, StaticCredential, Surface, SurfaceEvents};
use termlink_test_support::{MockServer, TERMINAL_PATH};

#[derive(Default)]
struct Screen {
	written: Mutex<Vec<String>>,
	events: Mutex<Option<SurfaceEvents>>,
}

impl Screen {
	fn text(&self) -> String {
		self.written.lock().concat()
	}

	fn events(&self) -> SurfaceEvents {
		self.events.lock().clone().unwrap()
	}
}

impl Surface for Screen {
	fn write(&self, data: &str) {
		self.written.lock().push(data.to_string());
	}

	fn clear(&self) {
		self.written.lock().clear();
	}

	fn bind(&self, events: SurfaceEvents) {
		*self.events.lock() = Some(events);
	}
}

fn store(server: &MockServer, token: &str) -> SessionStore {
	store_with(server, token, ConnectionConfig::default())
}

fn store_with(server: &MockServer, token: &str, connection: ConnectionConfig) -> SessionStore {
	let endpoint = Endpoint::new(&server.base_url(), TERMINAL_PATH).unwrap();
	let config = SessionConfig::new(endpoint)
		.with_shell("/bin/zsh")
		.with_geometry(120, 40)
		.with_connection(connection);
	SessionStore::new(config, Arc::new(StaticCredential::new(token)), Arc::new(AlwaysConnected))
}

fn states_of(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<ConnectionState> {
	let mut states = Vec::new();
	while let Ok(event) = events.try_recv() {
		if let SessionEvent::StateChanged { state, .. } = event {
			states.push(state);
		}
	}
	states
}

async fn eventually(mut check: impl FnMut() -> bool) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !check() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("condition not reached");
}

#[tokio::test]
async fn attached_session_connects_and_streams_output() {
	let server = MockServer::start("secret").await;
	server.set_greeting("welcome\r\n");
	let store = store(&server, "secret");
	let id = store.create_session(None);
	let screen = Arc::new(Screen::default());

	store.attach_surface(id, screen.clone()).await.unwrap();
	let session = store.session(id).unwrap();
	assert_eq!(session.state(), ConnectionState::Connected);
	assert_eq!(store.connected_count(), 1);

	let subscribe = server.wait_for("subscribe", 1).await;
	assert_eq!(subscribe[0], json!({"type": "subscribe", "payload": {"cols": 120, "rows": 40, "shell": "/bin/zsh"}}));

	eventually(|| screen.text() == "welcome\r\n").await;
	server.push_output("$ ");
	eventually(|| screen.text() == "welcome\r\n$ ").await;
	assert_eq!(session.scrollback(), vec!["welcome\r\n", "$ "]);
}

#[tokio::test]
async fn surface_input_and_resize_reach_the_server() {
	let server = MockServer::start("secret").await;
	let store = store(&server, "secret");
	let id = store.create_session(None);
	let screen = Arc::new(Screen::default());
	store.attach_surface(id, screen.clone()).await.unwrap();

	assert!(screen.events().input("ls -la\r"));
	screen.events().resize(100, 30);

	let input = server.wait_for("input", 1).await;
	assert_eq!(input[0], json!({"type": "input", "data": "ls -la\r"}));
	let resize = server.wait_for("resize", 1).await;
	assert_eq!(resize[0], json!({"type": "resize", "payload": {"cols": 100, "rows": 30}}));
}

#[tokio::test]
async fn rejected_token_leaves_session_disconnected() {
	let server = MockServer::start("secret").await;
	let store = store(&server, "wrong");
	let id = store.create_session(None);
	let screen = Arc::new(Screen::default());

	store.attach_surface(id, screen.clone()).await.unwrap();

	let session = store.session(id).unwrap();
	assert_eq!(session.state(), ConnectionState::Disconnected);
	assert!(!screen.events().input("x"));
	assert!(server.received_of("subscribe").is_empty());
}

#[tokio::test]
async fn server_error_disconnects_session() {
	let server = MockServer::start("secret").await;
	let store = store(&server, "secret");
	let mut events = store.subscribe();
	let id = store.create_session(None);
	store.attach_surface(id, Arc::new(Screen::default())).await.unwrap();

	server.push(json!({"type": "error", "code": "PTY_EXITED", "error": "shell exited"}));

	let session = store.session(id).unwrap();
	eventually(|| session.state() == ConnectionState::Disconnected).await;

	let states = states_of(&mut events);
	assert_eq!(states, vec![ConnectionState::Connecting, ConnectionState::Connected, ConnectionState::Disconnected]);
}

#[tokio::test]
async fn dropped_socket_without_retries_disconnects_and_reattach_recovers() {
	let server = MockServer::start("secret").await;
	let store = store_with(&server, "secret", ConnectionConfig::default().with_max_reconnect_attempts(0));
	let mut events = store.subscribe();
	let id = store.create_session(None);
	let screen = Arc::new(Screen::default());
	store.attach_surface(id, screen.clone()).await.unwrap();
	let session = store.session(id).unwrap();
	assert_eq!(store.connected_count(), 1);

	server.drop_all();
	eventually(|| session.state() == ConnectionState::Disconnected).await;
	assert_eq!(store.connected_count(), 0);
	assert!(!screen.events().input("ls\r"));
	assert_eq!(states_of(&mut events), vec![ConnectionState::Connecting, ConnectionState::Connected, ConnectionState::Disconnected]);

	store.detach_surface(id).unwrap();
	store.attach_surface(id, screen.clone()).await.unwrap();
	assert_eq!(session.state(), ConnectionState::Connected);
	assert_eq!(server.connection_count(), 2);
	assert!(screen.events().input("ls\r"));
	server.wait_for("input", 1).await;
}

#[tokio::test]
async fn transport_reconnect_returns_session_to_connected() {
	let server = MockServer::start("secret").await;
	let connection = ConnectionConfig::default()
		.with_max_reconnect_attempts(3)
		.with_reconnect_interval(Duration::from_millis(50));
	let store = store_with(&server, "secret", connection);
	let mut events = store.subscribe();
	let id = store.create_session(None);
	store.attach_surface(id, Arc::new(Screen::default())).await.unwrap();
	let session = store.session(id).unwrap();

	server.drop_all();
	server.wait_for_connections(2).await;
	let subscribes = server.wait_for("subscribe", 2).await;
	assert_eq!(subscribes[0], subscribes[1]);
	eventually(|| session.state() == ConnectionState::Connected).await;

	let states = states_of(&mut events);
	assert_eq!(states.first(), Some(&ConnectionState::Connecting));
	assert_eq!(states.last(), Some(&ConnectionState::Connected));
	assert!(states.iter().skip(2).any(|state| *state == ConnectionState::Connecting));
	assert!(!states.contains(&ConnectionState::Disconnected));
}

#[tokio::test]
async fn reattaching_replays_history_into_new_surface() {
	let server = MockServer::start("secret").await;
	let store = store(&server, "secret");
	let id = store.create_session(None);
	let first = Arc::new(Screen::default());
	store.attach_surface(id, first.clone()).await.unwrap();

	server.push_output("one ");
	server.push_output("two ");
	eventually(|| first.text() == "one two ").await;

	store.detach_surface(id).unwrap();
	server.push_output("three");
	let session = store.session(id).unwrap();
	eventually(|| session.scrollback().len() == 3).await;
	assert_eq!(first.text(), "one two ");

	let second = Arc::new(Screen::default());
	store.attach_surface(id, second.clone()).await.unwrap();
	assert_eq!(second.text(), "one two three");
	assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn closing_a_session_closes_its_socket() {
	let server = MockServer::start("secret").await;
	let store = store(&server, "secret");
	let a = store.create_session(None);
	let b = store.create_session(None);
	store.attach_surface(a, Arc::new(Screen::default())).await.unwrap();
	store.attach_surface(b, Arc::new(Screen::default())).await.unwrap();
	assert_eq!(store.connected_count(), 2);

	store.close_session(b).unwrap();
	assert_eq!(store.connected_count(), 1);
	assert_eq!(store.active_id(), Some(a));

	store.dispose();
	assert_eq!(store.connected_count(), 0);
}
