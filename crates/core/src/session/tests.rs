use termlink_runtime::ConnectionState;
use tokio::sync::broadcast::error::TryRecvError;

use super::*;
use crate::testing::{RecordingSurface, offline_context};

fn session() -> (InteractiveSession, broadcast::Receiver<SessionEvent>) {
	let (ctx, rx) = offline_context();
	(InteractiveSession::new(SessionId::new(1), "Terminal 1".into(), ctx), rx)
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
	let mut events = Vec::new();
	loop {
		match rx.try_recv() {
			Ok(event) => events.push(event),
			Err(TryRecvError::Lagged(_)) => continue,
			Err(_) => return events,
		}
	}
}

#[test]
fn id_displays_with_prefix() {
	assert_eq!(SessionId::new(7).to_string(), "session-7");
}

#[tokio::test]
async fn output_before_surface_is_replayed_in_order() {
	let (session, _rx) = session();
	session.append_output(&WireMessage::output("a"));
	session.append_output(&WireMessage::output("b"));

	let surface = RecordingSurface::new();
	session.initialize(surface.clone()).await;
	assert_eq!(surface.written(), vec!["a", "b"]);

	session.append_output(&WireMessage::output("c"));
	assert_eq!(surface.written(), vec!["a", "b", "c"]);
	assert_eq!(session.scrollback(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn scrollback_is_bounded_across_output() {
	let (session, _rx) = session();
	for chunk in ["1", "2", "3", "4"] {
		session.append_output(&WireMessage::output(chunk));
	}
	assert_eq!(session.scrollback(), vec!["2", "3", "4"]);
}

#[tokio::test]
async fn failed_connect_leaves_session_disconnected() {
	let (session, mut rx) = session();
	session.connect().await;

	assert_eq!(session.state(), ConnectionState::Disconnected);
	assert!(session.inner.state.lock().transport.is_none());
	let states: Vec<_> = drain(&mut rx)
		.into_iter()
		.filter_map(|e| match e {
			SessionEvent::StateChanged { state, .. } => Some(state),
			_ => None,
		})
		.collect();
	assert_eq!(states, vec![ConnectionState::Connecting, ConnectionState::Disconnected]);
}

#[tokio::test]
async fn try_connect_surfaces_the_transport_error() {
	let (session, _rx) = session();
	let err = session.try_connect().await.unwrap_err();

	assert!(matches!(err, crate::SessionError::Transport(Error::MissingCredential)));
	assert_eq!(session.state(), ConnectionState::Disconnected);
	assert!(session.inner.state.lock().watcher.is_none());
}

#[tokio::test]
async fn input_is_dropped_while_disconnected() {
	let (session, _rx) = session();
	assert!(!session.send_input("ls\r"));
}

#[tokio::test]
async fn rebinding_makes_old_events_inert() {
	let (session, _rx) = session();
	let first = RecordingSurface::new();
	session.initialize(first.clone()).await;
	let stale = first.events();
	assert!(stale.is_bound());

	let second = RecordingSurface::new();
	session.initialize(second.clone()).await;
	assert!(!stale.is_bound());
	assert!(second.events().is_bound());

	stale.resize(200, 50);
	assert_eq!(session.geometry(), (80, 24));

	second.events().resize(100, 30);
	assert_eq!(session.geometry(), (100, 30));
}

#[tokio::test]
async fn same_surface_is_not_replayed_twice() {
	let (session, _rx) = session();
	session.append_output(&WireMessage::output("hello"));
	let surface = RecordingSurface::new();
	session.initialize(surface.clone()).await;
	session.initialize(surface.clone()).await;
	assert_eq!(surface.written(), vec!["hello"]);
}

#[tokio::test]
async fn resize_clamps_and_emits_once() {
	let (session, mut rx) = session();
	session.resize(0, 0);
	session.resize(1, 1);
	assert_eq!(session.geometry(), (1, 1));
	let resized: Vec<_> = drain(&mut rx)
		.into_iter()
		.filter(|e| matches!(e, SessionEvent::Resized { .. }))
		.collect();
	assert_eq!(resized, vec![SessionEvent::Resized {
		id: SessionId::new(1),
		cols: 1,
		rows: 1
	}]);
}

#[tokio::test]
async fn surface_disposal_releases_binding() {
	let (session, _rx) = session();
	let surface = RecordingSurface::new();
	session.initialize(surface.clone()).await;
	assert!(session.has_surface());

	surface.events().disposed();
	assert!(!session.has_surface());

	session.append_output(&WireMessage::output("later"));
	assert!(surface.written().is_empty());
	assert_eq!(session.scrollback(), vec!["later"]);
}

#[tokio::test]
async fn dropped_surface_is_not_written() {
	let (session, _rx) = session();
	let surface = RecordingSurface::new();
	session.initialize(surface.clone()).await;
	drop(surface);

	session.append_output(&WireMessage::output("x"));
	assert!(!session.has_surface());
	assert_eq!(session.scrollback(), vec!["x"]);
}

#[tokio::test]
async fn clear_wipes_surface_and_scrollback() {
	let (session, _rx) = session();
	let surface = RecordingSurface::new();
	session.initialize(surface.clone()).await;
	session.append_output(&WireMessage::output("x"));

	session.clear();
	assert_eq!(*surface.clears.lock(), 1);
	assert!(session.scrollback().is_empty());
}

#[tokio::test]
async fn dispose_notifies_surface_and_unbinds() {
	let (session, _rx) = session();
	let surface = RecordingSurface::new();
	session.initialize(surface.clone()).await;
	let events = surface.events();

	session.dispose();
	session.dispose();

	assert!(*surface.disposed.lock());
	assert!(!events.is_bound());
	assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn rename_and_focus() {
	let (session, mut rx) = session();
	let surface = RecordingSurface::new();
	session.initialize(surface.clone()).await;
	let before = session.last_active_at();

	session.rename("build box");
	session.focus();

	assert_eq!(session.name(), "build box");
	assert_eq!(*surface.focused.lock(), 1);
	assert!(session.last_active_at() >= before);
	assert!(drain(&mut rx).contains(&SessionEvent::Renamed {
		id: SessionId::new(1),
		name: "build box".into()
	}));
}
