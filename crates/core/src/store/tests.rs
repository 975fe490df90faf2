use termlink_runtime::{AlwaysConnected, Endpoint};

use super::*;
use crate::config::TERMINAL_PATH;
use crate::testing::RecordingSurface;

fn store() -> SessionStore {
	let endpoint = Endpoint::new("http://127.0.0.1:9", TERMINAL_PATH).unwrap();
	SessionStore::new(SessionConfig::new(endpoint), Arc::new(|| None::<String>), Arc::new(AlwaysConnected))
}

#[test]
fn create_assigns_sequential_ids_and_names() {
	let store = store();
	let first = store.create_session(None);
	let second = store.create_session(Some("logs"));

	assert_eq!(first.to_string(), "session-1");
	assert_eq!(second.to_string(), "session-2");
	assert_eq!(store.session(first).unwrap().name(), "Terminal 1");
	assert_eq!(store.session(second).unwrap().name(), "logs");
	assert_eq!(store.active_id(), Some(second));
	assert_eq!(store.len(), 2);
}

#[test]
fn last_session_cannot_be_closed() {
	let store = store();
	let only = store.create_session(None);

	assert!(matches!(store.close_session(only), Err(SessionError::LastSession(id)) if id == only));
	assert_eq!(store.len(), 1);
	assert_eq!(store.active_id(), Some(only));
}

#[test]
fn policy_can_allow_closing_the_last_session() {
	let store = store().with_policy(StorePolicy { keep_last_session: false });
	let only = store.create_session(None);
	store.close_session(only).unwrap();
	assert!(store.is_empty());
	assert_eq!(store.active_id(), None);
}

#[test]
fn closing_active_falls_back_to_first_remaining() {
	let store = store();
	let a = store.create_session(None);
	let b = store.create_session(None);
	let c = store.create_session(None);
	assert_eq!(store.active_id(), Some(c));

	store.close_session(c).unwrap();
	assert_eq!(store.active_id(), Some(a));

	store.close_session(a).unwrap();
	assert_eq!(store.active_id(), Some(b));
	assert_eq!(store.len(), 1);
}

#[test]
fn closing_inactive_session_keeps_selection() {
	let store = store().with_policy(StorePolicy { keep_last_session: false });
	let a = store.create_session(None);
	let b = store.create_session(None);

	store.close_session(a).unwrap();
	assert_eq!(store.active_id(), Some(b));
}

#[test]
fn closing_unknown_session_is_an_error() {
	let store = store();
	store.create_session(None);
	let missing = SessionId::new(42);
	assert!(matches!(store.close_session(missing), Err(SessionError::NotFound(_))));
	assert!(matches!(store.switch_active(missing), Err(SessionError::NotFound(_))));
}

#[test]
fn list_keeps_creation_order() {
	let store = store();
	let ids: Vec<_> = (0..3).map(|_| store.create_session(None)).collect();
	store.switch_active(ids[0]).unwrap();
	let listed: Vec<_> = store.list().iter().map(InteractiveSession::id).collect();
	assert_eq!(listed, ids);
}

#[tokio::test]
async fn dispose_resets_counter_and_disposes_surfaces() {
	let store = store();
	let a = store.create_session(None);
	store.create_session(None);
	let surface = RecordingSurface::new();
	store.attach_surface(a, surface.clone()).await.unwrap();

	store.dispose();

	assert!(store.is_empty());
	assert_eq!(store.active_id(), None);
	assert_eq!(store.observer_count(), 0);
	assert!(*surface.disposed.lock());
	assert_eq!(store.create_session(None).to_string(), "session-1");
}

#[tokio::test]
async fn attach_observes_and_detach_releases() {
	let store = store();
	let id = store.create_session(None);
	let surface = RecordingSurface::new();

	store.attach_surface(id, surface.clone()).await.unwrap();
	assert_eq!(store.observer_count(), 1);
	assert!(store.session(id).unwrap().has_surface());

	store.container_resized();
	assert_eq!(*surface.fits.lock(), 1);

	store.detach_surface(id).unwrap();
	assert_eq!(store.observer_count(), 0);
	assert!(!store.session(id).unwrap().has_surface());
	assert!(!*surface.disposed.lock());

	store.container_resized();
	assert_eq!(*surface.fits.lock(), 1);
}

#[tokio::test]
async fn resize_forgets_dropped_surfaces() {
	let store = store();
	let id = store.create_session(None);
	let surface = RecordingSurface::new();
	store.attach_surface(id, surface.clone()).await.unwrap();
	drop(surface);

	store.container_resized();
	assert_eq!(store.observer_count(), 0);
}

#[tokio::test]
async fn resize_forgets_self_disposed_surfaces() {
	let store = store();
	let id = store.create_session(None);
	let surface = RecordingSurface::new();
	store.attach_surface(id, surface.clone()).await.unwrap();

	surface.events().disposed();
	assert!(!store.session(id).unwrap().has_surface());

	store.container_resized();
	assert_eq!(*surface.fits.lock(), 0);
	assert_eq!(store.observer_count(), 0);
}

#[tokio::test]
async fn resize_follows_the_latest_attached_surface() {
	let store = store();
	let id = store.create_session(None);
	let first = RecordingSurface::new();
	let second = RecordingSurface::new();
	store.attach_surface(id, first.clone()).await.unwrap();
	store.attach_surface(id, second.clone()).await.unwrap();

	store.container_resized();
	assert_eq!(*first.fits.lock(), 0);
	assert_eq!(*second.fits.lock(), 1);
	assert_eq!(store.observer_count(), 1);
}

#[tokio::test]
async fn attach_to_unknown_session_fails() {
	let store = store();
	let err = store.attach_surface(SessionId::new(9), RecordingSurface::new()).await.unwrap_err();
	assert!(matches!(err, SessionError::NotFound(_)));
	assert_eq!(store.observer_count(), 0);
}

#[test]
fn events_report_lifecycle() {
	let store = store();
	let mut rx = store.subscribe();
	let a = store.create_session(None);
	let b = store.create_session(None);
	store.close_session(b).unwrap();

	let mut events = Vec::new();
	while let Ok(event) = rx.try_recv() {
		events.push(event);
	}
	assert_eq!(events, vec![
		SessionEvent::Created {
			id: a,
			name: "Terminal 1".into()
		},
		SessionEvent::ActiveChanged { id: Some(a) },
		SessionEvent::Created {
			id: b,
			name: "Terminal 2".into()
		},
		SessionEvent::ActiveChanged { id: Some(b) },
		SessionEvent::Closed { id: b },
		SessionEvent::ActiveChanged { id: Some(a) },
	]);
	assert_eq!(store.connected_count(), 0);
}
