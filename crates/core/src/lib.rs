//! Interactive remote terminal sessions.
//!
//! A [`SessionStore`] owns any number of [`InteractiveSession`]s. Each session
//! has its own authenticated socket to the console server (see
//! [`termlink_runtime::ConnectionManager`]), a bounded scrollback of shell
//! output, and optionally a bound [`Surface`] that renders output and
//! produces input.
//!
//! ```ignore
//! let store = SessionStore::new(config, credentials, Arc::new(AlwaysConnected));
//! let id = store.create_session(None);
//! store.attach_surface(id, surface).await?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod scrollback;
pub mod session;
pub mod store;
pub mod surface;

#[cfg(test)]
mod testing;

pub use config::{SessionConfig, StorePolicy};
pub use error::{Result, SessionError};
pub use events::SessionEvent;
pub use scrollback::Scrollback;
pub use session::{InteractiveSession, SessionId};
pub use store::{ResizeObserver, SessionStore};
pub use surface::{Surface, SurfaceEvents};
pub use termlink_runtime::{AlwaysConnected, AuthState, ConnectionConfig, ConnectionState, CredentialProvider, Endpoint, StaticCredential};
