//! Collaborators consulted by the transport: where the token comes from and
//! whether the user still wants to be connected.

/// Source of the bearer token sent during the handshake.
///
/// Read at each connect attempt, so a refreshed token is picked up by the
/// next reconnect.
pub trait CredentialProvider: Send + Sync {
	fn token(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
	F: Fn() -> Option<String> + Send + Sync,
{
	fn token(&self) -> Option<String> {
		self()
	}
}

/// A token fixed at construction.
#[derive(Debug, Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
	pub fn new(token: impl Into<String>) -> Self {
		Self(token.into())
	}
}

impl CredentialProvider for StaticCredential {
	fn token(&self) -> Option<String> {
		Some(self.0.clone())
	}
}

/// Consulted when a reconnect timer fires; returning `false` cancels the attempt.
pub trait AuthState: Send + Sync {
	fn should_stay_connected(&self) -> bool;
}

impl<F> AuthState for F
where
	F: Fn() -> bool + Send + Sync,
{
	fn should_stay_connected(&self) -> bool {
		self()
	}
}

/// Always keeps reconnecting.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConnected;

impl AuthState for AlwaysConnected {
	fn should_stay_connected(&self) -> bool {
		true
	}
}
