//! Session lifecycle.
//!
//! A [`Session`] is the authenticated identity: the bearer credential plus
//! the profile it belongs to. The [`SessionHandle`] shares the current
//! session across the client, and the [`SessionGate`] serializes lifecycle
//! transitions (login, logout, restore) so two cannot interleave.

pub mod error;

pub use error::AuthError;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use orchard_core::{Credential, Email, UserId};

use crate::api::types::{ProfileUpdate, RegisterData, User};
use crate::api::{ApiError, RemoteStore};
use crate::mirror::MirrorStore;
use crate::storage::{self, DeviceStorage};

/// Storage key for the persisted session.
pub(crate) const SESSION_KEY: &str = "session";

/// An authenticated session: bearer credential plus the owning profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer credential attached to authenticated requests.
    pub credential: Credential,
    /// Refresh credential, when the backend issued one.
    pub refresh: Option<Credential>,
    /// Profile of the authenticated user.
    pub user: User,
}

// =============================================================================
// SessionHandle
// =============================================================================

/// Shared handle to the current session.
///
/// Cheaply cloneable; all clones observe the same session. A poisoned lock
/// is recovered rather than propagated since the guarded value is a plain
/// snapshot with no invariants a panic could break.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    /// Create an unauthenticated handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.read().clone()
    }

    /// Credential of the current session, if any.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.read().as_ref().map(|s| s.credential.clone())
    }

    /// Profile of the current session, if any.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.read().as_ref().map(|s| s.user.clone())
    }

    /// Id of the current user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.read().as_ref().map(|s| s.user.id)
    }

    /// Whether a session is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub(crate) fn set(&self, session: Session) {
        *self.write() = Some(session);
    }

    pub(crate) fn clear(&self) {
        *self.write() = None;
    }

    pub(crate) fn update_user(&self, user: User) {
        if let Some(session) = self.write().as_mut() {
            session.user = user;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Session>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// SessionGate
// =============================================================================

/// Serialized session lifecycle over a remote store.
///
/// At most one lifecycle transition runs at a time; a second concurrent
/// login or logout is rejected with [`AuthError::OperationInFlight`] rather
/// than queued, so the session can never be left half-switched.
#[derive(Clone)]
pub struct SessionGate<R> {
    remote: R,
    handle: SessionHandle,
    storage: Arc<dyn DeviceStorage>,
    mirror: MirrorStore,
    in_flight: Arc<AtomicBool>,
}

impl<R: RemoteStore> SessionGate<R> {
    pub(crate) fn new(
        remote: R,
        handle: SessionHandle,
        storage: Arc<dyn DeviceStorage>,
        mirror: MirrorStore,
    ) -> Self {
        Self {
            remote,
            handle,
            storage,
            mirror,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Authenticate and establish a new session.
    ///
    /// Any previous user's in-memory state is discarded before the new
    /// session becomes visible, then the new user's cart and wishlist are
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is invalid, another lifecycle operation
    /// is in flight, or the backend rejects the credentials.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let _guard = self.acquire()?;

        let session = self.remote.login(&email, password).await?;
        let user = session.user.clone();

        // The outgoing user's state must never bleed into the new session.
        self.mirror.reset().await;
        self.handle.set(session.clone());
        self.persist_session(&session);
        self.mirror.load(&self.remote).await;

        debug!(user_id = %user.id, "session established");
        Ok(user)
    }

    /// End the current session.
    ///
    /// Always succeeds locally: the backend call is best-effort, and the
    /// session and the user's local mirror are destroyed regardless of its
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::OperationInFlight` if another lifecycle operation
    /// is running.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), AuthError> {
        let _guard = self.acquire()?;

        if self.handle.is_authenticated() {
            if let Err(err) = self.remote.logout().await {
                warn!(error = %err, "backend logout failed, destroying session anyway");
            }
        }

        self.destroy_session().await;
        Ok(())
    }

    /// Restore a persisted session from device storage.
    ///
    /// A corrupt or unreadable persisted session is discarded rather than
    /// surfaced; startup proceeds unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::OperationInFlight` if another lifecycle operation
    /// is running.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<User>, AuthError> {
        let _guard = self.acquire()?;

        let session: Session = match storage::read_json(self.storage.as_ref(), SESSION_KEY) {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(None),
            Err(err) => {
                warn!(error = %err, "discarding unreadable persisted session");
                if let Err(err) = self.storage.remove(SESSION_KEY) {
                    warn!(error = %err, "failed to remove persisted session");
                }
                return Ok(None);
            }
        };

        let user = session.user.clone();
        self.handle.set(session);
        self.mirror.load(&self.remote).await;

        debug!(user_id = %user.id, "session restored");
        Ok(Some(user))
    }

    /// Re-validate the current session against the backend.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionExpired` (after destroying the session) if
    /// the backend rejects the credential, `AuthError::NotAuthenticated` if
    /// no session exists, or the underlying API error otherwise.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<User, AuthError> {
        if !self.handle.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }

        match self.remote.fetch_me().await {
            Ok(user) => {
                self.handle.update_user(user.clone());
                if let Some(session) = self.handle.current() {
                    self.persist_session(&session);
                }
                Ok(user)
            }
            Err(ApiError::Unauthorized) => {
                warn!("credential rejected, destroying session");
                self.destroy_session().await;
                Err(AuthError::SessionExpired)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Register a new account. Does not log in.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is invalid or the backend rejects the
    /// registration.
    #[instrument(skip(self, data))]
    pub async fn register(&self, data: &RegisterData) -> Result<(), AuthError> {
        Email::parse(&data.email)?;
        self.remote.register(data).await?;
        Ok(())
    }

    /// Update the authenticated user's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if no session exists or the backend rejects the
    /// update.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, AuthError> {
        if !self.handle.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }

        let user = self.remote.update_profile(update).await?;
        self.handle.update_user(user.clone());
        if let Some(session) = self.handle.current() {
            self.persist_session(&session);
        }
        Ok(user)
    }

    /// Request a password reset email.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is invalid or the request fails.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        self.remote.forgot_password(&email).await?;
        Ok(())
    }

    /// Complete a password reset started by [`Self::forgot_password`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the reset token.
    #[instrument(skip(self, token, password))]
    pub async fn reset_password(
        &self,
        uid: &str,
        token: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        self.remote.reset_password(uid, token, password).await?;
        Ok(())
    }

    fn acquire(&self) -> Result<InFlightGuard<'_>, AuthError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(AuthError::OperationInFlight);
        }
        Ok(InFlightGuard(&self.in_flight))
    }

    fn persist_session(&self, session: &Session) {
        // Persistence is best-effort: the in-memory session already works,
        // losing it only costs a re-login after restart.
        if let Err(err) = storage::write_json(self.storage.as_ref(), SESSION_KEY, session) {
            warn!(error = %err, "failed to persist session");
        }
    }

    async fn destroy_session(&self) {
        self.mirror.clear_local().await;
        self.handle.clear();
        if let Err(err) = self.storage.remove(SESSION_KEY) {
            warn!(error = %err, "failed to remove persisted session");
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{sample_user, MockRemote};
    use crate::storage::MemoryStorage;

    fn gate_with(remote: MockRemote) -> (SessionGate<MockRemote>, SessionHandle) {
        let handle = SessionHandle::new();
        let storage: Arc<dyn DeviceStorage> = Arc::new(MemoryStorage::new());
        let mirror = MirrorStore::new(Arc::clone(&storage), handle.clone());
        let gate = SessionGate::new(remote, handle.clone(), storage, mirror);
        (gate, handle)
    }

    #[test]
    fn test_handle_starts_unauthenticated() {
        let handle = SessionHandle::new();
        assert!(!handle.is_authenticated());
        assert!(handle.credential().is_none());
        assert!(handle.user().is_none());
    }

    #[test]
    fn test_handle_set_and_clear() {
        let handle = SessionHandle::new();
        handle.set(Session {
            credential: Credential::new("tok-1"),
            refresh: None,
            user: sample_user(7),
        });

        assert!(handle.is_authenticated());
        assert_eq!(handle.user_id(), Some(UserId::new(7)));
        assert_eq!(handle.credential().unwrap().expose(), "tok-1");

        handle.clear();
        assert!(!handle.is_authenticated());
    }

    #[test]
    fn test_handle_clones_share_state() {
        let handle = SessionHandle::new();
        let other = handle.clone();
        handle.set(Session {
            credential: Credential::new("tok-1"),
            refresh: None,
            user: sample_user(7),
        });
        assert!(other.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_establishes_session() {
        let (gate, handle) = gate_with(MockRemote::new());

        let user = gate.login("alice@example.com", "hunter2").await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(handle.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_rejects_invalid_email_before_network() {
        let remote = MockRemote::new();
        let (gate, _) = gate_with(remote.clone());

        let err = gate.login("not-an-email", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail(_)));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_logout_succeeds_even_when_backend_fails() {
        let remote = MockRemote::new();
        let (gate, handle) = gate_with(remote.clone());
        gate.login("alice@example.com", "hunter2").await.unwrap();

        remote.fail_next("logout");
        gate.logout().await.unwrap();
        assert!(!handle.is_authenticated());
    }

    #[tokio::test]
    async fn test_restore_without_persisted_session() {
        let (gate, handle) = gate_with(MockRemote::new());
        assert!(gate.restore().await.unwrap().is_none());
        assert!(!handle.is_authenticated());
    }

    #[tokio::test]
    async fn test_restore_roundtrip_through_storage() {
        let remote = MockRemote::new();
        let handle = SessionHandle::new();
        let storage: Arc<dyn DeviceStorage> = Arc::new(MemoryStorage::new());
        let mirror = MirrorStore::new(Arc::clone(&storage), handle.clone());
        let gate = SessionGate::new(
            remote.clone(),
            handle.clone(),
            Arc::clone(&storage),
            mirror,
        );

        gate.login("alice@example.com", "hunter2").await.unwrap();

        // Simulate a restart: fresh handle and gate over the same storage.
        let handle2 = SessionHandle::new();
        let mirror2 = MirrorStore::new(Arc::clone(&storage), handle2.clone());
        let gate2 = SessionGate::new(remote, handle2.clone(), storage, mirror2);

        let user = gate2.restore().await.unwrap().unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(handle2.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_as_another_user_discards_previous_state() {
        let remote = MockRemote::new();
        let handle = SessionHandle::new();
        let storage: Arc<dyn DeviceStorage> = Arc::new(MemoryStorage::new());
        let mirror = MirrorStore::new(Arc::clone(&storage), handle.clone());
        let gate = SessionGate::new(remote, handle, storage, mirror.clone());

        gate.login("alice@example.com", "hunter2").await.unwrap();
        mirror
            .apply(crate::mirror::MirrorDelta::CartLineUpserted(
                crate::test_support::sample_line(10, 1, 2),
            ))
            .await;

        gate.login("bob@example.com", "hunter2").await.unwrap();
        assert!(mirror.cart().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_destroys_expired_session() {
        let remote = MockRemote::new();
        let (gate, handle) = gate_with(remote.clone());
        gate.login("alice@example.com", "hunter2").await.unwrap();

        remote.reject_credential();
        let err = gate.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
        assert!(!handle.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let (gate, _) = gate_with(MockRemote::new());
        let err = gate.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));
    }
}
