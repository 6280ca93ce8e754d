//! Authentication collaborator seam.
//!
//! Token issuance lives outside the engine. The engine only asks two
//! questions: is there a valid session, and which bearer credential should
//! be attached to remote calls.
//!
//! A [`SessionMarker`] records, next to the cart, which session the cart
//! was last reconciled for, so a restarted process does not merge twice.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::storage::{CartPersistence, RECORD_VERSION, Record, StorageError};

/// Read-only view of the shopper's authentication session.
pub trait AuthSession: Send + Sync {
    /// Bearer credential for the current session, if any.
    fn bearer_token(&self) -> Option<SecretString>;

    /// Whether a session is active.
    fn is_authenticated(&self) -> bool {
        self.bearer_token().is_some()
    }
}

/// A settable session, for hosts that receive the token from elsewhere.
#[derive(Default)]
pub struct SessionCell {
    token: RwLock<Option<SecretString>>,
}

impl SessionCell {
    /// Create an anonymous session.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create a session already signed in with `token`.
    #[must_use]
    pub fn signed_in(token: SecretString) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }

    /// Attach a credential.
    pub fn sign_in(&self, token: SecretString) {
        *self.token.write() = Some(token);
    }

    /// Drop the credential.
    pub fn sign_out(&self) {
        *self.token.write() = None;
    }
}

impl AuthSession for SessionCell {
    fn bearer_token(&self) -> Option<SecretString> {
        self.token.read().clone()
    }
}

/// Edge observed between two authentication states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTransition {
    /// Anonymous -> authenticated.
    SignedIn,
    /// Authenticated -> anonymous.
    SignedOut,
    /// No change since the last observation.
    Unchanged,
}

/// Turns a stream of "is authenticated" observations into edges, so
/// reconciliation runs once per sign-in rather than once per check.
#[derive(Debug, Default)]
pub struct AuthTransitions {
    authenticated: bool,
}

impl AuthTransitions {
    /// Start from the anonymous state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            authenticated: false,
        }
    }

    /// Record the current state and report the edge, if any.
    pub const fn observe(&mut self, authenticated: bool) -> AuthTransition {
        let transition = match (self.authenticated, authenticated) {
            (false, true) => AuthTransition::SignedIn,
            (true, false) => AuthTransition::SignedOut,
            _ => AuthTransition::Unchanged,
        };
        self.authenticated = authenticated;
        transition
    }
}

/// Hex SHA-256 of a bearer token. Identifies the session without storing
/// the credential.
#[must_use]
pub fn session_fingerprint(token: &SecretString) -> String {
    hex::encode(Sha256::digest(token.expose_secret().as_bytes()))
}

/// Durable record that the cart was reconciled for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMarker {
    pub version: u32,
    pub fingerprint: String,
    pub reconciled_at: DateTime<Utc>,
}

impl SessionMarker {
    #[must_use]
    pub fn new(fingerprint: String) -> Self {
        Self {
            version: RECORD_VERSION,
            fingerprint,
            reconciled_at: Utc::now(),
        }
    }

    /// Read the marker. A missing or unreadable marker means the session
    /// still has to be reconciled.
    pub fn load(storage: &dyn CartPersistence) -> Option<Self> {
        let value = match storage.load(Record::Session) {
            Ok(value) => value?,
            Err(e) => {
                warn!(error = %e, "Failed to read session marker");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed session marker");
                None
            }
        }
    }

    /// Whether this marker was written for `fingerprint`.
    #[must_use]
    pub fn is_for(&self, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint
    }

    /// # Errors
    ///
    /// Returns an error if the marker could not be written.
    pub fn save(&self, storage: &dyn CartPersistence) -> Result<(), StorageError> {
        storage.save(Record::Session, &serde_json::to_value(self)?)
    }

    /// # Errors
    ///
    /// Returns an error if the marker could not be deleted.
    pub fn clear(storage: &dyn CartPersistence) -> Result<(), StorageError> {
        storage.remove(Record::Session)
    }
}
