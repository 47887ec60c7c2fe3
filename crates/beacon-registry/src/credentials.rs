//! Credential store seam.
//!
//! The registry needs exactly one lookup from the platform's credential
//! store: resolving a stored-credential reference embedded in a plugin
//! callback address. Storage mechanics are out of scope; only the interface
//! lives here.

/// A username/password pair for basic authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
}

/// External credential store collaborator.
pub trait CredentialStore: Send + Sync {
    /// Resolves a stored-credential reference (the user-info component of a
    /// callback address) to credentials, if known.
    fn lookup(&self, reference: &str) -> Option<Credentials>;

    /// Releases credentials held for a reference when their owning plugin
    /// deregisters.
    fn release(&self, reference: &str);
}

/// Credential store that knows nothing. The default wiring for deployments
/// whose plugins expose unauthenticated callbacks.
pub struct NoCredentials;

impl CredentialStore for NoCredentials {
    fn lookup(&self, _reference: &str) -> Option<Credentials> {
        None
    }

    fn release(&self, _reference: &str) {}
}
