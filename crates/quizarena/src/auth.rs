//! Authentication hook for resolving a client token to a username.
//!
//! QuizArena does not implement authentication — that belongs to the
//! surrounding platform (session cookies, JWTs, whatever the deployment
//! uses). The gateway only needs one answer: which username does this
//! token belong to? Connections stay anonymous until they present a
//! token; anonymous senders of mutating messages get an
//! authentication-required error and stay connected.

use quizarena_protocol::Username;

/// Authentication failure. Delivered as an error event; the connection
/// is never closed for it.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    Failed(String),
}

/// Validates a client token and returns the player's identity.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Username, AuthError>> + Send;
}

/// Accepts any non-empty token and uses it verbatim as the username.
///
/// Development and test use only — production deployments implement
/// [`Authenticator`] against their real identity provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAuth;

impl Authenticator for PlainAuth {
    async fn authenticate(&self, token: &str) -> Result<Username, AuthError> {
        let name = token.trim();
        if name.is_empty() {
            return Err(AuthError::Failed("empty token".into()));
        }
        Ok(Username::new(name))
    }
}
