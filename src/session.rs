use std::{future::Future, sync::Arc};
use tokio::sync::RwLock;

use crate::errors::{ClientError, IdentityError};

/// Result of a sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignIn {
    SignedIn,
    Next(NextStep),
}

/// What the identity provider wants before it will issue a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    ConfirmWithSmsCode,
    ConfirmWithTotpCode,
    NewPasswordRequired,
    ConfirmSignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUp {
    Complete,
    ConfirmSignUp,
}

/// External identity provider. Implementations keep their own tokens,
/// `fetch_session` is the only way the rest of the crate reads them.
pub trait IdentityProvider: Send + Sync + 'static {
    fn sign_in(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<SignIn, IdentityError>> + Send;

    fn sign_up(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> impl Future<Output = Result<SignUp, IdentityError>> + Send;

    /// Returns whether sign-up is complete.
    fn confirm_sign_up(
        &self,
        username: &str,
        code: &str,
    ) -> impl Future<Output = Result<bool, IdentityError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), IdentityError>> + Send;

    fn fetch_session(&self) -> impl Future<Output = Result<Option<String>, IdentityError>> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub access_token: Option<String>,
    /// Set once the first session check has completed.
    pub ready: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Process-wide credential holder shared by every view.
pub struct Session<P> {
    provider: Arc<P>,
    state: Arc<RwLock<SessionState>>,
}

impl<P> Clone for Session<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            state: self.state.clone(),
        }
    }
}

impl<P: IdentityProvider> Session<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            state: Arc::new(RwLock::new(SessionState::default())),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Re-reads the token from the provider. A failing check counts as
    /// logged out and is never surfaced to the caller.
    pub async fn refresh(&self) {
        let token = match self.provider.fetch_session().await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!("Session check failed, treating as logged out: {}", err);
                None
            }
        };
        let mut state = self.state.write().await;
        state.access_token = token;
        state.ready = true;
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<SignIn, IdentityError> {
        let outcome = self.provider.sign_in(username, password).await;
        self.refresh().await;
        outcome
    }

    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        let outcome = self.provider.sign_out().await;
        self.refresh().await;
        outcome
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.access_token.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.state.read().await.ready
    }

    pub async fn require_token(&self) -> Result<String, ClientError> {
        self.token().await.ok_or(ClientError::NotAuthenticated)
    }
}
