//! Credential verification.
//!
//! The gateway opens one backend transaction per attempt, answers the
//! backend's prompts through a conversation strategy, and reduces every
//! outcome to accept or reject. Nothing is kept between calls.

#[cfg(feature = "pam")]
mod pam;

use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::{AuthBackendKind, AuthConfig, ConfigError};

#[cfg(feature = "pam")]
pub use pam::PamBackend;

/// Accept/reject verdict for an account and a candidate secret.
pub trait Authenticator {
    fn authenticate(&self, account: &str, secret: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// What the backend is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Hidden credential prompt
    Secret,
    /// Credential prompt that may be echoed
    Visible,
    Info,
    Error,
    /// Anything the broker cannot answer (binary, radio...)
    Other,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    Secret(Zeroizing<String>),
    Acknowledge,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("unsupported prompt kind {0:?}")]
    Unsupported(PromptKind),
}

/// Strategy for answering backend prompts during one transaction.
pub trait Conversation {
    fn submit_response(&mut self, prompt: PromptKind) -> Result<Response, ConversationError>;
}

/// Answers every credential prompt with the typed secret.
pub struct SecretConversation<'a> {
    secret: &'a str,
}

impl<'a> SecretConversation<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self { secret }
    }
}

impl Conversation for SecretConversation<'_> {
    fn submit_response(&mut self, prompt: PromptKind) -> Result<Response, ConversationError> {
        match prompt {
            PromptKind::Secret | PromptKind::Visible => {
                Ok(Response::Secret(Zeroizing::new(self.secret.to_string())))
            }
            PromptKind::Info | PromptKind::Error => Ok(Response::Acknowledge),
            PromptKind::Other => Err(ConversationError::Unsupported(prompt)),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to start transaction: {0}")]
    Open(String),

    #[error("authentication failed: {0}")]
    Authenticate(String),

    #[error("account not valid: {0}")]
    Account(String),
}

/// One authentication attempt against a backend.
pub trait AuthTransaction {
    /// Verify the credential.
    fn authenticate(&mut self) -> Result<(), BackendError>;
    /// Check the account is usable right now (not expired, not locked).
    fn validate_account(&mut self) -> Result<(), BackendError>;
}

pub trait AuthBackend {
    fn name(&self) -> &'static str;

    fn open<'c>(
        &self,
        account: &str,
        conversation: &'c mut dyn Conversation,
    ) -> Result<Box<dyn AuthTransaction + 'c>, BackendError>;
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct Gateway<B> {
    backend: B,
}

impl<B: AuthBackend> Gateway<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn verify(&self, account: &str, secret: &str) -> Result<(), BackendError> {
        let mut conversation = SecretConversation::new(secret);
        let mut transaction = self.backend.open(account, &mut conversation)?;
        transaction.authenticate()?;
        transaction.validate_account()
    }
}

impl<B: AuthBackend> Authenticator for Gateway<B> {
    fn authenticate(&self, account: &str, secret: &str) -> bool {
        match self.verify(account, secret) {
            Ok(()) => {
                info!(
                    component = "auth",
                    event = "auth.accepted",
                    backend = self.backend.name(),
                    account = %account,
                    "Authentication succeeded"
                );
                true
            }
            Err(err) => {
                warn!(
                    component = "auth",
                    event = "auth.rejected",
                    backend = self.backend.name(),
                    account = %account,
                    error = %err,
                    "Authentication failed"
                );
                false
            }
        }
    }
}

/// Build the configured backend behind a gateway.
pub fn build_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, ConfigError> {
    match config.backend {
        #[cfg(feature = "pam")]
        AuthBackendKind::Pam => Ok(Box::new(Gateway::new(PamBackend::new(&config.service)))),
        #[cfg(not(feature = "pam"))]
        AuthBackendKind::Pam => Err(ConfigError::Invalid(
            "auth backend 'pam' is not compiled in (build with --features pam)".to_string(),
        )),
    }
}
