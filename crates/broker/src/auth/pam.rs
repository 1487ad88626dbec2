//! PAM backend via `pam-client`.

use std::ffi::{CStr, CString};

use pam_client::{Context, ConversationHandler, ErrorCode, Flag};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use super::{AuthBackend, AuthTransaction, BackendError, Conversation, PromptKind, Response};

pub struct PamBackend {
    service: String,
}

impl PamBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl AuthBackend for PamBackend {
    fn name(&self) -> &'static str {
        "pam"
    }

    fn open<'c>(
        &self,
        account: &str,
        conversation: &'c mut dyn Conversation,
    ) -> Result<Box<dyn AuthTransaction + 'c>, BackendError> {
        let context = Context::new(
            &self.service,
            Some(account),
            PamConversation { inner: conversation },
        )
        .map_err(|err| BackendError::Open(err.to_string()))?;
        Ok(Box::new(PamTransaction { context }))
    }
}

struct PamTransaction<'c> {
    context: Context<PamConversation<'c>>,
}

impl AuthTransaction for PamTransaction<'_> {
    fn authenticate(&mut self) -> Result<(), BackendError> {
        self.context
            .authenticate(Flag::NONE)
            .map_err(|err| BackendError::Authenticate(err.to_string()))
    }

    fn validate_account(&mut self) -> Result<(), BackendError> {
        self.context
            .acct_mgmt(Flag::NONE)
            .map_err(|err| BackendError::Account(err.to_string()))
    }
}

/// Adapts PAM's message callbacks onto a `Conversation`.
struct PamConversation<'c> {
    inner: &'c mut dyn Conversation,
}

impl PamConversation<'_> {
    fn answer(&mut self, kind: PromptKind) -> Result<CString, ErrorCode> {
        match self.inner.submit_response(kind) {
            Ok(Response::Secret(secret)) => {
                secret_cstring(secret.as_bytes()).ok_or(ErrorCode::CONV_ERR)
            }
            Ok(Response::Acknowledge) => Err(ErrorCode::CONV_ERR),
            Err(err) => {
                debug!(
                    component = "auth",
                    event = "auth.conversation_error",
                    error = %err,
                    "Conversation refused prompt"
                );
                Err(ErrorCode::CONV_ERR)
            }
        }
    }

    fn notice(&mut self, kind: PromptKind, msg: &CStr) {
        debug!(
            component = "auth",
            event = "auth.backend_message",
            kind = ?kind,
            message = %msg.to_string_lossy(),
            "Backend message"
        );
        let _ = self.inner.submit_response(kind);
    }
}

impl ConversationHandler for PamConversation<'_> {
    fn prompt_echo_on(&mut self, _prompt: &CStr) -> Result<CString, ErrorCode> {
        self.answer(PromptKind::Visible)
    }

    fn prompt_echo_off(&mut self, _prompt: &CStr) -> Result<CString, ErrorCode> {
        self.answer(PromptKind::Secret)
    }

    fn text_info(&mut self, msg: &CStr) {
        self.notice(PromptKind::Info, msg);
    }

    fn error_msg(&mut self, msg: &CStr) {
        self.notice(PromptKind::Error, msg);
    }

    fn radio_prompt(&mut self, _prompt: &CStr) -> Result<bool, ErrorCode> {
        self.answer(PromptKind::Other).map(|answer| {
            answer.into_bytes_with_nul().zeroize();
            false
        })
    }
}

/// Copy `secret` into a `CString` in a single allocation, so no partial
/// copy is left unwiped. Ownership of that allocation passes to pam-client,
/// which copies it into the reply PAM frees.
fn secret_cstring(secret: &[u8]) -> Option<CString> {
    if secret.contains(&0) {
        return None;
    }
    // Room for the terminator keeps CString::new from reallocating.
    let mut bytes = Zeroizing::new(Vec::with_capacity(secret.len() + 1));
    bytes.extend_from_slice(secret);
    CString::new(std::mem::take(&mut *bytes)).ok()
}
