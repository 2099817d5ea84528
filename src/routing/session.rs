use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{instrument, warn};

use super::criteria::SelectionCriteria;
use crate::error::{Result, StepperError};
use crate::models::Token;
use crate::services::TokenBroker;

/// Tokens held by a session
#[derive(Debug, Default)]
pub struct SessionTokens {
    pub(crate) remote: Vec<Token>,
    pub(crate) local: Option<Token>,
}

/// Remote-worker session scoped to one container node's subtree.
///
/// Tokens acquired inside the session are reused by later calls and released
/// together when the container finishes. All mutations go through one async
/// mutex so acquire-or-reuse is atomic.
#[derive(Debug)]
pub struct SessionContext {
    additional_criteria: SelectionCriteria,
    tokens: Mutex<SessionTokens>,
}

impl SessionContext {
    pub fn new(additional_criteria: SelectionCriteria) -> Self {
        Self {
            additional_criteria,
            tokens: Mutex::new(SessionTokens::default()),
        }
    }

    /// Criteria inherited by every dispatch inside the session
    pub fn additional_criteria(&self) -> &SelectionCriteria {
        &self.additional_criteria
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionTokens> {
        self.tokens.lock().await
    }

    /// The session's local token, acquiring it on first use
    pub async fn local_token(&self, broker: &dyn TokenBroker) -> Result<Token> {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = &tokens.local {
            return Ok(token.clone());
        }
        let token = broker.get_local_token().await?;
        tokens.local = Some(token.clone());
        Ok(token)
    }

    /// Number of tokens currently held, local token included
    pub async fn token_count(&self) -> usize {
        let tokens = self.tokens.lock().await;
        tokens.remote.len() + usize::from(tokens.local.is_some())
    }

    /// Release every held token.
    ///
    /// All releases are attempted. A single failure is returned as is, several
    /// failures are aggregated into [`StepperError::MultipleTokenRelease`].
    #[instrument(skip(self, broker))]
    pub async fn release_tokens(&self, broker: &dyn TokenBroker) -> Result<()> {
        let held: Vec<Token> = {
            let mut tokens = self.tokens.lock().await;
            let mut held = std::mem::take(&mut tokens.remote);
            held.extend(tokens.local.take());
            held
        };

        let mut failures = Vec::new();
        for token in held {
            if let Err(e) = broker.release_token(&token.id).await {
                warn!(token_id = %token.id, error = %e, "Unable to release token");
                failures.push(e);
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(StepperError::MultipleTokenRelease(failures)),
        }
    }
}

/// Shared handle stored in the variables of the session's report node
pub type SharedSession = Arc<SessionContext>;
