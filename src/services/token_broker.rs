use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{Function, Output, Token, TokenOwner};
use crate::routing::criteria::SelectionCriteria;

/// External capacity service leasing worker tokens.
///
/// `get_token` suspends until a token is available or the broker's own
/// backpressure policy rejects the request.
#[async_trait]
pub trait TokenBroker: Send + Sync {
    async fn get_local_token(&self) -> Result<Token>;

    async fn get_token(
        &self,
        pretender_attributes: &HashMap<String, String>,
        criteria: &SelectionCriteria,
        open_session: bool,
        owner: &TokenOwner,
    ) -> Result<Token>;

    async fn release_token(&self, token_id: &str) -> Result<()>;
}

/// Remote dispatch of a function call on a leased token.
///
/// Business failures come back inside [`Output::error`]; transport failures are errors.
#[async_trait]
pub trait FunctionDispatcher: Send + Sync {
    async fn call(&self, token_id: &str, function: &Function, input: &Value) -> Result<Output>;
}
