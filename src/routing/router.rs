use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::criteria::{affinity_score, Criterion, SelectionCriteria};
use super::session::SessionContext;
use crate::error::Result;
use crate::models::{Function, Token, TokenOwner};
use crate::services::{FunctionTypeRegistry, TokenBroker};

/// Chooses the token a function call is dispatched on
pub struct FunctionRouter {
    broker: Arc<dyn TokenBroker>,
    function_types: Option<Arc<dyn FunctionTypeRegistry>>,
    route_prefix: String,
}

/// Everything the router needs to know about one dispatch
pub struct TokenRequest<'a> {
    pub function: &'a Function,
    /// Criteria declared on the dispatching node
    pub call_criteria: SelectionCriteria,
    /// Run variables visible from the dispatching node, as `(name, value)`
    pub variables: Vec<(String, String)>,
    pub session: Option<&'a SessionContext>,
    /// Forces a local token, e.g. when the call is marked non-remote
    pub force_local: bool,
    pub owner: TokenOwner,
}

impl FunctionRouter {
    pub fn new(
        broker: Arc<dyn TokenBroker>,
        function_types: Option<Arc<dyn FunctionTypeRegistry>>,
        route_prefix: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            function_types,
            route_prefix: route_prefix.into(),
        }
    }

    pub fn broker(&self) -> &dyn TokenBroker {
        self.broker.as_ref()
    }

    /// Select a token for the request.
    ///
    /// Inside a session, tokens are reused when their attributes match and
    /// newly acquired tokens are kept by the session. Outside a session the
    /// caller owns the returned token and must release it.
    #[instrument(skip(self, request), fields(function_id = %request.function.id))]
    pub async fn select_token(&self, request: TokenRequest<'_>) -> Result<Token> {
        if request.function.requires_local_execution || request.force_local {
            return match request.session {
                Some(session) => session.local_token(self.broker.as_ref()).await,
                None => self.broker.get_local_token().await,
            };
        }

        let criteria = self.build_selection_criteria(
            request.call_criteria,
            request.function,
            request.session,
            &request.variables,
        )?;
        let pretender = HashMap::new();

        match request.session {
            Some(session) => {
                let mut tokens = session.lock().await;
                if let Some(token) = tokens
                    .remote
                    .iter()
                    .find(|t| affinity_score(&criteria, &t.attributes) > 0)
                {
                    debug!(token_id = %token.id, "Reusing session token");
                    return Ok(token.clone());
                }

                let token = self
                    .broker
                    .get_token(&pretender, &criteria, true, &request.owner)
                    .await?;
                debug!(token_id = %token.id, "Token added to session");
                tokens.remote.push(token.clone());
                Ok(token)
            }
            None => {
                self.broker
                    .get_token(&pretender, &criteria, false, &request.owner)
                    .await
            }
        }
    }

    /// Merge routing criteria by increasing precedence: call site, session,
    /// function type, function, then prefixed run variables.
    pub fn build_selection_criteria(
        &self,
        call_criteria: SelectionCriteria,
        function: &Function,
        session: Option<&SessionContext>,
        variables: &[(String, String)],
    ) -> Result<SelectionCriteria> {
        let mut criteria = call_criteria;

        if let Some(session) = session {
            criteria.extend(
                session
                    .additional_criteria()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }

        if let Some(types) = &self.function_types {
            criteria.extend(types.token_selection_criteria(function));
        }

        for (attribute, pattern) in &function.token_selection_criteria {
            criteria.insert(attribute.clone(), Criterion::mandatory(attribute, pattern)?);
        }

        for (name, value) in variables {
            if let Some(attribute) = name.strip_prefix(&self.route_prefix) {
                criteria.insert(
                    attribute.to_string(),
                    Criterion::mandatory(attribute, value)?,
                );
            }
        }

        Ok(criteria)
    }
}
