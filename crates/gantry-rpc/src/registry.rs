//! Flat action registry: tag dispatch of an `action` string onto a method
//! table.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::context::ActionContext;
use crate::errors::{ActionError, UNKNOWN_ACTION};
use crate::types::{ActionRequest, ActionResponse};

/// One entry in the action table.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext)
        -> Result<Value, ActionError>;
}

/// The action table.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<&'static str, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: ActionHandler + 'static>(&mut self, name: &'static str, handler: H) {
        let _ = self.actions.insert(name, Box::new(handler));
    }

    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    #[must_use]
    pub fn action_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.actions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Dispatch one envelope. Unknown actions and handler errors come back
    /// as error responses, never as panics.
    pub async fn dispatch(&self, request: ActionRequest, ctx: &ActionContext) -> ActionResponse {
        let Some(handler) = self.actions.get(request.action.as_str()) else {
            return ActionResponse::error(
                request.id,
                UNKNOWN_ACTION,
                format!("Unknown action: {}", request.action),
            );
        };
        debug!(action = %request.action, "dispatching");
        match handler.handle(request.params, ctx).await {
            Ok(result) => ActionResponse::success(request.id, result),
            Err(err) => ActionResponse::error(request.id, err.code(), err.to_string()),
        }
    }
}
