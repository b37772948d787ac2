use std::sync::Arc;

use serde_json::Value;
use showcase_common::{Error, Result};
use showcase_config::PortalConfig;
use showcase_db::{STATE_ACTIVE, ShowcaseStore};
use showcase_security::Actor;
use tracing::{debug, info};

use crate::actions::ActionRegistry;

/// Per-call context: who is calling and whether authorization is skipped.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// User name or id.
    pub user: Option<String>,
    pub ignore_auth: bool,
}

impl Context {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(name_or_id: impl Into<String>) -> Self {
        Self {
            user: Some(name_or_id.into()),
            ignore_auth: false,
        }
    }

    /// Internal caller that bypasses authorization.
    pub fn site() -> Self {
        Self {
            user: None,
            ignore_auth: true,
        }
    }
}

/// Entry point for every showcase action.
pub struct ShowcaseApi {
    store: Arc<ShowcaseStore>,
    portal: PortalConfig,
    registry: ActionRegistry,
}

impl ShowcaseApi {
    pub fn new(store: Arc<ShowcaseStore>, portal: PortalConfig) -> Self {
        Self {
            store,
            portal,
            registry: ActionRegistry::with_defaults(),
        }
    }

    pub fn store(&self) -> &ShowcaseStore {
        &self.store
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Run the named action for the caller in `context`.
    pub fn call(&self, context: &Context, action: &str, data: Value) -> Result<Value> {
        let handler = self
            .registry
            .get(action)
            .ok_or_else(|| Error::NotFound(format!("action {action}")))?;

        let actor = self.actor(context)?;
        if !context.ignore_auth {
            handler.permission().check(&actor, action)?;
        }

        debug!(
            action,
            user = actor.user_name.as_deref().unwrap_or("anonymous"),
            "calling action"
        );
        let result = handler.execute(self, &actor, data)?;
        if !handler.side_effect_free() {
            info!(action, "action completed");
        }
        Ok(result)
    }

    /// Resolve the context's user. Unknown or inactive users act anonymously.
    pub fn actor(&self, context: &Context) -> Result<Actor> {
        if context.ignore_auth {
            return Ok(Actor::site());
        }
        let Some(name_or_id) = context.user.as_deref() else {
            return Ok(Actor::anonymous());
        };

        match self.store.find_user(name_or_id)? {
            Some(user) if user.state == STATE_ACTIVE => {
                let showcase_admin = self.store.is_user_showcase_admin(&user.id)?;
                Ok(Actor {
                    user_id: Some(user.id),
                    user_name: Some(user.name),
                    sysadmin: user.sysadmin,
                    showcase_admin,
                })
            }
            _ => {
                debug!("unknown or inactive user {name_or_id}, treating as anonymous");
                Ok(Actor::anonymous())
            }
        }
    }
}
