use serde::Serialize;
use showcase_common::{Error, Result};
use tracing::debug;

/// Who is making a request, as far as showcase authorization cares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub sysadmin: bool,
    pub showcase_admin: bool,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Trusted internal caller: passes every check.
    pub fn site() -> Self {
        Self {
            user_name: Some("site".into()),
            sysadmin: true,
            ..Self::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() || self.sysadmin
    }

    /// Sysadmins and showcase admins may curate and see private showcases.
    pub fn can_manage_showcases(&self) -> bool {
        self.sysadmin || self.showcase_admin
    }
}

/// The level an action requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Public,
    ShowcaseAdmin,
    Sysadmin,
}

impl Permission {
    pub fn check(self, actor: &Actor, action: &str) -> Result<()> {
        let allowed = match self {
            Permission::Public => true,
            Permission::ShowcaseAdmin => actor.can_manage_showcases(),
            Permission::Sysadmin => actor.sysadmin,
        };
        if allowed {
            return Ok(());
        }

        debug!(
            "denied {action} for {}",
            actor.user_name.as_deref().unwrap_or("anonymous")
        );
        let who = actor.user_name.as_deref().unwrap_or("anonymous user");
        Err(Error::NotAuthorized(format!(
            "User {who} not authorized to call {action}"
        )))
    }
}
