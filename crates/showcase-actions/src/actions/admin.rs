use serde_json::{Value, json};
use showcase_common::{Error, Result};
use showcase_security::{Actor, Permission};
use tracing::info;

use super::Action;
use crate::api::ShowcaseApi;
use crate::schema;

pub struct AdminAdd;

impl Action for AdminAdd {
    fn name(&self) -> &'static str {
        "ckanext_showcase_admin_add"
    }

    fn description(&self) -> &'static str {
        "Make a user (username: name or id) a showcase admin."
    }

    fn permission(&self) -> Permission {
        Permission::Sysadmin
    }

    fn execute(&self, api: &ShowcaseApi, _actor: &Actor, data: Value) -> Result<Value> {
        let user = schema::showcase_admin_add_schema(api.store(), &data)?;

        if api.store().is_user_showcase_admin(&user.id)? {
            return Err(Error::invalid(
                "message",
                format!("ShowcaseAdmin with user_id '{}' already exists.", user.id),
            ));
        }

        api.store().add_showcase_admin(&user.id)?;
        info!("{} is now a showcase admin", user.name);
        Ok(json!({ "user_id": user.id }))
    }
}

pub struct AdminRemove;

impl Action for AdminRemove {
    fn name(&self) -> &'static str {
        "ckanext_showcase_admin_remove"
    }

    fn description(&self) -> &'static str {
        "Remove a user (username: name or id) from the showcase admins."
    }

    fn permission(&self) -> Permission {
        Permission::Sysadmin
    }

    fn execute(&self, api: &ShowcaseApi, _actor: &Actor, data: Value) -> Result<Value> {
        let user = schema::showcase_admin_remove_schema(api.store(), &data)?;

        if !api.store().remove_showcase_admin(&user.id)? {
            return Err(Error::NotFound(format!(
                "ShowcaseAdmin with user_id '{}' doesn't exist.",
                user.id
            )));
        }
        info!("{} is no longer a showcase admin", user.name);
        Ok(Value::Null)
    }
}

/// `[{name, id}]` for each active showcase admin.
pub struct AdminList;

impl Action for AdminList {
    fn name(&self) -> &'static str {
        "ckanext_showcase_admin_list"
    }

    fn description(&self) -> &'static str {
        "List the name and id of every active showcase admin."
    }

    fn permission(&self) -> Permission {
        Permission::Sysadmin
    }

    fn side_effect_free(&self) -> bool {
        true
    }

    fn execute(&self, api: &ShowcaseApi, _actor: &Actor, _data: Value) -> Result<Value> {
        let ids = api.store().showcase_admin_ids()?;
        if ids.is_empty() {
            return Ok(json!([]));
        }

        let admins: Vec<Value> = api
            .store()
            .active_users_by_ids(&ids)?
            .into_iter()
            .map(|user| json!({ "name": user.name, "id": user.id }))
            .collect();
        Ok(Value::Array(admins))
    }
}
