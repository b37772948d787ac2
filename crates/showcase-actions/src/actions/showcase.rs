use serde_json::Value;
use showcase_common::{Error, Result};
use showcase_db::{PackageRecord, SHOWCASE_TYPE, STATE_ACTIVE, STATE_DELETED};
use showcase_security::{Actor, Permission};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Action, can_read, show_dict, sort_by_position};
use crate::api::ShowcaseApi;
use crate::schema;

/// Create a showcase package and give it the last display position.
pub struct ShowcaseCreate;

impl Action for ShowcaseCreate {
    fn name(&self) -> &'static str {
        "ckanext_showcase_create"
    }

    fn description(&self) -> &'static str {
        "Create a showcase. Takes the usual package fields plus image_url and redirect_link."
    }

    fn permission(&self) -> Permission {
        Permission::ShowcaseAdmin
    }

    fn execute(&self, api: &ShowcaseApi, actor: &Actor, data: Value) -> Result<Value> {
        let request = schema::showcase_create_schema(api.store(), actor, &data)?;

        let mut package =
            PackageRecord::new(Uuid::new_v4().to_string(), request.name, SHOWCASE_TYPE);
        package.creator_user_id = actor.user_id.clone();
        request.fields.apply(&mut package);

        let position = api.store().insert_showcase(&package)?;
        info!(
            "showcase {} created at position {position}",
            package.name
        );

        let stored = api
            .store()
            .get_package(&package.id)?
            .ok_or_else(|| Error::NotFound("Showcase".into()))?;
        Ok(serde_json::to_value(show_dict(api, stored))?)
    }
}

pub struct ShowcaseUpdate;

impl Action for ShowcaseUpdate {
    fn name(&self) -> &'static str {
        "ckanext_showcase_update"
    }

    fn description(&self) -> &'static str {
        "Update a showcase, identified by id or name. Omitted fields other than name, title, private and state are cleared."
    }

    fn permission(&self) -> Permission {
        Permission::ShowcaseAdmin
    }

    fn execute(&self, api: &ShowcaseApi, actor: &Actor, data: Value) -> Result<Value> {
        let request = schema::showcase_update_schema(api.store(), actor, &data)?;

        let mut package = request.showcase;
        if let Some(name) = request.name {
            package.name = name;
        }
        request.fields.apply(&mut package);
        api.store().update_package(&package)?;
        debug!("showcase {} updated", package.id);

        let stored = api
            .store()
            .get_package(&package.id)?
            .ok_or_else(|| Error::NotFound("Showcase".into()))?;
        Ok(serde_json::to_value(show_dict(api, stored))?)
    }
}

/// Soft-delete a showcase after dropping its associations and position.
pub struct ShowcaseDelete;

impl Action for ShowcaseDelete {
    fn name(&self) -> &'static str {
        "ckanext_showcase_delete"
    }

    fn description(&self) -> &'static str {
        "Delete a showcase by id or name, removing its dataset associations."
    }

    fn permission(&self) -> Permission {
        Permission::ShowcaseAdmin
    }

    fn execute(&self, api: &ShowcaseApi, _actor: &Actor, data: Value) -> Result<Value> {
        let showcase = schema::showcase_ref_schema(api.store(), &data, "id")?;

        let removed = api.store().delete_showcase(&showcase.id)?;

        info!(
            "showcase {} deleted ({removed} associations removed)",
            showcase.name
        );
        Ok(Value::Null)
    }
}

pub struct ShowcaseShow;

impl Action for ShowcaseShow {
    fn name(&self) -> &'static str {
        "ckanext_showcase_show"
    }

    fn description(&self) -> &'static str {
        "Return the package dict of a showcase, by id or name."
    }

    fn permission(&self) -> Permission {
        Permission::Public
    }

    fn side_effect_free(&self) -> bool {
        true
    }

    fn execute(&self, api: &ShowcaseApi, actor: &Actor, data: Value) -> Result<Value> {
        let showcase = match schema::showcase_ref_schema(api.store(), &data, "id") {
            Ok(showcase) => showcase,
            Err(Error::Validation(errors)) if errors.get("id").is_some() => {
                return Err(Error::NotFound("Showcase".into()));
            }
            Err(e) => return Err(e),
        };

        if showcase.state == STATE_DELETED && !actor.sysadmin {
            return Err(Error::NotFound("Showcase".into()));
        }
        if !can_read(actor, &showcase) {
            let who = actor.user_name.as_deref().unwrap_or("anonymous user");
            return Err(Error::NotAuthorized(format!(
                "User {who} not authorized to read showcase {}",
                showcase.id
            )));
        }

        Ok(serde_json::to_value(show_dict(api, showcase))?)
    }
}

/// Every active showcase the caller may see, in display order.
pub struct ShowcaseList;

impl Action for ShowcaseList {
    fn name(&self) -> &'static str {
        "ckanext_showcase_list"
    }

    fn description(&self) -> &'static str {
        "List all active showcases in display order. Private ones are listed only for showcase admins."
    }

    fn permission(&self) -> Permission {
        Permission::Public
    }

    fn side_effect_free(&self) -> bool {
        true
    }

    fn execute(&self, api: &ShowcaseApi, actor: &Actor, _data: Value) -> Result<Value> {
        let mut showcases: Vec<PackageRecord> = api
            .store()
            .list_packages_by_type(SHOWCASE_TYPE, STATE_ACTIVE)?
            .into_iter()
            .filter(|p| can_read(actor, p))
            .collect();
        sort_by_position(api, &mut showcases)?;

        let dicts: Vec<_> = showcases.into_iter().map(|p| show_dict(api, p)).collect();
        Ok(serde_json::to_value(dicts)?)
    }
}
