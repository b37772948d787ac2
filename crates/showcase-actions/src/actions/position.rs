use serde_json::{Value, json};
use showcase_common::Result;
use showcase_security::{Actor, Permission};

use super::Action;
use crate::api::ShowcaseApi;
use crate::schema;

pub struct PositionList;

impl Action for PositionList {
    fn name(&self) -> &'static str {
        "ckanext_showcase_position_list"
    }

    fn description(&self) -> &'static str {
        "List showcase display positions as [{showcase_id, position}]."
    }

    fn permission(&self) -> Permission {
        Permission::Public
    }

    fn side_effect_free(&self) -> bool {
        true
    }

    fn execute(&self, api: &ShowcaseApi, _actor: &Actor, _data: Value) -> Result<Value> {
        Ok(serde_json::to_value(api.store().position_entries()?)?)
    }
}

/// Move the given showcases to the front, in the given order.
pub struct PositionUpdate;

impl Action for PositionUpdate {
    fn name(&self) -> &'static str {
        "ckanext_showcase_position_update"
    }

    fn description(&self) -> &'static str {
        "Reorder showcases: showcase_ids (ids or names) come first, the rest keep their relative order."
    }

    fn permission(&self) -> Permission {
        Permission::ShowcaseAdmin
    }

    fn execute(&self, api: &ShowcaseApi, _actor: &Actor, data: Value) -> Result<Value> {
        let ids = schema::showcase_position_update_schema(api.store(), &data)?;
        let order = api.store().reorder_showcases(&ids)?;
        Ok(json!({ "showcase_ids": order }))
    }
}
