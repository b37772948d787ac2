pub mod admin;
pub mod association;
pub mod position;
pub mod showcase;

use std::collections::BTreeMap;

use serde_json::Value;
use showcase_common::Result;
use showcase_db::{PackageRecord, SHOWCASE_TYPE};
use showcase_security::{Actor, Permission};

use crate::api::ShowcaseApi;
use crate::schema::{self, ShowcaseDict};

/// A named operation callable through [`ShowcaseApi::call`].
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn permission(&self) -> Permission;

    /// Read-only actions may be served from GET requests.
    fn side_effect_free(&self) -> bool {
        false
    }

    fn execute(&self, api: &ShowcaseApi, actor: &Actor, data: Value) -> Result<Value>;
}

/// Actions by name.
pub struct ActionRegistry {
    actions: BTreeMap<&'static str, Box<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(showcase::ShowcaseCreate));
        registry.register(Box::new(showcase::ShowcaseUpdate));
        registry.register(Box::new(showcase::ShowcaseDelete));
        registry.register(Box::new(showcase::ShowcaseShow));
        registry.register(Box::new(showcase::ShowcaseList));
        registry.register(Box::new(association::ShowcasePackageList));
        registry.register(Box::new(association::PackageShowcaseList));
        registry.register(Box::new(association::OrganizationShowcaseList));
        registry.register(Box::new(association::AssociationCreate));
        registry.register(Box::new(association::AssociationDelete));
        registry.register(Box::new(admin::AdminAdd));
        registry.register(Box::new(admin::AdminRemove));
        registry.register(Box::new(admin::AdminList));
        registry.register(Box::new(position::PositionList));
        registry.register(Box::new(position::PositionUpdate));
        registry
    }

    /// Add an action, replacing any existing one with the same name.
    pub fn register(&mut self, action: Box<dyn Action>) {
        self.actions.insert(action.name(), action);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Action> {
        self.actions.get(name).map(|a| a.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Action> {
        self.actions.values().map(|a| a.as_ref())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Whether `actor` may read `package`. Private showcases are for showcase
/// managers, private datasets for sysadmins; creators always see their own.
pub(crate) fn can_read(actor: &Actor, package: &PackageRecord) -> bool {
    if !package.private {
        return true;
    }
    if package.creator_user_id.is_some() && package.creator_user_id == actor.user_id {
        return true;
    }
    if package.package_type == SHOWCASE_TYPE {
        actor.can_manage_showcases()
    } else {
        actor.sysadmin
    }
}

pub(crate) fn show_dict(api: &ShowcaseApi, package: PackageRecord) -> ShowcaseDict {
    schema::showcase_show_schema(package, &api.portal().site_url)
}

/// Active, readable showcases for `ids`, sorted by display position.
pub(crate) fn visible_showcases(
    api: &ShowcaseApi,
    actor: &Actor,
    ids: &[String],
) -> Result<Vec<ShowcaseDict>> {
    let mut showcases = Vec::with_capacity(ids.len());
    for id in ids {
        match api.store().get_package(id)? {
            Some(p) if p.is_active() && can_read(actor, &p) => showcases.push(p),
            _ => tracing::debug!("skipping showcase {id}: inactive or not visible"),
        }
    }
    sort_by_position(api, &mut showcases)?;
    Ok(showcases.into_iter().map(|p| show_dict(api, p)).collect())
}

/// Stable sort by stored position; unpositioned showcases go last.
pub(crate) fn sort_by_position(api: &ShowcaseApi, showcases: &mut [PackageRecord]) -> Result<()> {
    let positions = api.store().showcase_positions()?;
    showcases.sort_by_key(|p| {
        positions
            .iter()
            .position(|id| *id == p.id)
            .unwrap_or(usize::MAX)
    });
    Ok(())
}
