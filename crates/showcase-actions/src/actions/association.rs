use serde_json::Value;
use showcase_common::{Error, Result};
use showcase_db::Association;
use showcase_security::{Actor, Permission};
use tracing::debug;

use super::{Action, can_read, visible_showcases};
use crate::api::ShowcaseApi;
use crate::schema;

/// Datasets in a showcase.
pub struct ShowcasePackageList;

impl Action for ShowcasePackageList {
    fn name(&self) -> &'static str {
        "ckanext_showcase_package_list"
    }

    fn description(&self) -> &'static str {
        "List the active datasets associated with a showcase (showcase_id: id or name)."
    }

    fn permission(&self) -> Permission {
        Permission::Public
    }

    fn side_effect_free(&self) -> bool {
        true
    }

    fn execute(&self, api: &ShowcaseApi, actor: &Actor, data: Value) -> Result<Value> {
        let showcase = schema::showcase_package_list_schema(api.store(), &data)?;
        if !can_read(actor, &showcase) {
            return Err(Error::NotAuthorized(format!(
                "not authorized to read showcase {}",
                showcase.id
            )));
        }

        let mut packages = Vec::new();
        for package_id in api.store().package_ids_for_showcase(&showcase.id)? {
            match api.store().get_package(&package_id)? {
                Some(package) if package.is_active() && can_read(actor, &package) => {
                    packages.push(package)
                }
                Some(package) if package.is_active() => {
                    debug!("Not authorized to access Package with ID: {package_id}")
                }
                _ => {}
            }
        }
        Ok(serde_json::to_value(packages)?)
    }
}

/// Showcases that feature a dataset.
pub struct PackageShowcaseList;

impl Action for PackageShowcaseList {
    fn name(&self) -> &'static str {
        "ckanext_package_showcase_list"
    }

    fn description(&self) -> &'static str {
        "List the showcases a dataset is featured in (package_id: id or name)."
    }

    fn permission(&self) -> Permission {
        Permission::Public
    }

    fn side_effect_free(&self) -> bool {
        true
    }

    fn execute(&self, api: &ShowcaseApi, actor: &Actor, data: Value) -> Result<Value> {
        let package = schema::package_showcase_list_schema(api.store(), &data)?;
        let ids = api.store().showcase_ids_for_package(&package.id)?;
        Ok(serde_json::to_value(visible_showcases(api, actor, &ids)?)?)
    }
}

pub struct OrganizationShowcaseList;

impl Action for OrganizationShowcaseList {
    fn name(&self) -> &'static str {
        "ckanext_organization_showcase_list"
    }

    fn description(&self) -> &'static str {
        "List the showcases associated with an organization (organization_id: id or name)."
    }

    fn permission(&self) -> Permission {
        Permission::Public
    }

    fn side_effect_free(&self) -> bool {
        true
    }

    fn execute(&self, api: &ShowcaseApi, actor: &Actor, data: Value) -> Result<Value> {
        let organization = schema::organization_showcase_list_schema(api.store(), &data)?;
        let ids = api.store().showcase_ids_for_organization(&organization.id)?;
        Ok(serde_json::to_value(visible_showcases(api, actor, &ids)?)?)
    }
}

/// Link a dataset to a showcase. The organization defaults to the dataset's
/// owner.
pub struct AssociationCreate;

impl Action for AssociationCreate {
    fn name(&self) -> &'static str {
        "ckanext_showcase_package_association_create"
    }

    fn description(&self) -> &'static str {
        "Associate a dataset with a showcase (package_id, showcase_id, optional organization_id)."
    }

    fn permission(&self) -> Permission {
        Permission::ShowcaseAdmin
    }

    fn execute(&self, api: &ShowcaseApi, _actor: &Actor, data: Value) -> Result<Value> {
        let request = schema::showcase_package_association_create_schema(api.store(), &data)?;
        let package_id = request.package.id;
        let showcase_id = request.showcase.id;

        if api.store().association_exists(&package_id, &showcase_id)? {
            return Err(Error::invalid(
                "message",
                format!(
                    "ShowcasePackageAssociation with package_id '{package_id}' and showcase_id '{showcase_id}' already exists."
                ),
            ));
        }

        let organization_id = match request.organization {
            Some(org) => Some(org.id),
            None => match request.package.owner_org.as_deref() {
                Some(owner) => api.store().find_group(owner)?.map(|g| g.id),
                None => None,
            },
        };

        let association = Association {
            package_id,
            showcase_id,
            organization_id,
        };
        api.store().create_association(&association)?;
        Ok(serde_json::to_value(association)?)
    }
}

pub struct AssociationDelete;

impl Action for AssociationDelete {
    fn name(&self) -> &'static str {
        "ckanext_showcase_package_association_delete"
    }

    fn description(&self) -> &'static str {
        "Remove the association between a dataset and a showcase."
    }

    fn permission(&self) -> Permission {
        Permission::ShowcaseAdmin
    }

    fn execute(&self, api: &ShowcaseApi, _actor: &Actor, data: Value) -> Result<Value> {
        let request = schema::showcase_package_association_delete_schema(api.store(), &data)?;
        let package_id = request.package.id;
        let showcase_id = request.showcase.id;

        if !api.store().delete_association(&package_id, &showcase_id)? {
            return Err(Error::NotFound(format!(
                "ShowcasePackageAssociation with package_id '{package_id}' and showcase_id '{showcase_id}' doesn't exist."
            )));
        }
        Ok(Value::Null)
    }
}
