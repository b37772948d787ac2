//! Request schemas: turn an action's JSON data dict into a typed request,
//! collecting every field problem into one `ValidationErrors`.

use serde::Serialize;
use serde_json::{Map, Value};
use showcase_common::{Error, Result, ValidationErrors};
use showcase_db::{
    DATASET_TYPE, GroupRecord, PackageExtra, PackageRecord, PackageTag, SHOWCASE_TYPE,
    ShowcaseStore, UserRecord,
};
use showcase_security::{Actor, InputValidator};

pub const IMAGE_URL: &str = "image_url";
pub const REDIRECT_LINK: &str = "redirect_link";
pub const ORIGINAL_RELATED_ITEM_ID: &str = "original_related_item_id";

const MISSING: &str = "Missing value";
const STATES: &[&str] = &["active", "draft", "deleted"];

type Data = Map<String, Value>;

/// Editable showcase fields shared by create and update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowcaseFields {
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub notes: Option<String>,
    pub url: Option<String>,
    pub private: Option<bool>,
    pub state: Option<String>,
    pub tags: Vec<String>,
    pub extras: Vec<PackageExtra>,
    pub image_url: Option<String>,
    pub redirect_link: Option<String>,
}

impl ShowcaseFields {
    fn parse(data: &Data, actor: &Actor, errors: &mut ValidationErrors) -> Self {
        let author_email = text(data, "author_email", errors);
        if let Some(email) = &author_email {
            if let Err(msg) = InputValidator::validate_email(email) {
                errors.add("author_email", msg);
            }
        }

        let url = text(data, "url", errors);
        if let Some(url) = &url {
            if let Err(msg) = InputValidator::validate_url(url) {
                errors.add("url", msg);
            }
        }

        let redirect_link = text(data, REDIRECT_LINK, errors);
        if let Some(link) = &redirect_link {
            if let Err(msg) = InputValidator::validate_url(link) {
                errors.add(REDIRECT_LINK, msg);
            }
        }

        // Only sysadmins may set the state directly.
        let state = if actor.sysadmin {
            let state = text(data, "state", errors);
            if let Some(state) = &state {
                if !STATES.contains(&state.as_str()) {
                    errors.add("state", format!("State must be one of: {}", STATES.join(", ")));
                }
            }
            state
        } else {
            None
        };

        Self {
            title: free_text(data, "title", errors),
            author: free_text(data, "author", errors),
            author_email,
            notes: free_text(data, "notes", errors),
            url,
            private: flag(data, "private", errors),
            state,
            tags: tags(data, errors),
            extras: extras(data, errors),
            image_url: text(data, IMAGE_URL, errors),
            redirect_link,
        }
    }

    /// Write the fields onto a package. Free-text fields, tags and extras are
    /// replaced outright; title, visibility and state only when given.
    pub fn apply(self, package: &mut PackageRecord) {
        if let Some(title) = self.title {
            package.title = title;
        }
        if let Some(private) = self.private {
            package.private = private;
        }
        if let Some(state) = self.state {
            package.state = state;
        }
        package.author = self.author;
        package.author_email = self.author_email;
        package.notes = self.notes;
        package.url = self.url;
        package.tags = self
            .tags
            .into_iter()
            .map(|name| PackageTag { name })
            .collect();
        package.extras = self.extras;
        if let Some(image_url) = self.image_url {
            package.set_extra(IMAGE_URL, image_url);
        }
        if let Some(link) = self.redirect_link {
            package.set_extra(REDIRECT_LINK, link);
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateShowcase {
    pub name: String,
    pub fields: ShowcaseFields,
}

#[derive(Debug, Clone)]
pub struct UpdateShowcase {
    pub showcase: PackageRecord,
    pub name: Option<String>,
    pub fields: ShowcaseFields,
}

#[derive(Debug, Clone)]
pub struct AssociationRequest {
    pub package: PackageRecord,
    pub showcase: PackageRecord,
    pub organization: Option<GroupRecord>,
}

/// Shown form of a showcase: the package plus its image and link extras
/// lifted to top-level fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowcaseDict {
    #[serde(flatten)]
    pub package: PackageRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_display_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_related_item_id: Option<String>,
}

pub fn showcase_create_schema(
    store: &ShowcaseStore,
    actor: &Actor,
    data: &Value,
) -> Result<CreateShowcase> {
    let data = object(data)?;
    let mut errors = ValidationErrors::default();

    if text(&data, "id", &mut errors).is_some() {
        errors.add("id", "The input field id was not expected.");
    }

    let name = required(&data, "name", &mut errors);
    if let Some(name) = &name {
        check_name(store, name, None, &mut errors)?;
    }

    let mut fields = ShowcaseFields::parse(&data, actor, &mut errors);
    errors.into_result()?;

    let name = name.ok_or_else(|| Error::invalid("name", MISSING))?;
    if fields.title.is_none() {
        fields.title = Some(name.clone());
    }
    Ok(CreateShowcase { name, fields })
}

/// `id` (or, failing that, `name`) picks the showcase; neither can move it to
/// another package.
pub fn showcase_update_schema(
    store: &ShowcaseStore,
    actor: &Actor,
    data: &Value,
) -> Result<UpdateShowcase> {
    let data = object(data)?;
    let mut errors = ValidationErrors::default();

    let key = if data.contains_key("id") { "id" } else { "name" };
    let showcase = resolve_package(store, &data, key, SHOWCASE_TYPE, &mut errors)?;

    let name = match (&showcase, key) {
        (Some(showcase), "id") => {
            let name = text(&data, "name", &mut errors);
            if let Some(name) = &name {
                check_name(store, name, Some(&showcase.id), &mut errors)?;
            }
            name
        }
        _ => None,
    };

    let fields = ShowcaseFields::parse(&data, actor, &mut errors);
    match showcase {
        Some(showcase) if errors.is_empty() => Ok(UpdateShowcase {
            showcase,
            name,
            fields,
        }),
        _ => Err(Error::Validation(errors)),
    }
}

pub fn showcase_show_schema(mut package: PackageRecord, site_url: &str) -> ShowcaseDict {
    let image_url = package.remove_extra(IMAGE_URL);
    let redirect_link = package.remove_extra(REDIRECT_LINK);
    let original_related_item_id = package.remove_extra(ORIGINAL_RELATED_ITEM_ID);

    let image_display_url = image_url.as_deref().filter(|u| !u.is_empty()).map(|u| {
        if u.starts_with("http") {
            u.to_string()
        } else {
            format!(
                "{}/uploads/showcase/{}",
                site_url.trim_end_matches('/'),
                u
            )
        }
    });

    ShowcaseDict {
        package,
        image_url,
        image_display_url,
        redirect_link,
        original_related_item_id,
    }
}

/// A showcase identified by `key` (id or name).
pub fn showcase_ref_schema(store: &ShowcaseStore, data: &Value, key: &str) -> Result<PackageRecord> {
    let data = object(data)?;
    let mut errors = ValidationErrors::default();
    let showcase = resolve_package(store, &data, key, SHOWCASE_TYPE, &mut errors)?;
    showcase.ok_or(Error::Validation(errors))
}

pub fn showcase_package_list_schema(store: &ShowcaseStore, data: &Value) -> Result<PackageRecord> {
    showcase_ref_schema(store, data, "showcase_id")
}

pub fn package_showcase_list_schema(store: &ShowcaseStore, data: &Value) -> Result<PackageRecord> {
    let data = object(data)?;
    let mut errors = ValidationErrors::default();
    let package = resolve_package(store, &data, "package_id", DATASET_TYPE, &mut errors)?;
    package.ok_or(Error::Validation(errors))
}

pub fn organization_showcase_list_schema(
    store: &ShowcaseStore,
    data: &Value,
) -> Result<GroupRecord> {
    let data = object(data)?;
    let mut errors = ValidationErrors::default();
    let organization = match required(&data, "organization_id", &mut errors) {
        Some(value) => resolve_organization(store, &value, "organization_id", &mut errors)?,
        None => None,
    };
    organization.ok_or(Error::Validation(errors))
}

pub fn showcase_package_association_create_schema(
    store: &ShowcaseStore,
    data: &Value,
) -> Result<AssociationRequest> {
    let data = object(data)?;
    let mut errors = ValidationErrors::default();

    let package = resolve_package(store, &data, "package_id", DATASET_TYPE, &mut errors)?;
    let showcase = resolve_package(store, &data, "showcase_id", SHOWCASE_TYPE, &mut errors)?;
    let organization = match text(&data, "organization_id", &mut errors) {
        Some(value) => resolve_organization(store, &value, "organization_id", &mut errors)?,
        None => None,
    };

    match (package, showcase) {
        (Some(package), Some(showcase)) if errors.is_empty() => Ok(AssociationRequest {
            package,
            showcase,
            organization,
        }),
        _ => Err(Error::Validation(errors)),
    }
}

pub fn showcase_package_association_delete_schema(
    store: &ShowcaseStore,
    data: &Value,
) -> Result<AssociationRequest> {
    showcase_package_association_create_schema(store, data)
}

pub fn showcase_admin_add_schema(store: &ShowcaseStore, data: &Value) -> Result<UserRecord> {
    let data = object(data)?;
    let mut errors = ValidationErrors::default();
    if let Some(username) = required(&data, "username", &mut errors) {
        match store.find_user(&username)? {
            Some(user) => return Ok(user),
            None => errors.add("username", "Not found: User"),
        }
    }
    Err(Error::Validation(errors))
}

pub fn showcase_admin_remove_schema(store: &ShowcaseStore, data: &Value) -> Result<UserRecord> {
    showcase_admin_add_schema(store, data)
}

/// Resolve every entry of `showcase_ids` to an active showcase id, keeping
/// order.
pub fn showcase_position_update_schema(
    store: &ShowcaseStore,
    data: &Value,
) -> Result<Vec<String>> {
    let data = object(data)?;
    let mut errors = ValidationErrors::default();

    let items = match data.get("showcase_ids") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) | None | Some(Value::Null) => {
            return Err(Error::invalid("showcase_ids", MISSING));
        }
        Some(_) => return Err(Error::invalid("showcase_ids", "Must be a list")),
    };

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let Some(value) = item.as_str() else {
            errors.add("showcase_ids", "Must be a list of showcase ids or names");
            continue;
        };
        match store.find_package(value)? {
            Some(p) if p.package_type == SHOWCASE_TYPE && p.is_active() => ids.push(p.id),
            _ => errors.add("showcase_ids", format!("Not found: Showcase {value}")),
        }
    }

    errors.into_result()?;
    Ok(ids)
}

fn check_name(
    store: &ShowcaseStore,
    name: &str,
    except_id: Option<&str>,
    errors: &mut ValidationErrors,
) -> Result<()> {
    if let Err(msg) = InputValidator::validate_name(name) {
        errors.add("name", msg);
    } else if store.package_name_taken(name, except_id)? {
        errors.add("name", "That URL is already in use.");
    }
    Ok(())
}

fn resolve_package(
    store: &ShowcaseStore,
    data: &Data,
    key: &str,
    package_type: &str,
    errors: &mut ValidationErrors,
) -> Result<Option<PackageRecord>> {
    let Some(value) = required(data, key, errors) else {
        return Ok(None);
    };
    match store.find_package(&value)? {
        Some(package) if package.package_type == package_type => Ok(Some(package)),
        _ => {
            let label = if package_type == SHOWCASE_TYPE {
                "Showcase"
            } else {
                "Dataset"
            };
            errors.add(key, format!("Not found: {label}"));
            Ok(None)
        }
    }
}

fn resolve_organization(
    store: &ShowcaseStore,
    value: &str,
    key: &str,
    errors: &mut ValidationErrors,
) -> Result<Option<GroupRecord>> {
    match store.find_group(value)? {
        Some(group) if group.is_organization => Ok(Some(group)),
        _ => {
            errors.add(key, "Not found: Organization");
            Ok(None)
        }
    }
}

fn object(data: &Value) -> Result<Data> {
    match data {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::invalid("data", "Must be a JSON object")),
    }
}

/// A scalar field as a string; absent, null and "" count as missing.
fn text(data: &Data, key: &str, errors: &mut ValidationErrors) -> Option<String> {
    match data.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(_) => {
            errors.add(key, "Must be a string");
            None
        }
    }
}

fn free_text(data: &Data, key: &str, errors: &mut ValidationErrors) -> Option<String> {
    text(data, key, errors).map(|s| InputValidator::sanitize(&s))
}

fn required(data: &Data, key: &str, errors: &mut ValidationErrors) -> Option<String> {
    let value = text(data, key, errors);
    if value.is_none() && errors.get(key).is_none() {
        errors.add(key, MISSING);
    }
    value
}

fn flag(data: &Data, key: &str, errors: &mut ValidationErrors) -> Option<bool> {
    match data.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Some(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Some(false),
        Some(_) => {
            errors.add(key, "Must be a boolean");
            None
        }
    }
}

/// `tags` as `[{"name": ..}]` or `["..."]`, plus anything in `tag_string`.
fn tags(data: &Data, errors: &mut ValidationErrors) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    match data.get("tags") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(name) => names.push(name.clone()),
                    Value::Object(tag) => match tag.get("name").and_then(Value::as_str) {
                        Some(name) => names.push(name.to_string()),
                        None => errors.add("tags", "name: Missing value"),
                    },
                    _ => errors.add("tags", "Must be a list of tags"),
                }
            }
        }
        Some(_) => errors.add("tags", "Must be a list of tags"),
    }

    if let Some(tag_string) = text(data, "tag_string", errors) {
        names.extend(InputValidator::parse_tag_string(&tag_string));
    }

    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if let Err(msg) = InputValidator::validate_tag(&name) {
            errors.add("tags", msg);
        } else if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}

fn extras(data: &Data, errors: &mut ValidationErrors) -> Vec<PackageExtra> {
    let items = match data.get("extras") {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            errors.add("extras", "Must be a list of key/value pairs");
            return Vec::new();
        }
    };

    let mut extras = Vec::with_capacity(items.len());
    for item in items {
        let key = item.get("key").and_then(Value::as_str).unwrap_or_default();
        if key.is_empty() {
            errors.add("extras", "key: Missing value");
            continue;
        }
        let value = match item.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        extras.push(PackageExtra {
            key: key.to_string(),
            value,
        });
    }
    extras
}
