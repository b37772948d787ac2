use std::sync::Arc;

use serde_json::{Value, json};
use showcase_actions::{Context, ShowcaseApi};
use showcase_common::Error;
use showcase_config::PortalConfig;
use showcase_db::{
    DATASET_TYPE, GroupRecord, PackageRecord, STATE_ACTIVE, ShowcaseStore, UserRecord,
};

struct Fixture {
    api: ShowcaseApi,
}

impl Fixture {
    fn new() -> Self {
        let store = ShowcaseStore::in_memory_with_portal().unwrap();

        for (id, name, sysadmin) in [
            ("u-root", "root", true),
            ("u-curator", "curator", false),
            ("u-alice", "alice", false),
        ] {
            store
                .insert_user(&UserRecord {
                    id: id.into(),
                    name: name.into(),
                    state: STATE_ACTIVE.into(),
                    sysadmin,
                })
                .unwrap();
        }
        store.add_showcase_admin("u-curator").unwrap();

        store
            .insert_group(&GroupRecord {
                id: "org-1".into(),
                name: "met-office".into(),
                title: Some("Met Office".into()),
                is_organization: true,
                state: STATE_ACTIVE.into(),
            })
            .unwrap();

        let mut rainfall = PackageRecord::new("ds-rain", "rainfall", DATASET_TYPE);
        rainfall.owner_org = Some("org-1".into());
        store.insert_package(&rainfall).unwrap();

        store
            .insert_package(&PackageRecord::new("ds-roads", "roads", DATASET_TYPE))
            .unwrap();

        let mut secret = PackageRecord::new("ds-secret", "secret", DATASET_TYPE);
        secret.private = true;
        store.insert_package(&secret).unwrap();

        let portal = PortalConfig {
            site_url: "https://data.example.org".into(),
        };
        Self {
            api: ShowcaseApi::new(Arc::new(store), portal),
        }
    }

    fn call(&self, user: &str, action: &str, data: Value) -> showcase_common::Result<Value> {
        self.api.call(&Context::user(user), action, data)
    }

    fn create_showcase(&self, name: &str) -> Value {
        self.call(
            "curator",
            "ckanext_showcase_create",
            json!({ "name": name, "title": format!("{name} title") }),
        )
        .unwrap()
    }

    fn associate(&self, package: &str, showcase: &str) -> Value {
        self.call(
            "curator",
            "ckanext_showcase_package_association_create",
            json!({ "package_id": package, "showcase_id": showcase }),
        )
        .unwrap()
    }

    fn names(value: &Value) -> Vec<String> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap().to_string())
            .collect()
    }
}

#[test]
fn create_then_show_round_trip() {
    let fx = Fixture::new();
    let created = fx
        .call(
            "curator",
            "ckanext_showcase_create",
            json!({
                "name": "flood-maps",
                "notes": "Maps of recent floods",
                "url": "https://floods.example.org",
                "image_url": "flood.png",
                "tag_string": "floods, maps",
            }),
        )
        .unwrap();

    assert_eq!(created["type"], "showcase");
    assert_eq!(created["title"], "flood-maps");
    assert_eq!(created["creator_user_id"], "u-curator");
    assert_eq!(created["num_tags"], 2);
    assert_eq!(
        created["image_display_url"],
        "https://data.example.org/uploads/showcase/flood.png"
    );

    let shown = fx
        .api
        .call(
            &Context::anonymous(),
            "ckanext_showcase_show",
            json!({ "id": "flood-maps" }),
        )
        .unwrap();
    assert_eq!(shown["id"], created["id"]);
    assert_eq!(shown["image_url"], "flood.png");
    assert_eq!(shown["extras"], json!([]));
}

#[test]
fn only_showcase_admins_can_create() {
    let fx = Fixture::new();
    let err = fx
        .call("alice", "ckanext_showcase_create", json!({ "name": "nope" }))
        .unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));

    let err = fx
        .api
        .call(
            &Context::anonymous(),
            "ckanext_showcase_create",
            json!({ "name": "nope" }),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));

    assert!(
        fx.call("root", "ckanext_showcase_create", json!({ "name": "by-root" }))
            .is_ok()
    );
}

#[test]
fn unknown_action_is_not_found() {
    let fx = Fixture::new();
    let err = fx.call("root", "package_create", json!({})).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn update_renames_and_replaces_fields() {
    let fx = Fixture::new();
    let created = fx
        .call(
            "curator",
            "ckanext_showcase_create",
            json!({ "name": "apps", "notes": "old notes", "image_url": "a.png" }),
        )
        .unwrap();

    let updated = fx
        .call(
            "curator",
            "ckanext_showcase_update",
            json!({ "id": created["id"], "name": "better-apps", "redirect_link": "https://apps.example.org" }),
        )
        .unwrap();

    assert_eq!(updated["name"], "better-apps");
    assert_eq!(updated["title"], "apps");
    assert!(updated["notes"].is_null());
    assert!(updated.get("image_url").is_none());
    assert_eq!(updated["redirect_link"], "https://apps.example.org");
}

#[test]
fn update_rejects_a_name_in_use() {
    let fx = Fixture::new();
    let created = fx.create_showcase("apps");
    let err = fx
        .call(
            "curator",
            "ckanext_showcase_update",
            json!({ "id": created["id"], "name": "rainfall" }),
        )
        .unwrap_err();
    match err {
        Error::Validation(errors) => {
            assert_eq!(errors.get("name").unwrap(), ["That URL is already in use."])
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn list_follows_positions_and_hides_private_showcases() {
    let fx = Fixture::new();
    fx.create_showcase("first");
    fx.create_showcase("second");
    fx.call(
        "curator",
        "ckanext_showcase_create",
        json!({ "name": "hidden", "private": true }),
    )
    .unwrap();

    let public = fx
        .api
        .call(&Context::anonymous(), "ckanext_showcase_list", Value::Null)
        .unwrap();
    assert_eq!(Fixture::names(&public), vec!["first", "second"]);

    let curated = fx
        .call("curator", "ckanext_showcase_list", Value::Null)
        .unwrap();
    assert_eq!(Fixture::names(&curated), vec!["first", "second", "hidden"]);

    fx.call(
        "curator",
        "ckanext_showcase_position_update",
        json!({ "showcase_ids": ["second"] }),
    )
    .unwrap();
    let reordered = fx
        .call("alice", "ckanext_showcase_list", Value::Null)
        .unwrap();
    assert_eq!(Fixture::names(&reordered), vec!["second", "first"]);
}

#[test]
fn private_showcase_show_requires_admin() {
    let fx = Fixture::new();
    fx.call(
        "curator",
        "ckanext_showcase_create",
        json!({ "name": "hidden", "private": true }),
    )
    .unwrap();

    let err = fx
        .call("alice", "ckanext_showcase_show", json!({ "id": "hidden" }))
        .unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));
    assert!(
        fx.call("root", "ckanext_showcase_show", json!({ "id": "hidden" }))
            .is_ok()
    );
}

#[test]
fn show_of_missing_or_dataset_is_not_found() {
    let fx = Fixture::new();
    for id in ["nope", "rainfall"] {
        let err = fx
            .call("alice", "ckanext_showcase_show", json!({ "id": id }))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{id}");
    }
}

#[test]
fn association_lifecycle() {
    let fx = Fixture::new();
    fx.create_showcase("flood-maps");

    let assoc = fx.associate("rainfall", "flood-maps");
    assert_eq!(assoc["package_id"], "ds-rain");
    assert_eq!(assoc["organization_id"], "org-1");

    let roads = fx.associate("roads", "flood-maps");
    assert!(roads["organization_id"].is_null());

    let err = fx
        .call(
            "curator",
            "ckanext_showcase_package_association_create",
            json!({ "package_id": "rainfall", "showcase_id": "flood-maps" }),
        )
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));

    let packages = fx
        .call(
            "alice",
            "ckanext_showcase_package_list",
            json!({ "showcase_id": "flood-maps" }),
        )
        .unwrap();
    assert_eq!(Fixture::names(&packages), vec!["rainfall", "roads"]);

    fx.call(
        "curator",
        "ckanext_showcase_package_association_delete",
        json!({ "package_id": "roads", "showcase_id": "flood-maps" }),
    )
    .unwrap();
    let err = fx
        .call(
            "curator",
            "ckanext_showcase_package_association_delete",
            json!({ "package_id": "roads", "showcase_id": "flood-maps" }),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn showcase_package_list_skips_private_datasets() {
    let fx = Fixture::new();
    fx.create_showcase("flood-maps");
    fx.associate("secret", "flood-maps");
    fx.associate("roads", "flood-maps");

    let for_alice = fx
        .call(
            "alice",
            "ckanext_showcase_package_list",
            json!({ "showcase_id": "flood-maps" }),
        )
        .unwrap();
    assert_eq!(Fixture::names(&for_alice), vec!["roads"]);

    let for_root = fx
        .call(
            "root",
            "ckanext_showcase_package_list",
            json!({ "showcase_id": "flood-maps" }),
        )
        .unwrap();
    assert_eq!(Fixture::names(&for_root), vec!["secret", "roads"]);
}

#[test]
fn package_and_organization_showcase_lists() {
    let fx = Fixture::new();
    fx.create_showcase("alpha");
    fx.create_showcase("beta");
    fx.associate("rainfall", "beta");
    fx.associate("rainfall", "alpha");
    fx.associate("roads", "beta");

    let for_package = fx
        .call(
            "alice",
            "ckanext_package_showcase_list",
            json!({ "package_id": "rainfall" }),
        )
        .unwrap();
    assert_eq!(Fixture::names(&for_package), vec!["alpha", "beta"]);

    let for_org = fx
        .call(
            "alice",
            "ckanext_organization_showcase_list",
            json!({ "organization_id": "met-office" }),
        )
        .unwrap();
    assert_eq!(Fixture::names(&for_org), vec!["alpha", "beta"]);

    let err = fx
        .call(
            "alice",
            "ckanext_package_showcase_list",
            json!({ "package_id": "alpha" }),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn delete_removes_associations_and_position() {
    let fx = Fixture::new();
    fx.create_showcase("doomed");
    fx.create_showcase("kept");
    fx.associate("rainfall", "doomed");

    fx.call("curator", "ckanext_showcase_delete", json!({ "id": "doomed" }))
        .unwrap();

    let store = fx.api.store();
    assert!(store.showcase_ids_for_package("ds-rain").unwrap().is_empty());
    let positions = fx
        .call("alice", "ckanext_showcase_position_list", Value::Null)
        .unwrap();
    assert_eq!(positions.as_array().unwrap().len(), 1);

    let list = fx
        .call("alice", "ckanext_showcase_list", Value::Null)
        .unwrap();
    assert_eq!(Fixture::names(&list), vec!["kept"]);

    let err = fx
        .call("alice", "ckanext_showcase_show", json!({ "id": "doomed" }))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn deleted_showcase_cannot_be_given_a_position() {
    let fx = Fixture::new();
    fx.create_showcase("keep");
    fx.create_showcase("gone");
    fx.call("curator", "ckanext_showcase_delete", json!({ "id": "gone" }))
        .unwrap();

    let err = fx
        .call(
            "curator",
            "ckanext_showcase_position_update",
            json!({ "showcase_ids": ["gone"] }),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let positions = fx
        .call("alice", "ckanext_showcase_position_list", Value::Null)
        .unwrap();
    let ids: Vec<&str> = positions
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["showcase_id"].as_str().unwrap())
        .collect();
    let keep = fx
        .call("alice", "ckanext_showcase_show", json!({ "id": "keep" }))
        .unwrap();
    assert_eq!(ids, vec![keep["id"].as_str().unwrap()]);
}

#[test]
fn admin_management_is_sysadmin_only() {
    let fx = Fixture::new();

    let err = fx
        .call(
            "curator",
            "ckanext_showcase_admin_add",
            json!({ "username": "alice" }),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));

    let added = fx
        .call(
            "root",
            "ckanext_showcase_admin_add",
            json!({ "username": "alice" }),
        )
        .unwrap();
    assert_eq!(added, json!({ "user_id": "u-alice" }));

    let err = fx
        .call(
            "root",
            "ckanext_showcase_admin_add",
            json!({ "username": "u-alice" }),
        )
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));

    let admins = fx
        .call("root", "ckanext_showcase_admin_list", Value::Null)
        .unwrap();
    assert_eq!(
        admins,
        json!([
            { "name": "alice", "id": "u-alice" },
            { "name": "curator", "id": "u-curator" },
        ])
    );

    // alice can now curate
    assert!(
        fx.call("alice", "ckanext_showcase_create", json!({ "name": "by-alice" }))
            .is_ok()
    );

    fx.call(
        "root",
        "ckanext_showcase_admin_remove",
        json!({ "username": "alice" }),
    )
    .unwrap();
    let err = fx
        .call(
            "root",
            "ckanext_showcase_admin_remove",
            json!({ "username": "alice" }),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn site_context_bypasses_authorization() {
    let fx = Fixture::new();
    let created = fx
        .api
        .call(
            &Context::site(),
            "ckanext_showcase_create",
            json!({ "name": "from-cli", "state": "draft" }),
        )
        .unwrap();
    assert_eq!(created["state"], "draft");
    assert!(created["creator_user_id"].is_null());
}

#[test]
fn showcases_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portal.db");
    let portal = PortalConfig::default();

    {
        let store = ShowcaseStore::open(&path).unwrap();
        store.install_portal_schema().unwrap();
        let api = ShowcaseApi::new(Arc::new(store), portal.clone());
        for name in ["one", "two"] {
            api.call(&Context::site(), "ckanext_showcase_create", json!({ "name": name }))
                .unwrap();
        }
        api.call(
            &Context::site(),
            "ckanext_showcase_position_update",
            json!({ "showcase_ids": ["two"] }),
        )
        .unwrap();
    }

    let api = ShowcaseApi::new(Arc::new(ShowcaseStore::open(&path).unwrap()), portal);
    let list = api
        .call(&Context::anonymous(), "ckanext_showcase_list", Value::Null)
        .unwrap();
    assert_eq!(Fixture::names(&list), vec!["two", "one"]);
}
