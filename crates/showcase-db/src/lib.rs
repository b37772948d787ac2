pub mod catalog;
pub mod migrations;
pub mod store;

pub use catalog::{
    DATASET_TYPE, GroupRecord, PackageExtra, PackageRecord, PackageTag, SHOWCASE_TYPE,
    STATE_ACTIVE, STATE_DELETED, UserRecord, install_portal_schema,
};
pub use migrations::{SetupReport, TableState};
pub use store::{Association, ShowcasePosition, ShowcaseStore};
