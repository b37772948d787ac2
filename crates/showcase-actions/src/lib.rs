pub mod actions;
pub mod api;
pub mod schema;

pub use actions::{Action, ActionRegistry};
pub use api::{Context, ShowcaseApi};
