pub mod authz;
pub mod validation;

pub use authz::{Actor, Permission};
pub use validation::InputValidator;
