//! CLI command implementations

pub mod boundary;
pub mod completions;
pub mod load;
pub mod rollback;
pub mod schema;
pub mod validate;
