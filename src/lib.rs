//! DIGIT Data Loader
//!
//! Reads master-data Excel templates, validates them against declarative
//! schemas and bulk-loads the records into a DIGIT deployment.

pub mod cli;
pub mod core;
pub mod hierarchy;
pub mod reader;
pub mod schema;
pub mod upload;
