pub mod database_helper;
pub mod definition;
pub mod dumper;
pub mod loader;
pub mod registry;
