//! Snapshot and restore of PostgreSQL databases as portable archives.
//!
//! A dump is declared once (see [`service::definition::DefinitionBuilder`]),
//! registered under a [`shared_types::DumpName`] in a
//! [`service::registry::DumpRegistry`] and then produced with
//! [`service::registry::DumpRegistry::create_dump`] or replayed onto the
//! configured database with [`service::registry::DumpRegistry::load_dump`].
//!
//! All external tools (`pg_dump`, `pg_restore`, `psql`) are spawned through a
//! [`provider::command::ProcessRunner`], either directly or through
//! `<runtime> exec` into a database container.

pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod service;
pub mod util;

pub use error::DumpError;
pub use service::registry::DumpRegistry;
