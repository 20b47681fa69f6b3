pub mod archive;
pub mod sql;
