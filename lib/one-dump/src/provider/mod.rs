pub mod command;
pub mod connection;
pub mod storage;
