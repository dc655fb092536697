// Library root: league data model, configuration, storage and snapshot
// import shared by the metrics engine and the CLI.

pub mod config;
pub mod db;
pub mod import;
pub mod model;
pub mod store;
