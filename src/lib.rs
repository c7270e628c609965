pub mod auth;
pub mod client;
pub mod config;
pub mod derive;
pub mod error;
pub mod loader;
pub mod logging;
pub mod records;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod stations;
