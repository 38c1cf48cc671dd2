pub mod config;
pub mod models;
pub mod server;
pub mod telemetry;
