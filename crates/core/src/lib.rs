pub mod api;
pub mod bootstrap;
pub mod cloud_monitor;
pub mod cloud_wizard;
pub mod config;
pub mod connection_manager;
pub mod controls;
pub mod drivers;
pub mod forms;
pub mod log_store;
pub mod notifications;
pub mod profiles;
pub mod query_runner;
pub mod ring_buffer;
pub mod schema_explorer;
