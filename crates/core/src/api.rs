use std::time::Duration;

use thiserror::Error;

use crate::cloud_monitor::MonitoringApi;
use crate::cloud_wizard::CloudApi;
use crate::connection_manager::ConnectionApi;
use crate::drivers::DriverApi;
use crate::log_store::LogApi;
use crate::query_runner::QueryApi;
use crate::schema_explorer::SchemaApi;

/// Failure of a backend call. Non-2xx responses are `Status`; 2xx
/// responses whose envelope reports failure are `Application`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{0}")]
    Transport(String),
    #[error("HTTP error! Status: {status}{}", .message.as_deref().map(|message| format!(" ({message})")).unwrap_or_default())]
    Status { status: u16, message: Option<String> },
    #[error("{0}")]
    Application(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            message: None,
        }
    }

    #[must_use]
    pub fn application(message: Option<String>, fallback: &str) -> Self {
        Self::Application(
            message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string()),
        )
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Every backend surface the console talks to.
pub trait ConnectorApi:
    ConnectionApi + QueryApi + SchemaApi + CloudApi + MonitoringApi + DriverApi + LogApi
{
}

impl<T> ConnectorApi for T where
    T: ConnectionApi + QueryApi + SchemaApi + CloudApi + MonitoringApi + DriverApi + LogApi
{
}
