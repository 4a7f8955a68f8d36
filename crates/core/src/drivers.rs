use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::api::ApiError;
use crate::forms::DbType;
use crate::log_store::{details, LogCategory, LogStore};
use crate::notifications::{Notifier, Severity};

/// Prefix that marks a registered driver in the database type field.
pub const CUSTOM_PREFIX: &str = "custom:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub url_template: String,
    #[serde(default)]
    pub default_port: u16,
}

impl DriverInfo {
    #[must_use]
    pub fn db_type(&self) -> DbType {
        DbType::Custom(format!("{CUSTOM_PREFIX}{}", self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverUpload {
    pub name: String,
    pub class_name: String,
    pub url_template: String,
    pub default_port: u16,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait DriverApi: Send + Sync {
    async fn list_drivers(&self) -> Result<Vec<DriverInfo>, ApiError>;
    async fn upload_driver(&self, upload: &DriverUpload) -> Result<DriverInfo, ApiError>;
}

#[derive(Debug, Error)]
pub enum DriverRegistryError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("default port must be a number between 1 and 65535, got `{0}`")]
    InvalidPort(String),
    #[error("failed to read driver file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error adding driver: {0}")]
    Backend(#[source] ApiError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverForm {
    pub name: String,
    pub class_name: String,
    pub url_template: String,
    pub default_port: String,
    pub file: Option<PathBuf>,
}

impl DriverForm {
    /// All fields are required; the driver archive is read from disk.
    pub async fn to_upload(&self) -> Result<DriverUpload, DriverRegistryError> {
        let name = self.name.trim();
        let class_name = self.class_name.trim();
        let url_template = self.url_template.trim();
        let raw_port = self.default_port.trim();
        let Some(path) = self.file.as_deref() else {
            return Err(DriverRegistryError::MissingFields);
        };
        if [name, class_name, url_template, raw_port]
            .iter()
            .any(|value| value.is_empty())
        {
            return Err(DriverRegistryError::MissingFields);
        }

        let default_port = match raw_port.parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => return Err(DriverRegistryError::InvalidPort(raw_port.to_string())),
        };

        Ok(DriverUpload {
            name: name.to_string(),
            class_name: class_name.to_string(),
            url_template: url_template.to_string(),
            default_port,
            file_name: file_name(path),
            bytes: tokio::fs::read(path)
                .await
                .map_err(|source| DriverRegistryError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })?,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "driver.jar".to_string(), |name| name.to_string_lossy().into_owned())
}

pub struct DriverRegistry<A: DriverApi> {
    api: Arc<A>,
    logs: Arc<LogStore>,
    notifier: Arc<dyn Notifier>,
    drivers: RwLock<Vec<DriverInfo>>,
}

impl<A: DriverApi> DriverRegistry<A> {
    #[must_use]
    pub fn new(api: Arc<A>, logs: Arc<LogStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            logs,
            notifier,
            drivers: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn drivers(&self) -> Vec<DriverInfo> {
        self.drivers.read().clone()
    }

    #[must_use]
    pub fn driver(&self, id: &str) -> Option<DriverInfo> {
        self.drivers.read().iter().find(|driver| driver.id == id).cloned()
    }

    /// Replaces the local list. Failures are logged only.
    pub async fn load(&self) -> Result<usize, DriverRegistryError> {
        match self.api.list_drivers().await {
            Ok(drivers) => {
                let count = drivers.len();
                *self.drivers.write() = drivers;
                self.logs.record(
                    LogCategory::Common,
                    format!("Loaded {count} custom database drivers"),
                    details([]),
                );
                Ok(count)
            }
            Err(error) => {
                self.logs.record(
                    LogCategory::Error,
                    "Error loading custom database drivers",
                    details([("error", json!(error.to_string()))]),
                );
                Err(DriverRegistryError::Backend(error))
            }
        }
    }

    pub async fn upload(&self, form: &DriverForm) -> Result<DriverInfo, DriverRegistryError> {
        let upload = match form.to_upload().await {
            Ok(upload) => upload,
            Err(error) => {
                self.notifier.notify(&error.to_string(), Severity::Warning);
                return Err(error);
            }
        };

        match self.api.upload_driver(&upload).await {
            Ok(driver) => {
                self.logs.record(
                    LogCategory::Audit,
                    "Registered custom driver",
                    details([
                        ("driverId", json!(driver.id)),
                        ("name", json!(driver.name)),
                        ("className", json!(driver.class_name)),
                        ("size", json!(upload.bytes.len())),
                    ]),
                );
                self.notifier.notify(
                    &format!("Database driver \"{}\" added successfully", driver.name),
                    Severity::Success,
                );
                {
                    let mut drivers = self.drivers.write();
                    drivers.retain(|existing| existing.id != driver.id);
                    drivers.push(driver.clone());
                }
                Ok(driver)
            }
            Err(error) => {
                let error = DriverRegistryError::Backend(error);
                self.logs.record(
                    LogCategory::Error,
                    "Driver upload failed",
                    details([("error", json!(error.to_string()))]),
                );
                self.notifier.notify(&error.to_string(), Severity::Danger);
                Err(error)
            }
        }
    }

    /// Builtin types first, then registered drivers, as `(type, label)`.
    #[must_use]
    pub fn db_type_choices(&self) -> Vec<(DbType, String)> {
        let mut choices: Vec<_> = DbType::builtin()
            .into_iter()
            .map(|db_type| {
                let label = db_type.label().to_string();
                (db_type, label)
            })
            .collect();
        choices.extend(
            self.drivers
                .read()
                .iter()
                .map(|driver| (driver.db_type(), driver.name.clone())),
        );
        choices
    }

    #[must_use]
    pub fn default_port_for(&self, db_type: &DbType) -> Option<u16> {
        match db_type {
            DbType::Custom(raw) => {
                let id = raw.strip_prefix(CUSTOM_PREFIX)?;
                self.driver(id)
                    .map(|driver| driver.default_port)
                    .filter(|port| *port > 0)
            }
            builtin => builtin.default_port(),
        }
    }
}
