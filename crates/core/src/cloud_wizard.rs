use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::api::ApiError;
use crate::forms::DbType;
use crate::log_store::{details, LogCategory, LogLevel, LogStore};
use crate::notifications::{Notifier, Severity};

pub const CERTIFICATE_EXTENSIONS: [&str; 4] = ["pem", "crt", "cer", "key"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

impl CloudProvider {
    pub const ALL: [Self; 3] = [Self::Aws, Self::Azure, Self::Gcp];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
        }
    }

    #[must_use]
    pub fn endpoint_placeholder(self) -> &'static str {
        match self {
            Self::Aws => "your-rds-instance.region.rds.amazonaws.com",
            Self::Azure => "your-server.database.windows.net",
            Self::Gcp => "your-project:region:instance",
        }
    }

    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::Aws | Self::Gcp => 5432,
            Self::Azure => 1433,
        }
    }

    #[must_use]
    pub fn default_auth_method(self) -> AuthMethod {
        match self {
            Self::Aws => AuthMethod::Iam,
            Self::Azure => AuthMethod::AzureAd,
            Self::Gcp => AuthMethod::ServiceAccount,
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CloudProvider {
    type Err = CloudWizardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.key().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| CloudWizardError::UnknownProvider(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    UsernamePassword,
    ServiceAccount,
    Iam,
    AzureAd,
}

impl AuthMethod {
    pub const ALL: [Self; 4] = [
        Self::UsernamePassword,
        Self::ServiceAccount,
        Self::Iam,
        Self::AzureAd,
    ];

    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::UsernamePassword => "username-password",
            Self::ServiceAccount => "service-account",
            Self::Iam => "iam",
            Self::AzureAd => "azure-ad",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::UsernamePassword => "Username / Password",
            Self::ServiceAccount => "Service Account",
            Self::Iam => "IAM",
            Self::AzureAd => "Azure AD",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = CloudWizardError;

    /// Accepts both slugs and display names ("username/password", "Azure AD").
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "usernamepassword" => Ok(Self::UsernamePassword),
            "serviceaccount" => Ok(Self::ServiceAccount),
            "iam" => Ok(Self::Iam),
            "azuread" => Ok(Self::AzureAd),
            _ => Err(CloudWizardError::UnknownAuthMethod(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudService {
    Rds,
    Aurora,
    SqlDatabase,
    CloudSql,
    DatabaseForPostgresql,
    DatabaseForMysql,
}

impl CloudService {
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Rds => "rds",
            Self::Aurora => "aurora",
            Self::SqlDatabase => "sql-database",
            Self::CloudSql => "cloud-sql",
            Self::DatabaseForPostgresql => "database-for-postgresql",
            Self::DatabaseForMysql => "database-for-mysql",
        }
    }

    #[must_use]
    pub fn db_type(self) -> DbType {
        match self {
            Self::Rds | Self::Aurora | Self::CloudSql | Self::DatabaseForPostgresql => {
                DbType::Postgresql
            }
            Self::SqlDatabase => DbType::Sqlserver,
            Self::DatabaseForMysql => DbType::Mysql,
        }
    }
}

impl FromStr for CloudService {
    type Err = CloudWizardError;

    /// Accepts slugs and display names ("SQL Database" is `sql-database`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let slug = value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_ascii_lowercase();
        match slug.as_str() {
            "rds" => Ok(Self::Rds),
            "aurora" => Ok(Self::Aurora),
            "sql-database" => Ok(Self::SqlDatabase),
            "cloud-sql" => Ok(Self::CloudSql),
            "database-for-postgresql" => Ok(Self::DatabaseForPostgresql),
            "database-for-mysql" => Ok(Self::DatabaseForMysql),
            _ => Err(CloudWizardError::UnknownService(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateType {
    Ca,
    Client,
    Key,
}

impl CertificateType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ca => "ca",
            Self::Client => "client",
            Self::Key => "key",
        }
    }
}

/// Provider catalog entry as the backend sends it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderWire {
    pub name: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub auth_methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub provider: CloudProvider,
    pub name: String,
    pub services: Vec<CloudService>,
    pub auth_methods: Vec<AuthMethod>,
}

impl ProviderInfo {
    /// Parses a catalog entry. An unknown provider key rejects the entry;
    /// unknown services and auth methods are dropped and returned alongside.
    pub fn from_wire(
        key: &str,
        wire: &ProviderWire,
    ) -> Result<(Self, Vec<CloudWizardError>), CloudWizardError> {
        let provider = key.parse::<CloudProvider>()?;
        let mut rejected = Vec::new();
        let services = wire
            .services
            .iter()
            .filter_map(|service| service.parse::<CloudService>().map_err(|e| rejected.push(e)).ok())
            .collect();
        let auth_methods = wire
            .auth_methods
            .iter()
            .filter_map(|method| method.parse::<AuthMethod>().map_err(|e| rejected.push(e)).ok())
            .collect();

        Ok((
            Self {
                provider,
                name: wire.name.clone(),
                services,
                auth_methods,
            },
            rejected,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConnectionRequest {
    pub name: String,
    pub cloud_provider: String,
    pub service: String,
    pub endpoint: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub db_type: String,
    #[serde(rename = "useSSL")]
    pub use_ssl: bool,
    pub ssl_mode: SslMode,
    pub ssl_cert_path: String,
    pub auth_method: String,
    #[serde(rename = "useIAM")]
    pub use_iam: bool,
    #[serde(rename = "useAzureAD")]
    pub use_azure_ad: bool,
    pub use_service_account: bool,
    pub service_account_path: String,
    pub connection_timeout: u32,
    pub auto_reconnect: bool,
    #[serde(rename = "useCloudSQLProxy")]
    pub use_cloud_sql_proxy: bool,
    #[serde(rename = "cloudSQLInstance")]
    pub cloud_sql_instance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConnectResponse {
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateUpload {
    pub connection_id: String,
    pub certificate_type: CertificateType,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    #[serde(default, rename = "type")]
    pub certificate_type: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub valid_to: Option<String>,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub validation_error: Option<String>,
}

#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn providers(&self) -> Result<BTreeMap<String, ProviderWire>, ApiError>;
    async fn test_cloud_connection(
        &self,
        request: &CloudConnectionRequest,
    ) -> Result<CloudConnectResponse, ApiError>;
    async fn connect_cloud(
        &self,
        request: &CloudConnectionRequest,
    ) -> Result<CloudConnectResponse, ApiError>;
    async fn disconnect_cloud(&self, connection_id: &str) -> Result<(), ApiError>;
    async fn upload_certificate(
        &self,
        upload: &CertificateUpload,
    ) -> Result<CertificateInfo, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslSettings {
    pub enabled: bool,
    pub mode: SslMode,
    pub certificate: Option<(CertificateType, PathBuf)>,
}

impl Default for SslSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: SslMode::Require,
            certificate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConnectionForm {
    pub name: String,
    pub provider: Option<CloudProvider>,
    pub service: Option<CloudService>,
    pub endpoint: String,
    pub port: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub auth_method: Option<AuthMethod>,
    pub service_account_path: String,
    pub ssl: SslSettings,
    pub connection_timeout_secs: u32,
    pub auto_reconnect: bool,
    pub use_cloud_sql_proxy: bool,
    pub cloud_sql_instance: String,
}

impl Default for CloudConnectionForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider: None,
            service: None,
            endpoint: String::new(),
            port: String::new(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
            auth_method: None,
            service_account_path: String::new(),
            ssl: SslSettings::default(),
            connection_timeout_secs: 30,
            auto_reconnect: true,
            use_cloud_sql_proxy: false,
            cloud_sql_instance: String::new(),
        }
    }
}

impl CloudConnectionForm {
    /// Checks required fields and builds the wire request.
    pub fn validate(&self) -> Result<CloudConnectionRequest, CloudWizardError> {
        let Some(provider) = self.provider else {
            return Err(CloudWizardError::MissingField("cloud provider"));
        };
        if self.endpoint.trim().is_empty() {
            return Err(CloudWizardError::MissingField("endpoint"));
        }
        if self.database.trim().is_empty() {
            return Err(CloudWizardError::MissingField("database"));
        }
        if self.auth_method == Some(AuthMethod::UsernamePassword)
            && (self.username.trim().is_empty() || self.password.is_empty())
        {
            return Err(CloudWizardError::MissingCredentials);
        }

        let port = match self.port.trim() {
            "" => provider.default_port(),
            raw => raw
                .parse::<u16>()
                .map_err(|_| CloudWizardError::InvalidPort(raw.to_string()))?,
        };
        let auth_method = self.auth_method;

        Ok(CloudConnectionRequest {
            name: self.name.trim().to_string(),
            cloud_provider: provider.key().to_string(),
            service: self.service.map(CloudService::slug).unwrap_or_default().to_string(),
            endpoint: self.endpoint.trim().to_string(),
            port,
            database: self.database.trim().to_string(),
            username: self.username.trim().to_string(),
            password: self.password.clone(),
            db_type: self
                .service
                .map_or(DbType::Postgresql, CloudService::db_type)
                .to_string(),
            use_ssl: self.ssl.enabled,
            ssl_mode: self.ssl.mode,
            ssl_cert_path: self
                .ssl
                .certificate
                .as_ref()
                .filter(|_| self.ssl.enabled)
                .map(|(_, path)| path.display().to_string())
                .unwrap_or_default(),
            auth_method: auth_method.map(AuthMethod::slug).unwrap_or_default().to_string(),
            use_iam: auth_method == Some(AuthMethod::Iam),
            use_azure_ad: auth_method == Some(AuthMethod::AzureAd),
            use_service_account: auth_method == Some(AuthMethod::ServiceAccount),
            service_account_path: self.service_account_path.trim().to_string(),
            connection_timeout: self.connection_timeout_secs,
            auto_reconnect: self.auto_reconnect,
            use_cloud_sql_proxy: self.use_cloud_sql_proxy,
            cloud_sql_instance: self.cloud_sql_instance.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CloudStatus {
    #[default]
    Disconnected,
    Connected {
        provider: String,
        endpoint: String,
        connection_id: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum CloudWizardError {
    #[error("unknown cloud provider `{0}`")]
    UnknownProvider(String),
    #[error("unknown cloud service `{0}`")]
    UnknownService(String),
    #[error("unknown authentication method `{0}`")]
    UnknownAuthMethod(String),
    #[error("{0} is not offered by the selected provider")]
    NotOffered(String),
    #[error("Please fill in the {0}")]
    MissingField(&'static str),
    #[error("Please provide username and password")]
    MissingCredentials,
    #[error("invalid port `{0}`")]
    InvalidPort(String),
    #[error("Enable SSL/TLS before choosing a certificate")]
    SslDisabled,
    #[error("unsupported certificate file `{0}` (expected .pem, .crt, .cer or .key)")]
    UnsupportedCertificate(PathBuf),
    #[error("failed to read certificate at {path}: {source}")]
    CertificateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not connected to a cloud database")]
    NotConnected,
    #[error("already connected to {0}; disconnect first")]
    AlreadyConnected(String),
    #[error("cloud backend failed: {0}")]
    Backend(#[source] ApiError),
}

impl CloudWizardError {
    /// Whether the error came from local checks rather than the backend.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_)
                | Self::MissingCredentials
                | Self::InvalidPort(_)
                | Self::SslDisabled
                | Self::UnsupportedCertificate(_)
                | Self::NotOffered(_)
                | Self::NotConnected
                | Self::AlreadyConnected(_)
        )
    }
}

/// Which authentication sub-form is showing. At most one is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPanels {
    selected: Option<AuthMethod>,
}

impl AuthPanels {
    #[must_use]
    pub fn is_visible(self, method: AuthMethod) -> bool {
        self.selected == Some(method)
    }

    #[must_use]
    pub fn visible(self) -> Option<AuthMethod> {
        self.selected
    }
}

#[derive(Debug, Default)]
struct WizardState {
    providers: Vec<ProviderInfo>,
    form: CloudConnectionForm,
    status: CloudStatus,
    last_certificate: Option<CertificateInfo>,
}

pub struct CloudWizard<A: CloudApi> {
    api: Arc<A>,
    logs: Arc<LogStore>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<WizardState>,
}

impl<A: CloudApi> CloudWizard<A> {
    #[must_use]
    pub fn new(api: Arc<A>, logs: Arc<LogStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            logs,
            notifier,
            state: Mutex::new(WizardState::default()),
        }
    }

    #[must_use]
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.state.lock().providers.clone()
    }

    #[must_use]
    pub fn form(&self) -> CloudConnectionForm {
        self.state.lock().form.clone()
    }

    #[must_use]
    pub fn status(&self) -> CloudStatus {
        self.state.lock().status.clone()
    }

    #[must_use]
    pub fn auth_panels(&self) -> AuthPanels {
        AuthPanels {
            selected: self.state.lock().form.auth_method,
        }
    }

    #[must_use]
    pub fn endpoint_placeholder(&self) -> Option<&'static str> {
        self.state
            .lock()
            .form
            .provider
            .map(CloudProvider::endpoint_placeholder)
    }

    #[must_use]
    pub fn last_certificate(&self) -> Option<CertificateInfo> {
        self.state.lock().last_certificate.clone()
    }

    /// Loads the provider catalog; entries that do not parse are skipped.
    pub async fn load_providers(&self) -> Result<usize, CloudWizardError> {
        let catalog = match self.api.providers().await {
            Ok(catalog) => catalog,
            Err(error) => {
                self.logs.record(
                    LogCategory::Error,
                    "Failed to load cloud providers",
                    details([("error", json!(error.to_string()))]),
                );
                self.notifier
                    .notify("Failed to load cloud providers", Severity::Warning);
                return Err(CloudWizardError::Backend(error));
            }
        };

        let mut providers = Vec::new();
        for (key, wire) in &catalog {
            match ProviderInfo::from_wire(key, wire) {
                Ok((info, rejected)) => {
                    for error in rejected {
                        self.skip_catalog_value(key, &error);
                    }
                    providers.push(info);
                }
                Err(error) => self.skip_catalog_value(key, &error),
            }
        }
        providers.sort_by_key(|info| info.provider);

        let count = providers.len();
        self.state.lock().providers = providers;
        self.logs.record(
            LogCategory::Common,
            "Loaded cloud providers",
            details([("count", json!(count))]),
        );
        Ok(count)
    }

    /// Switches provider and applies its defaults. Service and auth choices
    /// are reset.
    pub fn select_provider(&self, provider: Option<CloudProvider>) {
        let mut state = self.state.lock();
        let offered_auth = provider.and_then(|provider| {
            state
                .providers
                .iter()
                .find(|info| info.provider == provider)
                .map(|info| info.auth_methods.clone())
        });
        let form = &mut state.form;
        form.provider = provider;
        form.service = None;
        form.auth_method = None;

        if let Some(provider) = provider {
            form.port = provider.default_port().to_string();
            let default_method = provider.default_auth_method();
            let offered = offered_auth.map_or(true, |methods| {
                methods.is_empty() || methods.contains(&default_method)
            });
            if offered {
                form.auth_method = Some(default_method);
            }
        }
    }

    pub fn select_service(&self, service: Option<CloudService>) -> Result<(), CloudWizardError> {
        let mut state = self.state.lock();
        if let (Some(service), Some(provider)) = (service, state.form.provider) {
            let offered = state
                .providers
                .iter()
                .find(|info| info.provider == provider)
                .map_or(true, |info| info.services.contains(&service));
            if !offered {
                return Err(CloudWizardError::NotOffered(service.slug().to_string()));
            }
        }
        state.form.service = service;
        Ok(())
    }

    pub fn select_auth_method(&self, method: Option<AuthMethod>) {
        self.state.lock().form.auth_method = method;
    }

    pub fn toggle_ssl(&self, enabled: bool) {
        self.state.lock().form.ssl.enabled = enabled;
    }

    pub fn set_ssl_mode(&self, mode: SslMode) {
        self.state.lock().form.ssl.mode = mode;
    }

    /// Chooses a certificate for upload after the next connect.
    pub fn set_certificate(
        &self,
        certificate_type: CertificateType,
        path: impl Into<PathBuf>,
    ) -> Result<(), CloudWizardError> {
        let path = path.into();
        let mut state = self.state.lock();
        if !state.form.ssl.enabled {
            return Err(CloudWizardError::SslDisabled);
        }
        if !has_certificate_extension(&path) {
            return Err(CloudWizardError::UnsupportedCertificate(path));
        }
        state.form.ssl.certificate = Some((certificate_type, path));
        Ok(())
    }

    /// Applies free-form edits to the text fields.
    pub fn edit_form(&self, edit: impl FnOnce(&mut CloudConnectionForm)) {
        edit(&mut self.state.lock().form);
    }

    pub fn validate(&self) -> Result<CloudConnectionRequest, CloudWizardError> {
        let outcome = self.state.lock().form.validate();
        if let Err(error) = &outcome {
            self.notifier.notify(&error.to_string(), Severity::Warning);
        }
        outcome
    }

    pub async fn test_connection(&self) -> Result<CloudConnectResponse, CloudWizardError> {
        let request = self.validate()?;
        self.logs.record(
            LogCategory::Connection,
            "Testing cloud connection",
            details([
                ("provider", json!(request.cloud_provider)),
                ("endpoint", json!(request.endpoint)),
            ]),
        );

        match self.api.test_cloud_connection(&request).await {
            Ok(response) => {
                let message = response
                    .message
                    .clone()
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| {
                        format!("Connection test successful for {}", request.cloud_provider)
                    });
                self.notifier.notify(&message, Severity::Success);
                Ok(response)
            }
            Err(error) => Err(self.report_backend("Cloud connection test failed", error)),
        }
    }

    pub async fn connect(&self) -> Result<CloudConnectResponse, CloudWizardError> {
        if let CloudStatus::Connected { endpoint, .. } = self.status() {
            let error = CloudWizardError::AlreadyConnected(endpoint);
            self.logs.record(
                LogCategory::Connection,
                "Cloud connection attempt rejected",
                details([("error", json!(error.to_string()))]),
            );
            self.notifier.notify(&error.to_string(), Severity::Warning);
            return Err(error);
        }
        let request = self.validate()?;
        let certificate = {
            let state = self.state.lock();
            state
                .form
                .ssl
                .certificate
                .clone()
                .filter(|_| state.form.ssl.enabled)
        };

        self.logs.record(
            LogCategory::Connection,
            "Connecting to cloud database",
            details([
                ("provider", json!(request.cloud_provider)),
                ("service", json!(request.service)),
                ("endpoint", json!(request.endpoint)),
                ("authMethod", json!(request.auth_method)),
            ]),
        );

        let response = match self.api.connect_cloud(&request).await {
            Ok(response) => response,
            Err(error) => return Err(self.report_backend("Cloud connection failed", error)),
        };

        self.state.lock().status = CloudStatus::Connected {
            provider: response
                .provider
                .clone()
                .unwrap_or_else(|| request.cloud_provider.clone()),
            endpoint: response
                .endpoint
                .clone()
                .unwrap_or_else(|| request.endpoint.clone()),
            connection_id: response.connection_id.clone(),
        };
        self.logs.record(
            LogCategory::Monitoring,
            "Cloud connection established",
            details([
                ("provider", json!(request.cloud_provider)),
                ("connectionId", json!(response.connection_id)),
            ]),
        );
        self.notifier.notify(
            &format!("Successfully connected to {}", request.cloud_provider),
            Severity::Success,
        );

        if let (Some((certificate_type, path)), Some(connection_id)) =
            (certificate, response.connection_id.as_deref())
        {
            // upload problems are reported but keep the session
            let _ = self
                .upload_certificate(connection_id, certificate_type, &path)
                .await;
        }

        Ok(response)
    }

    pub async fn disconnect(&self) -> Result<(), CloudWizardError> {
        let connection_id = match self.status() {
            CloudStatus::Connected {
                connection_id: Some(connection_id),
                ..
            } => connection_id,
            CloudStatus::Connected {
                connection_id: None,
                ..
            } => {
                self.state.lock().status = CloudStatus::Disconnected;
                return Ok(());
            }
            CloudStatus::Disconnected => {
                let error = CloudWizardError::NotConnected;
                self.notifier.notify(&error.to_string(), Severity::Warning);
                return Err(error);
            }
        };

        match self.api.disconnect_cloud(&connection_id).await {
            Ok(()) => {
                self.state.lock().status = CloudStatus::Disconnected;
                self.logs.record(
                    LogCategory::Monitoring,
                    "Cloud connection closed",
                    details([("connectionId", json!(connection_id))]),
                );
                self.notifier
                    .notify("Disconnected from cloud database", Severity::Success);
                Ok(())
            }
            Err(error) => Err(self.report_backend("Disconnection error", error)),
        }
    }

    async fn upload_certificate(
        &self,
        connection_id: &str,
        certificate_type: CertificateType,
        path: &Path,
    ) -> Result<CertificateInfo, CloudWizardError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(source) => {
                let error = CloudWizardError::CertificateRead {
                    path: path.to_path_buf(),
                    source,
                };
                self.notifier.notify(&error.to_string(), Severity::Danger);
                return Err(error);
            }
        };
        let upload = CertificateUpload {
            connection_id: connection_id.to_string(),
            certificate_type,
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "certificate.pem".to_string()),
            bytes,
        };

        match self.api.upload_certificate(&upload).await {
            Ok(info) => {
                self.logs.record(
                    LogCategory::Audit,
                    "Uploaded SSL certificate",
                    details([
                        ("connectionId", json!(connection_id)),
                        ("type", json!(certificate_type.as_str())),
                        ("valid", json!(info.valid)),
                    ]),
                );
                let (message, severity) = if info.valid {
                    ("Certificate uploaded successfully".to_string(), Severity::Success)
                } else {
                    (
                        format!(
                            "Certificate uploaded but invalid: {}",
                            info.validation_error.as_deref().unwrap_or("unknown reason")
                        ),
                        Severity::Warning,
                    )
                };
                self.notifier.notify(&message, severity);
                self.state.lock().last_certificate = Some(info.clone());
                Ok(info)
            }
            Err(error) => Err(self.report_backend("Certificate upload failed", error)),
        }
    }

    fn skip_catalog_value(&self, provider: &str, error: &CloudWizardError) {
        self.logs.record_at(
            LogCategory::Monitoring,
            LogLevel::Warn,
            "Skipped cloud catalog value",
            details([("provider", json!(provider)), ("error", json!(error.to_string()))]),
        );
    }

    fn report_backend(&self, context: &str, error: ApiError) -> CloudWizardError {
        self.logs.record(
            LogCategory::Error,
            context,
            details([("error", json!(error.to_string()))]),
        );
        self.notifier
            .notify(&format!("{context}: {error}"), Severity::Danger);
        CloudWizardError::Backend(error)
    }
}

fn has_certificate_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            CERTIFICATE_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(extension))
        })
}
