use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::ConnectorApi;
use crate::cloud_monitor::CloudMonitor;
use crate::cloud_wizard::{AuthMethod, CertificateType, CloudProvider, CloudService, CloudWizard};
use crate::config::AppConfig;
use crate::connection_manager::{ConnectionManager, ConnectionObserver};
use crate::controls::{ControlId, Controls};
use crate::drivers::{DriverForm, DriverRegistry};
use crate::forms::{ConnectionForm, DbType, FormFields, FIELD_DB_TYPE, FIELD_PORT};
use crate::log_store::{details, LogCategory, LogForwarder, LogStore, LogStoreMode};
use crate::notifications::{Notifier, Severity, ToastCenter, ToastId};
use crate::query_runner::{QueryRunner, ResultExporter};
use crate::schema_explorer::{NodePath, SchemaExplorer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveView {
    #[default]
    Connection,
    Tables,
    Query,
    Cloud,
    Monitor,
    Logs,
}

impl ActiveView {
    pub const ALL: [Self; 6] = [
        Self::Connection,
        Self::Tables,
        Self::Query,
        Self::Cloud,
        Self::Monitor,
        Self::Logs,
    ];

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Connection => "Connection",
            Self::Tables => "Tables",
            Self::Query => "Query",
            Self::Cloud => "Cloud",
            Self::Monitor => "Monitor",
            Self::Logs => "Logs",
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|view| *view == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

/// Follows the session: tables after connect, connection form after disconnect.
#[derive(Debug, Default)]
pub struct ViewSwitcher {
    active: Mutex<ActiveView>,
}

impl ViewSwitcher {
    #[must_use]
    pub fn active(&self) -> ActiveView {
        *self.active.lock()
    }

    pub fn switch_to(&self, view: ActiveView) {
        *self.active.lock() = view;
    }
}

#[async_trait]
impl ConnectionObserver for ViewSwitcher {
    async fn on_connected(&self, _connection_id: Option<&str>) {
        self.switch_to(ActiveView::Tables);
    }

    async fn on_disconnected(&self) {
        self.switch_to(ActiveView::Connection);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudField {
    Name,
    Endpoint,
    Port,
    Database,
    Username,
    Password,
    ServiceAccountPath,
    CloudSqlInstance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Connect,
    Disconnect,
    SaveConnection,
    RefreshSavedConnections,
    SavedConnectionSelected(String),
    DeleteSavedConnection(String),
    DbTypeChanged(String),
    FieldEdited { field: String, value: String },
    QueryEdited(String),
    ExecuteQuery,
    PreviousPage,
    NextPage,
    ExportResults(String),
    ToggleSchemaNode(NodePath),
    CloudProviderSelected(Option<CloudProvider>),
    CloudServiceSelected(Option<CloudService>),
    CloudAuthSelected(Option<AuthMethod>),
    CloudSslToggled(bool),
    CloudCertificateChosen {
        certificate_type: CertificateType,
        path: PathBuf,
    },
    CloudFieldEdited { field: CloudField, value: String },
    TestCloudConnection,
    ConnectCloud,
    DisconnectCloud,
    UploadDriver(DriverForm),
    RefreshMonitoring,
    ClearLogs(Option<LogCategory>),
    ExportLogs(Option<LogCategory>),
    DismissToast(Option<ToastId>),
    SwitchView(ActiveView),
}

impl UiEvent {
    /// The control whose busy flag gates this event, if any.
    #[must_use]
    pub fn control(&self) -> Option<ControlId> {
        match self {
            Self::Connect => Some(ControlId::Connect),
            Self::Disconnect => Some(ControlId::Disconnect),
            Self::SaveConnection => Some(ControlId::SaveConnection),
            Self::ExecuteQuery => Some(ControlId::ExecuteQuery),
            Self::PreviousPage => Some(ControlId::PreviousPage),
            Self::NextPage => Some(ControlId::NextPage),
            Self::ExportResults(_) | Self::ExportLogs(_) => Some(ControlId::Export),
            Self::TestCloudConnection => Some(ControlId::TestCloud),
            Self::ConnectCloud => Some(ControlId::ConnectCloud),
            Self::UploadDriver(_) => Some(ControlId::UploadDriver),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    ControlBusy(ControlId),
    Failed(String),
}

impl<E: std::error::Error> From<Result<(), E>> for DispatchOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(error) => Self::Failed(error.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("application context already started")]
    AlreadyStarted,
}

/// Every component, built once and shared by the UI.
pub struct ApplicationContext<A: ConnectorApi + 'static> {
    pub config: AppConfig,
    pub api: Arc<A>,
    pub logs: Arc<LogStore>,
    pub toasts: Arc<ToastCenter>,
    pub connections: Arc<ConnectionManager<A>>,
    pub queries: Arc<QueryRunner<A>>,
    pub schema: Arc<SchemaExplorer<A>>,
    pub cloud: Arc<CloudWizard<A>>,
    pub drivers: Arc<DriverRegistry<A>>,
    pub monitor: Arc<CloudMonitor<A>>,
    pub views: Arc<ViewSwitcher>,
    pub controls: Controls,
    exporter: Option<Arc<dyn ResultExporter>>,
    connection_fields: Mutex<FormFields>,
    query_text: Mutex<String>,
    started: AtomicBool,
}

impl<A: ConnectorApi + 'static> ApplicationContext<A> {
    #[must_use]
    pub fn initialize(
        config: AppConfig,
        api: Arc<A>,
        forwarder: Option<Arc<dyn LogForwarder>>,
        exporter: Option<Arc<dyn ResultExporter>>,
    ) -> Arc<Self> {
        let logs = Arc::new(LogStore::from_settings(&config.logging, forwarder));
        let ready = |component: &str| {
            logs.record(
                LogCategory::Common,
                format!("{component} initialized"),
                details([]),
            );
        };
        ready("Log store");

        let toasts = Arc::new(ToastCenter::new(config.ui.toast_duration()));
        ready("Toast center");
        let notifier: Arc<dyn Notifier> = toasts.clone();

        let connections = Arc::new(ConnectionManager::new(
            api.clone(),
            logs.clone(),
            notifier.clone(),
        ));
        ready("Connection manager");
        let session = connections.session();

        let mut queries = QueryRunner::new(
            api.clone(),
            session.clone(),
            logs.clone(),
            notifier.clone(),
            config.ui.page_size,
        );
        if let Some(exporter) = &exporter {
            queries = queries.with_exporter(exporter.clone());
        }
        let queries = Arc::new(queries);
        ready("Query runner");

        let schema = Arc::new(SchemaExplorer::new(
            api.clone(),
            session,
            logs.clone(),
            notifier.clone(),
        ));
        ready("Schema explorer");

        let cloud = Arc::new(CloudWizard::new(api.clone(), logs.clone(), notifier.clone()));
        ready("Cloud wizard");
        let drivers = Arc::new(DriverRegistry::new(api.clone(), logs.clone(), notifier.clone()));
        ready("Driver registry");
        let monitor = Arc::new(CloudMonitor::new(api.clone(), logs.clone(), notifier));
        ready("Cloud monitor");

        let views = Arc::new(ViewSwitcher::default());
        connections.subscribe(schema.clone());
        connections.subscribe(queries.clone());
        connections.subscribe(views.clone());
        logs.record(
            LogCategory::Common,
            "Connection observers registered",
            details([("observers", json!(3))]),
        );
        info!(base_url = %config.api.base_url, "application context initialized");

        Arc::new(Self {
            config,
            api,
            logs,
            toasts,
            connections,
            queries,
            schema,
            cloud,
            drivers,
            monitor,
            views,
            controls: Controls::new(),
            exporter,
            connection_fields: Mutex::new(FormFields::new()),
            query_text: Mutex::new(String::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Runs the initial loads once. Individual load failures are already
    /// reported by their component and do not abort startup.
    pub async fn start(&self) -> Result<(), BootstrapError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BootstrapError::AlreadyStarted);
        }

        if self.logs.mode() == LogStoreMode::Forwarding {
            let max_files = self.config.logging.retention_files;
            if let Err(error) = self.api.cleanup_logs(max_files).await {
                debug!(%error, "log retention request failed");
            }
        }
        let _ = self.connections.refresh_saved_connections().await;
        let _ = self.cloud.load_providers().await;
        let _ = self.drivers.load().await;

        self.logs
            .record(LogCategory::Common, "Application started", details([]));
        Ok(())
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn connection_fields(&self) -> FormFields {
        self.connection_fields.lock().clone()
    }

    #[must_use]
    pub fn query_text(&self) -> String {
        self.query_text.lock().clone()
    }

    /// Single entry point for UI events. Events for a busy control are
    /// dropped without side effects.
    pub async fn dispatch(&self, event: UiEvent) -> DispatchOutcome {
        let _guard = match event.control() {
            Some(control) => match self.controls.try_acquire(control) {
                Some(guard) => Some(guard),
                None => {
                    debug!(?control, "ignoring event for busy control");
                    return DispatchOutcome::ControlBusy(control);
                }
            },
            None => None,
        };

        match event {
            UiEvent::Connect => {
                let form = ConnectionForm::from_fields(&self.connection_fields.lock());
                self.connections.start_connection(&form).await.map(|_| ()).into()
            }
            UiEvent::Disconnect => self.connections.stop_connection().await.into(),
            UiEvent::SaveConnection => {
                let form = ConnectionForm::from_fields(&self.connection_fields.lock());
                self.connections.save_connection(&form).await.into()
            }
            UiEvent::RefreshSavedConnections => self
                .connections
                .refresh_saved_connections()
                .await
                .map(|_| ())
                .into(),
            UiEvent::SavedConnectionSelected(id) => {
                match self.connections.load_saved_connection(&id).await {
                    Ok(form) => {
                        form.apply_to(&mut self.connection_fields.lock());
                        DispatchOutcome::Completed
                    }
                    Err(error) => DispatchOutcome::Failed(error.to_string()),
                }
            }
            UiEvent::DeleteSavedConnection(id) => {
                self.connections.delete_saved_connection(&id).await.into()
            }
            UiEvent::DbTypeChanged(raw) => {
                self.change_db_type(&raw);
                DispatchOutcome::Completed
            }
            UiEvent::FieldEdited { field, value } => {
                self.connection_fields.lock().set(&field, value);
                DispatchOutcome::Completed
            }
            UiEvent::QueryEdited(text) => {
                *self.query_text.lock() = text;
                DispatchOutcome::Completed
            }
            UiEvent::ExecuteQuery => {
                let sql = self.query_text();
                self.queries.run(&sql).await.map(|_| ()).into()
            }
            UiEvent::PreviousPage => self.queries.navigate_page(-1).await.map(|_| ()).into(),
            UiEvent::NextPage => self.queries.navigate_page(1).await.map(|_| ()).into(),
            UiEvent::ExportResults(format) => self.queries.export(&format).map(|_| ()).into(),
            UiEvent::ToggleSchemaNode(path) => self.schema.toggle(&path).await.map(|_| ()).into(),
            UiEvent::CloudProviderSelected(provider) => {
                self.cloud.select_provider(provider);
                DispatchOutcome::Completed
            }
            UiEvent::CloudServiceSelected(service) => self.cloud.select_service(service).into(),
            UiEvent::CloudAuthSelected(method) => {
                self.cloud.select_auth_method(method);
                DispatchOutcome::Completed
            }
            UiEvent::CloudSslToggled(enabled) => {
                self.cloud.toggle_ssl(enabled);
                DispatchOutcome::Completed
            }
            UiEvent::CloudCertificateChosen {
                certificate_type,
                path,
            } => self.cloud.set_certificate(certificate_type, path).into(),
            UiEvent::CloudFieldEdited { field, value } => {
                self.cloud.edit_form(|form| {
                    let target = match field {
                        CloudField::Name => &mut form.name,
                        CloudField::Endpoint => &mut form.endpoint,
                        CloudField::Port => &mut form.port,
                        CloudField::Database => &mut form.database,
                        CloudField::Username => &mut form.username,
                        CloudField::Password => &mut form.password,
                        CloudField::ServiceAccountPath => &mut form.service_account_path,
                        CloudField::CloudSqlInstance => &mut form.cloud_sql_instance,
                    };
                    *target = value;
                });
                DispatchOutcome::Completed
            }
            UiEvent::TestCloudConnection => self.cloud.test_connection().await.map(|_| ()).into(),
            UiEvent::ConnectCloud => self.cloud.connect().await.map(|_| ()).into(),
            UiEvent::DisconnectCloud => self.cloud.disconnect().await.into(),
            UiEvent::UploadDriver(form) => self.drivers.upload(&form).await.map(|_| ()).into(),
            UiEvent::RefreshMonitoring => self.monitor.refresh().await.map(|_| ()).into(),
            UiEvent::ClearLogs(category) => {
                self.logs.clear(category);
                let scope = category.map_or("all", LogCategory::as_str);
                self.toasts.notify(&format!("Cleared {scope} logs"), Severity::Info);
                DispatchOutcome::Completed
            }
            UiEvent::ExportLogs(category) => self.export_logs(category),
            UiEvent::DismissToast(id) => {
                match id {
                    Some(id) => {
                        self.toasts.dismiss(id);
                    }
                    None => {
                        self.toasts.dismiss_latest();
                    }
                }
                DispatchOutcome::Completed
            }
            UiEvent::SwitchView(view) => {
                self.views.switch_to(view);
                DispatchOutcome::Completed
            }
        }
    }

    /// Rewrites the port to the type's default. Unknown custom drivers
    /// clear it.
    fn change_db_type(&self, raw: &str) {
        let port = DbType::parse(raw)
            .and_then(|db_type| self.drivers.default_port_for(&db_type))
            .map(|port| port.to_string())
            .unwrap_or_default();
        let mut fields = self.connection_fields.lock();
        fields.set(FIELD_DB_TYPE, raw.trim());
        fields.set(FIELD_PORT, port);
    }

    fn export_logs(&self, category: Option<LogCategory>) -> DispatchOutcome {
        let Some(exporter) = &self.exporter else {
            self.toasts.notify("Export is not available", Severity::Danger);
            return DispatchOutcome::Failed("export is not available".to_string());
        };
        let bytes = match self.logs.export(category) {
            Ok(bytes) => bytes,
            Err(error) => return DispatchOutcome::Failed(error.to_string()),
        };

        match exporter.save_blob(&LogStore::export_file_name(Utc::now()), &bytes) {
            Ok(path) => {
                self.toasts.notify(
                    &format!("Logs exported to {}", path.display()),
                    Severity::Success,
                );
                DispatchOutcome::Completed
            }
            Err(error) => {
                self.toasts
                    .notify(&format!("Export failed: {error}"), Severity::Danger);
                DispatchOutcome::Failed(error.to_string())
            }
        }
    }
}
