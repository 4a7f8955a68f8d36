use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::api::ApiError;
use crate::forms::{ConnectionForm, DbType, FormError};
use crate::log_store::{details, LogCategory, LogStore};
use crate::notifications::{Notifier, Severity};
use crate::profiles::{ConnectionProfile, SavedConnections};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub db_type: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveConnectionRequest {
    pub name: String,
    pub folder: String,
    pub db_type: String,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub username: String,
    pub password: String,
}

#[async_trait]
pub trait ConnectionApi: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectResponse, ApiError>;
    async fn disconnect(&self, connection_id: Option<&str>) -> Result<Option<String>, ApiError>;
    async fn save_connection(
        &self,
        request: &SaveConnectionRequest,
    ) -> Result<Option<String>, ApiError>;
    async fn list_connections(&self) -> Result<Vec<ConnectionProfile>, ApiError>;
    async fn get_connection(&self, id: &str) -> Result<ConnectionProfile, ApiError>;
    async fn delete_connection(&self, id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        connection_id: Option<String>,
    },
    Disconnecting,
}

impl ConnectionState {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected { .. } => "Connected",
            Self::Disconnecting => "Disconnecting...",
        }
    }
}

/// Read-only view of the session, shared with every component that needs to
/// know whether a connection is open. Only the manager mutates it.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    state: Arc<RwLock<ConnectionState>>,
}

impl SessionView {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.state.read(), ConnectionState::Connected { .. })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            *self.state.read(),
            ConnectionState::Connecting | ConnectionState::Disconnecting
        )
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<String> {
        match &*self.state.read() {
            ConnectionState::Connected { connection_id } => connection_id.clone(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ConnectionObserver: Send + Sync {
    async fn on_connected(&self, connection_id: Option<&str>);
    async fn on_disconnected(&self);
}

#[derive(Debug, Error)]
pub enum ConnectionManagerError {
    #[error("already connected to database")]
    AlreadyConnected,
    #[error("a connection attempt is already in progress")]
    ConnectInProgress,
    #[error("not connected to any database")]
    NotConnected,
    #[error("a disconnect is already in progress")]
    DisconnectInProgress,
    #[error(transparent)]
    Validation(#[from] FormError),
    #[error("connection backend failed: {0}")]
    Backend(#[source] ApiError),
}

pub struct ConnectionManager<A: ConnectionApi> {
    api: Arc<A>,
    session: SessionView,
    saved: Mutex<SavedConnections>,
    logs: Arc<LogStore>,
    notifier: Arc<dyn Notifier>,
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
}

impl<A: ConnectionApi> ConnectionManager<A> {
    #[must_use]
    pub fn new(api: Arc<A>, logs: Arc<LogStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            session: SessionView::default(),
            saved: Mutex::new(SavedConnections::new()),
            logs,
            notifier,
            observers: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn session(&self) -> SessionView {
        self.session.clone()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn subscribe(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.write().push(observer);
    }

    /// Opens a session from the form. Rejected without a network call while
    /// a session exists or another attempt is in flight.
    pub async fn start_connection(
        &self,
        form: &ConnectionForm,
    ) -> Result<Option<String>, ConnectionManagerError> {
        let request = {
            let mut state = self.session.state.write();
            let rejection = match &*state {
                ConnectionState::Connected { .. } => Some(ConnectionManagerError::AlreadyConnected),
                ConnectionState::Connecting => Some(ConnectionManagerError::ConnectInProgress),
                ConnectionState::Disconnecting => {
                    Some(ConnectionManagerError::DisconnectInProgress)
                }
                ConnectionState::Disconnected => None,
            };

            match rejection {
                Some(rejection) => Err(rejection),
                None => match form.to_connect_request() {
                    Ok(request) => {
                        *state = ConnectionState::Connecting;
                        Ok(request)
                    }
                    Err(error) => Err(ConnectionManagerError::Validation(error)),
                },
            }
        };

        let request = match request {
            Ok(request) => request,
            Err(error) => {
                self.report_connect_rejection(&error);
                return Err(error);
            }
        };

        self.logs.record(
            LogCategory::Connection,
            "Connecting to database",
            details([
                ("dbType", json!(request.db_type)),
                ("host", json!(request.host)),
                ("port", json!(request.port)),
                ("database", json!(request.database)),
                ("username", json!(request.username)),
            ]),
        );
        self.notifier
            .notify("Connecting to database...", Severity::Info);

        match self.api.connect(&request).await {
            Ok(response) => {
                let connection_id = response.connection_id.clone();
                *self.session.state.write() = ConnectionState::Connected {
                    connection_id: connection_id.clone(),
                };

                self.logs.record(
                    LogCategory::Connection,
                    "Connection successful",
                    details([("connectionId", json!(connection_id))]),
                );
                self.logs.record(
                    LogCategory::Monitoring,
                    "Database connection established",
                    details([
                        ("dbType", json!(request.db_type)),
                        ("host", json!(request.host)),
                        ("database", json!(request.database)),
                    ]),
                );

                let message = response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| {
                        format!(
                            "Connected successfully to {} at {}!",
                            request.db_type, request.host
                        )
                    });
                self.notifier.notify(&message, Severity::Success);

                for observer in self.observers() {
                    observer.on_connected(connection_id.as_deref()).await;
                }
                Ok(connection_id)
            }
            Err(error) => {
                *self.session.state.write() = ConnectionState::Disconnected;
                self.logs.record(
                    LogCategory::Connection,
                    "Connection error",
                    details([("error", json!(error.to_string()))]),
                );
                self.logs.record(
                    LogCategory::Error,
                    "Failed to connect to database",
                    details([
                        ("host", json!(request.host)),
                        ("error", json!(error.to_string())),
                    ]),
                );
                self.notifier
                    .notify(&format!("Error: {error}"), Severity::Danger);
                Err(ConnectionManagerError::Backend(error))
            }
        }
    }

    pub async fn stop_connection(&self) -> Result<(), ConnectionManagerError> {
        let connection_id = {
            let mut state = self.session.state.write();
            match state.clone() {
                ConnectionState::Connected { connection_id } => {
                    *state = ConnectionState::Disconnecting;
                    Ok(connection_id)
                }
                ConnectionState::Disconnected => Err(ConnectionManagerError::NotConnected),
                ConnectionState::Connecting => Err(ConnectionManagerError::ConnectInProgress),
                ConnectionState::Disconnecting => {
                    Err(ConnectionManagerError::DisconnectInProgress)
                }
            }
        };

        let connection_id = match connection_id {
            Ok(connection_id) => connection_id,
            Err(error) => {
                let message = match error {
                    ConnectionManagerError::NotConnected => "Not connected to any database",
                    _ => "Please wait for the current operation to finish",
                };
                self.logs.record(
                    LogCategory::Connection,
                    "Disconnect rejected",
                    details([("reason", json!(error.to_string()))]),
                );
                self.notifier.notify(message, Severity::Warning);
                return Err(error);
            }
        };

        self.logs.record(
            LogCategory::Connection,
            "Disconnecting from database",
            details([("connectionId", json!(connection_id))]),
        );

        match self.api.disconnect(connection_id.as_deref()).await {
            Ok(message) => {
                *self.session.state.write() = ConnectionState::Disconnected;
                self.logs.record(
                    LogCategory::Monitoring,
                    "Database connection closed",
                    details([("connectionId", json!(connection_id))]),
                );
                let message = message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| "Disconnected from database".to_string());
                self.notifier.notify(&message, Severity::Success);

                for observer in self.observers() {
                    observer.on_disconnected().await;
                }
                Ok(())
            }
            Err(error) => {
                *self.session.state.write() = ConnectionState::Connected {
                    connection_id: connection_id.clone(),
                };
                self.logs.record(
                    LogCategory::Error,
                    "Failed to disconnect from database",
                    details([("error", json!(error.to_string()))]),
                );
                self.notifier
                    .notify(&format!("Error: {error}"), Severity::Danger);
                Err(ConnectionManagerError::Backend(error))
            }
        }
    }

    pub async fn save_connection(&self, form: &ConnectionForm) -> Result<(), ConnectionManagerError> {
        let request = match form.to_save_request() {
            Ok(request) => request,
            Err(error) => {
                self.notifier.notify(&error.to_string(), Severity::Warning);
                return Err(error.into());
            }
        };

        self.logs.record(
            LogCategory::Audit,
            "Saving connection details",
            details([
                ("name", json!(request.name)),
                ("folder", json!(request.folder)),
                ("dbType", json!(request.db_type)),
                ("host", json!(request.host)),
            ]),
        );

        match self.api.save_connection(&request).await {
            Ok(_) => {
                self.saved.lock().mark_stale();
                self.notifier.notify(
                    &format!("Connection \"{}\" saved successfully!", request.name),
                    Severity::Success,
                );
                // the listing refresh reports its own failures
                let _ = self.refresh_saved_connections().await;
                Ok(())
            }
            Err(error) => {
                self.logs.record(
                    LogCategory::Error,
                    "Failed to save connection",
                    details([
                        ("name", json!(request.name)),
                        ("error", json!(error.to_string())),
                    ]),
                );
                self.notifier
                    .notify(&format!("Error saving connection: {error}"), Severity::Danger);
                Err(ConnectionManagerError::Backend(error))
            }
        }
    }

    pub async fn refresh_saved_connections(
        &self,
    ) -> Result<Vec<ConnectionProfile>, ConnectionManagerError> {
        match self.api.list_connections().await {
            Ok(profiles) => {
                let mut saved = self.saved.lock();
                saved.replace_all(profiles);
                self.logs.record(
                    LogCategory::Connection,
                    "Loaded saved connections",
                    details([("count", json!(saved.profiles().len()))]),
                );
                Ok(saved.profiles().to_vec())
            }
            Err(error) => {
                self.logs.record(
                    LogCategory::Error,
                    "Failed to load saved connections",
                    details([("error", json!(error.to_string()))]),
                );
                Err(ConnectionManagerError::Backend(error))
            }
        }
    }

    /// Fetches one saved connection as a form, password left blank.
    pub async fn load_saved_connection(
        &self,
        id: &str,
    ) -> Result<ConnectionForm, ConnectionManagerError> {
        match self.api.get_connection(id).await {
            Ok(profile) => {
                self.logs.record(
                    LogCategory::Connection,
                    "Loaded saved connection details",
                    details([("id", json!(id)), ("name", json!(profile.name))]),
                );
                Ok(ConnectionForm::from_profile(&profile))
            }
            Err(error) => {
                self.logs.record(
                    LogCategory::Error,
                    "Failed to load connection details",
                    details([("id", json!(id)), ("error", json!(error.to_string()))]),
                );
                self.notifier
                    .notify("Error loading connection details", Severity::Danger);
                Err(ConnectionManagerError::Backend(error))
            }
        }
    }

    pub async fn delete_saved_connection(&self, id: &str) -> Result<(), ConnectionManagerError> {
        match self.api.delete_connection(id).await {
            Ok(()) => {
                self.saved.lock().mark_stale();
                self.logs.record(
                    LogCategory::Audit,
                    "Deleted saved connection",
                    details([("id", json!(id))]),
                );
                self.notifier
                    .notify("Connection deleted successfully", Severity::Success);
                let _ = self.refresh_saved_connections().await;
                Ok(())
            }
            Err(error) => {
                self.notifier
                    .notify(&format!("Error deleting connection: {error}"), Severity::Danger);
                Err(ConnectionManagerError::Backend(error))
            }
        }
    }

    #[must_use]
    pub fn saved_connections(&self, db_type: Option<&DbType>) -> Vec<ConnectionProfile> {
        self.saved.lock().filter_by_type(db_type)
    }

    #[must_use]
    pub fn saved_connections_stale(&self) -> bool {
        self.saved.lock().is_stale()
    }

    fn observers(&self) -> Vec<Arc<dyn ConnectionObserver>> {
        self.observers.read().clone()
    }

    fn report_connect_rejection(&self, error: &ConnectionManagerError) {
        let (message, severity) = match error {
            ConnectionManagerError::AlreadyConnected => {
                ("Already connected to database".to_string(), Severity::Warning)
            }
            ConnectionManagerError::ConnectInProgress
            | ConnectionManagerError::DisconnectInProgress => (
                "Please wait for the current operation to finish".to_string(),
                Severity::Warning,
            ),
            other => (other.to_string(), Severity::Warning),
        };
        self.logs.record(
            LogCategory::Connection,
            "Connection attempt rejected",
            details([("reason", json!(error.to_string()))]),
        );
        self.notifier.notify(&message, severity);
    }
}

impl<A: ConnectionApi> std::fmt::Debug for ConnectionManager<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.session.state())
            .field("observers", &self.observers.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::{
        ConnectRequest, ConnectResponse, ConnectionApi, ConnectionManager,
        ConnectionManagerError, ConnectionObserver, ConnectionState, SaveConnectionRequest,
    };
    use crate::api::ApiError;
    use crate::forms::{
        ConnectionForm, DbType, FormFields, FIELD_DATABASE, FIELD_DB_TYPE, FIELD_HOST,
        FIELD_PASSWORD, FIELD_PORT, FIELD_USERNAME,
    };
    use crate::log_store::{LogCategory, LogStore};
    use crate::notifications::{Severity, ToastCenter};
    use crate::profiles::ConnectionProfile;

    #[derive(Default)]
    struct FakeConnectionApi {
        connect_calls: AtomicUsize,
        disconnect_calls: AtomicUsize,
        save_calls: AtomicUsize,
        list_calls: AtomicUsize,
        fail_connect: bool,
        fail_disconnect: bool,
        last_request: Mutex<Option<ConnectRequest>>,
    }

    #[async_trait]
    impl ConnectionApi for FakeConnectionApi {
        async fn connect(&self, request: &ConnectRequest) -> Result<ConnectResponse, ApiError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock() = Some(request.clone());
            tokio::task::yield_now().await;
            if self.fail_connect {
                return Err(ApiError::Application("Access denied for user".to_string()));
            }
            Ok(ConnectResponse {
                connection_id: Some("conn-1".to_string()),
                message: None,
            })
        }

        async fn disconnect(&self, _connection_id: Option<&str>) -> Result<Option<String>, ApiError> {
            self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_disconnect {
                return Err(ApiError::status(500));
            }
            Ok(None)
        }

        async fn save_connection(
            &self,
            _request: &SaveConnectionRequest,
        ) -> Result<Option<String>, ApiError> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some("Connection saved successfully".to_string()))
        }

        async fn list_connections(&self) -> Result<Vec<ConnectionProfile>, ApiError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut profile = ConnectionProfile::new("c1", "prod", DbType::Postgresql, "db", 5432);
            profile.password = Some("secret".to_string());
            Ok(vec![profile])
        }

        async fn get_connection(&self, id: &str) -> Result<ConnectionProfile, ApiError> {
            let mut profile = ConnectionProfile::new(id, "prod", DbType::Postgresql, "db", 5432);
            profile.username = "admin".to_string();
            profile.password = Some("secret".to_string());
            Ok(profile)
        }

        async fn delete_connection(&self, _id: &str) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionObserver for CountingObserver {
        async fn on_connected(&self, _connection_id: Option<&str>) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_disconnected(&self) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        api: Arc<FakeConnectionApi>,
        toasts: Arc<ToastCenter>,
        logs: Arc<LogStore>,
        observer: Arc<CountingObserver>,
        manager: ConnectionManager<FakeConnectionApi>,
    }

    fn harness(api: FakeConnectionApi) -> Harness {
        let api = Arc::new(api);
        let toasts = Arc::new(ToastCenter::default());
        let logs = Arc::new(LogStore::in_memory(100));
        let observer = Arc::new(CountingObserver::default());
        let manager = ConnectionManager::new(api.clone(), logs.clone(), toasts.clone());
        manager.subscribe(observer.clone());
        Harness {
            api,
            toasts,
            logs,
            observer,
            manager,
        }
    }

    fn postgres_form() -> ConnectionForm {
        ConnectionForm::from_fields(
            &FormFields::new()
                .with(FIELD_DB_TYPE, "postgresql")
                .with(FIELD_HOST, "db.local")
                .with(FIELD_PORT, "5432")
                .with(FIELD_DATABASE, "app")
                .with(FIELD_USERNAME, "admin")
                .with(FIELD_PASSWORD, "hunter2"),
        )
    }

    fn latest_toast(harness: &Harness) -> (String, Severity) {
        let toast = harness.toasts.latest().expect("a toast should be shown");
        (toast.message, toast.severity)
    }

    #[tokio::test]
    async fn successful_connect_notifies_observers_and_toasts() {
        let h = harness(FakeConnectionApi::default());

        let connection_id = h
            .manager
            .start_connection(&postgres_form())
            .await
            .expect("connect should succeed");

        assert_eq!(connection_id.as_deref(), Some("conn-1"));
        assert!(h.manager.is_connected());
        assert_eq!(h.observer.connected.load(Ordering::SeqCst), 1);
        assert_eq!(
            latest_toast(&h),
            (
                "Connected successfully to postgresql at db.local!".to_string(),
                Severity::Success
            )
        );
        let sent = h.api.last_request.lock().clone().expect("request recorded");
        assert_eq!(sent.port, 5432);
    }

    #[tokio::test]
    async fn connect_while_connected_is_rejected_without_network_call() {
        let h = harness(FakeConnectionApi::default());
        h.manager
            .start_connection(&postgres_form())
            .await
            .expect("first connect should succeed");

        let error = h
            .manager
            .start_connection(&postgres_form())
            .await
            .expect_err("second connect should be rejected");

        assert!(matches!(error, ConnectionManagerError::AlreadyConnected));
        assert_eq!(h.api.connect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            latest_toast(&h),
            ("Already connected to database".to_string(), Severity::Warning)
        );
    }

    #[tokio::test]
    async fn concurrent_connect_attempts_issue_one_request() {
        let h = harness(FakeConnectionApi::default());
        let form = postgres_form();

        let (first, second) = tokio::join!(
            h.manager.start_connection(&form),
            h.manager.start_connection(&form)
        );

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(ConnectionManagerError::ConnectInProgress)
        ));
        assert_eq!(h.api.connect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn incomplete_form_is_rejected_before_network() {
        let h = harness(FakeConnectionApi::default());
        let mut form = postgres_form();
        form.database.clear();

        let error = h
            .manager
            .start_connection(&form)
            .await
            .expect_err("validation should fail");

        assert!(matches!(error, ConnectionManagerError::Validation(_)));
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.api.connect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(latest_toast(&h).1, Severity::Warning);
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let h = harness(FakeConnectionApi {
            fail_connect: true,
            ..FakeConnectionApi::default()
        });

        let error = h
            .manager
            .start_connection(&postgres_form())
            .await
            .expect_err("connect should fail");

        assert!(matches!(error, ConnectionManagerError::Backend(_)));
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.observer.connected.load(Ordering::SeqCst), 0);
        assert_eq!(
            latest_toast(&h),
            ("Error: Access denied for user".to_string(), Severity::Danger)
        );
        assert_eq!(h.logs.len(LogCategory::Error), 1);
    }

    #[tokio::test]
    async fn password_is_never_logged() {
        let h = harness(FakeConnectionApi::default());
        h.manager
            .start_connection(&postgres_form())
            .await
            .expect("connect should succeed");

        let exported = String::from_utf8(h.logs.export(None).expect("export should work"))
            .expect("export should be utf-8");
        assert!(!exported.contains("hunter2"));
    }

    #[tokio::test]
    async fn stop_while_disconnected_warns_without_network_call() {
        let h = harness(FakeConnectionApi::default());

        let error = h
            .manager
            .stop_connection()
            .await
            .expect_err("stop should be rejected");

        assert!(matches!(error, ConnectionManagerError::NotConnected));
        assert_eq!(h.api.disconnect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            latest_toast(&h),
            ("Not connected to any database".to_string(), Severity::Warning)
        );
    }

    #[tokio::test]
    async fn stop_connection_notifies_observers() {
        let h = harness(FakeConnectionApi::default());
        h.manager
            .start_connection(&postgres_form())
            .await
            .expect("connect should succeed");

        h.manager
            .stop_connection()
            .await
            .expect("disconnect should succeed");

        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.observer.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(latest_toast(&h).0, "Disconnected from database");
    }

    #[tokio::test]
    async fn failed_disconnect_keeps_session_open() {
        let h = harness(FakeConnectionApi {
            fail_disconnect: true,
            ..FakeConnectionApi::default()
        });
        h.manager
            .start_connection(&postgres_form())
            .await
            .expect("connect should succeed");

        assert!(h.manager.stop_connection().await.is_err());
        assert!(h.manager.is_connected());
        assert_eq!(h.manager.session().connection_id().as_deref(), Some("conn-1"));
        assert_eq!(h.observer.disconnected.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn save_requires_name_then_refreshes_listing() {
        let h = harness(FakeConnectionApi::default());

        let error = h
            .manager
            .save_connection(&postgres_form())
            .await
            .expect_err("unnamed save should fail");
        assert!(matches!(error, ConnectionManagerError::Validation(_)));
        assert_eq!(h.api.save_calls.load(Ordering::SeqCst), 0);

        let mut form = postgres_form();
        form.name = "prod".to_string();
        h.manager
            .save_connection(&form)
            .await
            .expect("save should succeed");

        assert_eq!(h.api.save_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.api.list_calls.load(Ordering::SeqCst), 1);
        assert!(!h.manager.saved_connections_stale());
        let saved = h.manager.saved_connections(None);
        assert_eq!(saved.len(), 1);
        assert!(saved[0].password.is_none());
        assert_eq!(
            latest_toast(&h),
            ("Connection \"prod\" saved successfully!".to_string(), Severity::Success)
        );
    }

    #[tokio::test]
    async fn loading_saved_connection_blanks_password() {
        let h = harness(FakeConnectionApi::default());

        let form = h
            .manager
            .load_saved_connection("c1")
            .await
            .expect("load should succeed");

        assert_eq!(form.username, "admin");
        assert_eq!(form.password, "");
        assert_eq!(form.port, "5432");
    }
}
