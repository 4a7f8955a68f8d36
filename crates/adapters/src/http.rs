use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use dbconsole_core::api::ApiError;
use dbconsole_core::cloud_monitor::{MonitoringApi, ProviderMetrics};
use dbconsole_core::cloud_wizard::{
    CertificateInfo, CertificateUpload, CloudApi, CloudConnectResponse, CloudConnectionRequest,
    ProviderWire,
};
use dbconsole_core::config::ApiSettings;
use dbconsole_core::connection_manager::{
    ConnectRequest, ConnectResponse, ConnectionApi, SaveConnectionRequest,
};
use dbconsole_core::drivers::{DriverApi, DriverInfo, DriverUpload};
use dbconsole_core::log_store::{LogApi, LogCategory, LogEntry};
use dbconsole_core::profiles::ConnectionProfile;
use dbconsole_core::query_runner::{QueryApi, QueryPage, QueryRequest};
use dbconsole_core::schema_explorer::{
    DatabaseInfo, ForeignKeyInfo, IndexInfo, SchemaApi, SchemaInfo, TableInfo, TableStructure,
};

const BODY_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("invalid backend URL `{0}` (expected http:// or https://)")]
    InvalidBaseUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Talks to the connector backend over its JSON API.
#[derive(Debug, Clone)]
pub struct HttpConnectorClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpConnectorClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, HttpClientError> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HttpClientError::InvalidBaseUrl(settings.base_url.clone()));
        }

        let timeout = settings.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpClientError::Build)?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Appends path segments, percent-encoding each one.
    fn segment_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|error| ApiError::Transport(format!("invalid backend URL: {error}")))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport(format!("`{}` cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn transport_error(&self, error: &reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else {
            ApiError::Transport(error.to_string())
        }
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<(StatusCode, String), ApiError> {
        let response = request
            .send()
            .await
            .map_err(|error| self.transport_error(&error))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| self.transport_error(&error))?;
        debug!(status = status.as_u16(), bytes = body.len(), "backend responded");
        Ok((status, body))
    }

    /// Any non-2xx status is a failure; the body's `message` is kept when present.
    async fn send_json(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let (status, body) = self.send_raw(request).await?;
        let parsed = serde_json::from_str::<Value>(&body).ok();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: parsed.as_ref().and_then(message_of),
            });
        }
        parsed.ok_or_else(|| {
            ApiError::Decode(format!("expected a JSON body, got `{}`", preview(&body)))
        })
    }

    /// Like `send_json`, and additionally requires `success: true`.
    async fn send_envelope(&self, request: RequestBuilder) -> Result<Value, ApiError> {
        let value = self.send_json(request).await?;
        match value.get("success").and_then(Value::as_bool) {
            Some(true) => Ok(value),
            _ => Err(ApiError::application(message_of(&value), "Request failed")),
        }
    }

    /// For endpoints that answer with an empty 2xx.
    async fn send_accepting(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let (status, body) = self.send_raw(request).await?;
        if status.is_success() {
            return Ok(());
        }
        Err(ApiError::Status {
            status: status.as_u16(),
            message: serde_json::from_str::<Value>(&body)
                .ok()
                .as_ref()
                .and_then(message_of),
        })
    }
}

fn message_of(value: &Value) -> Option<String> {
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|error| ApiError::Decode(error.to_string()))
}

fn field<T: DeserializeOwned>(value: &Value, key: &str) -> Result<T, ApiError> {
    let raw = value.get(key).cloned().unwrap_or(Value::Null);
    serde_json::from_value(raw).map_err(|error| ApiError::Decode(format!("`{key}`: {error}")))
}

/// Lists arrive either bare or wrapped as `{key: [...]}`.
fn list_field<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>, ApiError> {
    if value.is_array() {
        return decode(value);
    }
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ApiError::application(message_of(&value), "Request failed"));
    }
    field(&value, key)
}

/// Query results sit under `results` (or `result`); bare pages are accepted.
fn query_page(value: Value) -> Result<QueryPage, ApiError> {
    let nested = ["results", "result"]
        .into_iter()
        .find_map(|key| value.get(key).filter(|inner| inner.is_object()).cloned());
    decode(nested.unwrap_or(value))
}

fn schema_params<'a>(connection_id: &'a str, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    let mut params = vec![("connectionId", connection_id)];
    params.extend(extra.iter().filter(|(_, value)| !value.is_empty()).copied());
    params
}

#[async_trait]
impl ConnectionApi for HttpConnectorClient {
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectResponse, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .post(self.url("/api/connections/connect"))
                    .json(request),
            )
            .await?;
        decode(value)
    }

    async fn disconnect(&self, connection_id: Option<&str>) -> Result<Option<String>, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .post(self.url("/disconnect"))
                    .json(&json!({ "connectionId": connection_id })),
            )
            .await?;
        Ok(message_of(&value))
    }

    async fn save_connection(
        &self,
        request: &SaveConnectionRequest,
    ) -> Result<Option<String>, ApiError> {
        let value = self
            .send_envelope(self.client.post(self.url("/api/connections/save")).json(request))
            .await?;
        Ok(message_of(&value))
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionProfile>, ApiError> {
        let value = self
            .send_json(self.client.get(self.url("/api/connections")))
            .await?;
        list_field(value, "connections")
    }

    async fn get_connection(&self, id: &str) -> Result<ConnectionProfile, ApiError> {
        let value = self
            .send_json(
                self.client
                    .get(self.segment_url(&["api", "connections", id])?),
            )
            .await?;
        match value.get("connection") {
            Some(inner) => decode(inner.clone()),
            None => decode(value),
        }
    }

    async fn delete_connection(&self, id: &str) -> Result<(), ApiError> {
        self.send_envelope(
            self.client
                .delete(self.segment_url(&["api", "connections", id])?),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl QueryApi for HttpConnectorClient {
    async fn execute_page(&self, request: &QueryRequest) -> Result<QueryPage, ApiError> {
        let page = request.page.to_string();
        let page_size = request.page_size.to_string();
        let mut params = vec![
            ("query", request.query.as_str()),
            ("page", page.as_str()),
            ("pageSize", page_size.as_str()),
        ];
        if let Some(connection_id) = request.connection_id.as_deref() {
            params.push(("connectionId", connection_id));
        }

        let value = self
            .send_envelope(self.client.post(self.url("/execute")).query(&params))
            .await?;
        query_page(value)
    }

    async fn execute_statement(
        &self,
        connection_id: Option<&str>,
        sql: &str,
    ) -> Result<QueryPage, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .post(self.url("/api/query"))
                    .json(&json!({ "connectionId": connection_id, "query": sql })),
            )
            .await?;
        query_page(value)
    }
}

#[async_trait]
impl SchemaApi for HttpConnectorClient {
    async fn list_databases(&self, connection_id: &str) -> Result<Vec<DatabaseInfo>, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .get(self.url("/api/schema/databases"))
                    .query(&schema_params(connection_id, &[])),
            )
            .await?;
        field(&value, "databases")
    }

    async fn list_schemas(
        &self,
        connection_id: &str,
        database: &str,
    ) -> Result<Vec<SchemaInfo>, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .get(self.url("/api/schema/schemas"))
                    .query(&schema_params(connection_id, &[("database", database)])),
            )
            .await?;
        field(&value, "schemas")
    }

    async fn list_tables(
        &self,
        connection_id: &str,
        database: &str,
        schema: &str,
    ) -> Result<Vec<TableInfo>, ApiError> {
        let value = self
            .send_envelope(self.client.get(self.url("/api/schema/tables")).query(
                &schema_params(connection_id, &[("database", database), ("schema", schema)]),
            ))
            .await?;
        field(&value, "tables")
    }

    async fn table_structure(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
    ) -> Result<TableStructure, ApiError> {
        let value = self
            .send_envelope(
                self.client.get(self.url("/api/schema/table-structure")).query(
                    &schema_params(connection_id, &[("tableName", table), ("schema", schema)]),
                ),
            )
            .await?;
        decode(value)
    }

    async fn table_indexes(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IndexInfo>, ApiError> {
        let value = self
            .send_envelope(self.client.get(self.url("/api/schema/indexes")).query(
                &schema_params(connection_id, &[("tableName", table), ("schema", schema)]),
            ))
            .await?;
        field(&value, "indexes")
    }

    async fn table_foreign_keys(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyInfo>, ApiError> {
        let value = self
            .send_envelope(self.client.get(self.url("/api/schema/foreign-keys")).query(
                &schema_params(connection_id, &[("tableName", table), ("schema", schema)]),
            ))
            .await?;
        field(&value, "foreignKeys")
    }
}

#[async_trait]
impl CloudApi for HttpConnectorClient {
    async fn providers(&self) -> Result<BTreeMap<String, ProviderWire>, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .get(self.url("/api/cloud-connections/providers")),
            )
            .await?;
        field(&value, "providers")
    }

    async fn test_cloud_connection(
        &self,
        request: &CloudConnectionRequest,
    ) -> Result<CloudConnectResponse, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .post(self.url("/api/cloud-connections/test"))
                    .json(request),
            )
            .await?;
        decode(value)
    }

    async fn connect_cloud(
        &self,
        request: &CloudConnectionRequest,
    ) -> Result<CloudConnectResponse, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .post(self.url("/api/cloud-connections/connect"))
                    .json(request),
            )
            .await?;
        decode(value)
    }

    async fn disconnect_cloud(&self, connection_id: &str) -> Result<(), ApiError> {
        let url = self.segment_url(&["api", "cloud-connections", "disconnect", connection_id])?;
        self.send_envelope(self.client.post(url))
            .await
            .map(|_| ())
    }

    async fn upload_certificate(
        &self,
        upload: &CertificateUpload,
    ) -> Result<CertificateInfo, ApiError> {
        let form = Form::new()
            .text("connectionId", upload.connection_id.clone())
            .text("certificateType", upload.certificate_type.as_str())
            .part(
                "certificateFile",
                Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone()),
            );
        let value = self
            .send_envelope(
                self.client
                    .post(self.url("/api/ssl-certificates/upload"))
                    .multipart(form),
            )
            .await?;
        field(&value, "certificate")
    }
}

#[async_trait]
impl MonitoringApi for HttpConnectorClient {
    async fn metrics(&self) -> Result<BTreeMap<String, ProviderMetrics>, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .get(self.url("/api/cloud-management/monitoring/metrics")),
            )
            .await?;
        field(&value, "metrics")
    }

    async fn health(&self) -> Result<BTreeMap<String, String>, ApiError> {
        let value = self
            .send_envelope(
                self.client
                    .get(self.url("/api/cloud-management/monitoring/health")),
            )
            .await?;
        field(&value, "healthStatus")
    }
}

#[async_trait]
impl DriverApi for HttpConnectorClient {
    async fn list_drivers(&self) -> Result<Vec<DriverInfo>, ApiError> {
        let value = self.send_json(self.client.get(self.url("/api/drivers"))).await?;
        list_field(value, "drivers")
    }

    async fn upload_driver(&self, upload: &DriverUpload) -> Result<DriverInfo, ApiError> {
        let form = Form::new()
            .text("name", upload.name.clone())
            .text("className", upload.class_name.clone())
            .text("urlTemplate", upload.url_template.clone())
            .text("defaultPort", upload.default_port.to_string())
            .part(
                "driverFile",
                Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone()),
            );
        let value = self
            .send_envelope(self.client.post(self.url("/api/drivers")).multipart(form))
            .await?;
        field(&value, "driver")
    }
}

#[async_trait]
impl LogApi for HttpConnectorClient {
    async fn post_log(&self, entry: &LogEntry) -> Result<(), ApiError> {
        self.send_accepting(
            self.client
                .post(self.url("/api/logs"))
                .json(&json!({ "type": entry.category.as_str(), "entry": entry })),
        )
        .await
    }

    async fn cleanup_logs(&self, max_files: u32) -> Result<(), ApiError> {
        self.send_accepting(
            self.client
                .post(self.url("/api/logs/cleanup"))
                .json(&json!({ "maxFiles": max_files })),
        )
        .await
    }

    async fn clear_logs(&self, category: Option<LogCategory>) -> Result<(), ApiError> {
        let scope = category.map_or("all", LogCategory::as_str);
        self.send_accepting(
            self.client
                .post(self.url("/api/logs/clear"))
                .json(&json!({ "type": scope })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{list_field, query_page, schema_params, HttpClientError, HttpConnectorClient};
    use dbconsole_core::api::ApiError;
    use dbconsole_core::config::ApiSettings;
    use dbconsole_core::profiles::ConnectionProfile;

    #[test]
    fn rejects_base_url_without_scheme() {
        let settings = ApiSettings {
            base_url: "localhost:8080".to_string(),
            timeout_secs: 5,
        };

        assert!(matches!(
            HttpConnectorClient::new(&settings),
            Err(HttpClientError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let settings = ApiSettings {
            base_url: "http://db-backend:9000/".to_string(),
            timeout_secs: 5,
        };

        let client = HttpConnectorClient::new(&settings).expect("valid settings");
        assert_eq!(client.base_url(), "http://db-backend:9000");
    }

    #[test]
    fn lists_accept_bare_or_wrapped_arrays() {
        let bare = json!([{ "id": "1", "name": "prod", "dbType": "mysql", "port": "3306" }]);
        let wrapped = json!({ "success": true, "connections": bare.clone() });

        let from_bare: Vec<ConnectionProfile> = list_field(bare, "connections").expect("bare list");
        let from_wrapped: Vec<ConnectionProfile> =
            list_field(wrapped, "connections").expect("wrapped list");

        assert_eq!(from_bare, from_wrapped);
        assert_eq!(from_bare[0].port, 3306);

        let failed = json!({ "success": false, "message": "storage offline" });
        assert_eq!(
            list_field::<ConnectionProfile>(failed, "connections"),
            Err(ApiError::Application("storage offline".to_string()))
        );
    }

    #[test]
    fn query_page_reads_nested_results() {
        let value = json!({
            "success": true,
            "results": { "columns": ["id"], "data": [[1], [null]], "totalPages": 3 }
        });

        let page = query_page(value).expect("page should decode");

        assert_eq!(page.columns, vec!["id"]);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn empty_schema_params_are_omitted() {
        let params = schema_params("c1", &[("tableName", "users"), ("schema", "")]);

        assert_eq!(params, vec![("connectionId", "c1"), ("tableName", "users")]);
    }

    #[test]
    fn path_ids_are_percent_encoded() {
        let settings = ApiSettings {
            base_url: "http://db-backend:9000/proxy/".to_string(),
            timeout_secs: 5,
        };
        let client = HttpConnectorClient::new(&settings).expect("valid settings");

        let url = client
            .segment_url(&["api", "connections", "a/b c?"])
            .expect("url should build");

        assert_eq!(
            url.as_str(),
            "http://db-backend:9000/proxy/api/connections/a%2Fb%20c%3F"
        );
    }
}
