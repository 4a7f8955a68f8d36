use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::api::ApiError;
use crate::connection_manager::{ConnectionObserver, SessionView};
use crate::log_store::{details, LogCategory, LogStore};
use crate::notifications::{Notifier, Severity};

pub const NULL_MARKER: &str = "NULL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    pub query: String,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, alias = "data")]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub total_pages: u32,
}

#[async_trait]
pub trait QueryApi: Send + Sync {
    async fn execute_page(&self, request: &QueryRequest) -> Result<QueryPage, ApiError>;
    async fn execute_statement(
        &self,
        connection_id: Option<&str>,
        sql: &str,
    ) -> Result<QueryPage, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Null,
    Value(String),
}

impl CellValue {
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Value(text.clone()),
            other => Self::Value(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Null => None,
            Self::Value(text) => Some(text),
        }
    }

    #[must_use]
    pub fn render(&self) -> RenderedCell {
        match self {
            Self::Null => RenderedCell {
                text: NULL_MARKER.to_string(),
                is_null: true,
            },
            Self::Value(text) => RenderedCell {
                text: text.clone(),
                is_null: false,
            },
        }
    }
}

/// A display cell. Nulls carry a distinct flag so they can be styled apart
/// from the literal text "NULL".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCell {
    pub text: String,
    pub is_null: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultGrid {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultGrid {
    #[must_use]
    pub fn from_page(page: &QueryPage) -> Self {
        Self {
            columns: page.columns.clone(),
            rows: page
                .rows
                .iter()
                .map(|row| row.iter().map(CellValue::from_json).collect())
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn render_cell(&self, row: usize, column: usize) -> Option<RenderedCell> {
        self.rows.get(row)?.get(column).map(CellValue::render)
    }

    #[must_use]
    pub fn render_rows(&self) -> Vec<Vec<RenderedCell>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(CellValue::render).collect())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Spreadsheet,
    Json,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Result<Self, QueryRunnerError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "excel" | "csv" | "spreadsheet" => Ok(Self::Spreadsheet),
            "json" => Ok(Self::Json),
            other => Err(QueryRunnerError::UnsupportedFormat(other.to_string())),
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Spreadsheet => "csv",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExportFailure {
    message: String,
}

impl ExportFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Writes result grids and raw blobs to files.
pub trait ResultExporter: Send + Sync {
    fn export_grid(&self, format: ExportFormat, grid: &ResultGrid)
        -> Result<PathBuf, ExportFailure>;
    fn save_blob(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportFailure>;
}

#[derive(Debug, Error)]
pub enum QueryRunnerError {
    #[error("Please enter a SQL query")]
    EmptyQuery,
    #[error("Not connected to any database")]
    NotConnected,
    #[error("No data to export")]
    NoResults,
    #[error("Unsupported export format `{0}`")]
    UnsupportedFormat(String),
    #[error("no exporter configured")]
    ExporterUnavailable,
    #[error("query backend failed: {0}")]
    Backend(#[source] ApiError),
    #[error("export failed: {0}")]
    Export(#[source] ExportFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub current_page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_rows: Option<u64>,
}

impl PageState {
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            current_page: 1,
            page_size,
            total_pages: 0,
            total_rows: None,
        }
    }

    /// The page `delta` away, or `None` when out of range. An unknown total
    /// (zero) only bounds the low end; unpaginated results have no neighbours.
    #[must_use]
    pub fn target(&self, delta: i64) -> Option<u32> {
        if self.page_size == 0 {
            return None;
        }
        let target = i64::from(self.current_page) + delta;
        if target < 1 || (self.total_pages > 0 && target > i64::from(self.total_pages)) {
            return None;
        }
        u32::try_from(target).ok()
    }

    #[must_use]
    pub fn can_go_previous(&self) -> bool {
        self.target(-1).is_some()
    }

    #[must_use]
    pub fn can_go_next(&self) -> bool {
        self.target(1).is_some()
    }

    #[must_use]
    pub fn label(&self) -> String {
        let mut label = if self.total_pages > 0 {
            format!("Page {} of {}", self.current_page, self.total_pages)
        } else {
            format!("Page {}", self.current_page)
        };
        if let Some(total_rows) = self.total_rows {
            label.push_str(&format!(" (Total rows: {total_rows})"));
        }
        label
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryView {
    #[default]
    Empty,
    Grid(ResultGrid),
    Error(String),
}

#[derive(Debug, Clone)]
struct LastQuery {
    connection_id: Option<String>,
    sql: String,
}

#[derive(Debug)]
struct RunnerState {
    pages: PageState,
    last_query: Option<LastQuery>,
    view: QueryView,
}

pub struct QueryRunner<A: QueryApi> {
    api: Arc<A>,
    session: SessionView,
    logs: Arc<LogStore>,
    notifier: Arc<dyn Notifier>,
    exporter: Option<Arc<dyn ResultExporter>>,
    default_page_size: u32,
    state: Mutex<RunnerState>,
}

impl<A: QueryApi> QueryRunner<A> {
    #[must_use]
    pub fn new(
        api: Arc<A>,
        session: SessionView,
        logs: Arc<LogStore>,
        notifier: Arc<dyn Notifier>,
        default_page_size: u32,
    ) -> Self {
        Self {
            api,
            session,
            logs,
            notifier,
            exporter: None,
            default_page_size,
            state: Mutex::new(RunnerState {
                pages: PageState::new(default_page_size),
                last_query: None,
                view: QueryView::Empty,
            }),
        }
    }

    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<dyn ResultExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    #[must_use]
    pub fn view(&self) -> QueryView {
        self.state.lock().view.clone()
    }

    #[must_use]
    pub fn page_state(&self) -> PageState {
        self.state.lock().pages.clone()
    }

    #[must_use]
    pub fn exporter(&self) -> Option<Arc<dyn ResultExporter>> {
        self.exporter.clone()
    }

    /// Runs `sql` against the open session from page one.
    pub async fn run(&self, sql: &str) -> Result<ResultGrid, QueryRunnerError> {
        if !self.session.is_connected() {
            self.notifier
                .notify("Not connected to any database", Severity::Warning);
            return Err(QueryRunnerError::NotConnected);
        }
        let connection_id = self.session.connection_id();
        self.execute(connection_id.as_deref(), sql, 1, self.default_page_size)
            .await
    }

    /// A `page_size` of zero runs the statement unpaginated.
    pub async fn execute(
        &self,
        connection_id: Option<&str>,
        sql: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ResultGrid, QueryRunnerError> {
        let sql = sql.trim();
        if sql.is_empty() {
            self.notifier
                .notify("Please enter a SQL query", Severity::Warning);
            return Err(QueryRunnerError::EmptyQuery);
        }

        self.logs.record(
            LogCategory::Query,
            "Executing query",
            details([
                ("query", json!(sql)),
                ("connectionId", json!(connection_id)),
                ("page", json!(page)),
                ("pageSize", json!(page_size)),
            ]),
        );

        let outcome = if page_size == 0 {
            self.api.execute_statement(connection_id, sql).await
        } else {
            let request = QueryRequest {
                connection_id: connection_id.map(str::to_string),
                query: sql.to_string(),
                page,
                page_size,
            };
            self.api.execute_page(&request).await
        };

        match outcome {
            Ok(result) => {
                let grid = ResultGrid::from_page(&result);
                {
                    let mut state = self.state.lock();
                    state.pages = PageState {
                        current_page: page.max(1),
                        page_size,
                        total_pages: result.total_pages,
                        total_rows: result.total_rows,
                    };
                    state.last_query = Some(LastQuery {
                        connection_id: connection_id.map(str::to_string),
                        sql: sql.to_string(),
                    });
                    state.view = QueryView::Grid(grid.clone());
                }

                self.logs.record(
                    LogCategory::Query,
                    "Query executed successfully",
                    details([
                        ("rows", json!(grid.row_count())),
                        ("totalRows", json!(result.total_rows)),
                    ]),
                );
                self.notifier
                    .notify("Query executed successfully", Severity::Success);
                Ok(grid)
            }
            Err(error) => {
                self.state.lock().view = QueryView::Error(error.to_string());
                self.logs.record(
                    LogCategory::Error,
                    "Query execution failed",
                    details([("query", json!(sql)), ("error", json!(error.to_string()))]),
                );
                self.notifier
                    .notify(&format!("Error: {error}"), Severity::Danger);
                Err(QueryRunnerError::Backend(error))
            }
        }
    }

    /// Moves `delta` pages from the current one. Out-of-range targets are a
    /// no-op returning `Ok(None)`.
    pub async fn navigate_page(&self, delta: i64) -> Result<Option<ResultGrid>, QueryRunnerError> {
        let (target, last_query, page_size) = {
            let state = self.state.lock();
            let Some(last_query) = state.last_query.clone() else {
                return Ok(None);
            };
            let Some(target) = state.pages.target(delta) else {
                return Ok(None);
            };
            (target, last_query, state.pages.page_size)
        };

        self.execute(
            last_query.connection_id.as_deref(),
            &last_query.sql,
            target,
            page_size,
        )
        .await
        .map(Some)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.view = QueryView::Empty;
        state.last_query = None;
        state.pages = PageState::new(self.default_page_size);
    }

    pub fn export(&self, format: &str) -> Result<PathBuf, QueryRunnerError> {
        let grid = match self.view() {
            QueryView::Grid(grid) if !grid.is_empty() => grid,
            _ => {
                self.notifier.notify("No data to export", Severity::Warning);
                return Err(QueryRunnerError::NoResults);
            }
        };

        let format = match ExportFormat::parse(format) {
            Ok(format) => format,
            Err(error) => {
                self.notifier.notify(&error.to_string(), Severity::Warning);
                return Err(error);
            }
        };

        let Some(exporter) = &self.exporter else {
            self.notifier
                .notify("Export is not available", Severity::Danger);
            return Err(QueryRunnerError::ExporterUnavailable);
        };

        match exporter.export_grid(format, &grid) {
            Ok(path) => {
                self.logs.record(
                    LogCategory::Query,
                    "Exported query results",
                    details([
                        ("format", json!(format.extension())),
                        ("path", json!(path.display().to_string())),
                        ("rows", json!(grid.row_count())),
                    ]),
                );
                self.notifier.notify(
                    &format!("Results exported to {}", path.display()),
                    Severity::Success,
                );
                Ok(path)
            }
            Err(error) => {
                self.logs.record(
                    LogCategory::Error,
                    "Failed to export query results",
                    details([("error", json!(error.to_string()))]),
                );
                self.notifier
                    .notify(&format!("Export failed: {error}"), Severity::Danger);
                Err(QueryRunnerError::Export(error))
            }
        }
    }
}

#[async_trait]
impl<A: QueryApi> ConnectionObserver for QueryRunner<A> {
    async fn on_connected(&self, _connection_id: Option<&str>) {}

    async fn on_disconnected(&self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::{
        CellValue, ExportFailure, ExportFormat, ResultExporter, PageState, QueryApi, QueryPage,
        QueryRequest, QueryRunner, QueryRunnerError, QueryView, ResultGrid, NULL_MARKER,
    };
    use crate::api::ApiError;
    use crate::connection_manager::SessionView;
    use crate::log_store::LogStore;
    use crate::notifications::{Severity, ToastCenter};

    #[derive(Default)]
    struct FakeQueryApi {
        page_calls: AtomicUsize,
        statement_calls: AtomicUsize,
        requests: Mutex<Vec<QueryRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl QueryApi for FakeQueryApi {
        async fn execute_page(&self, request: &QueryRequest) -> Result<QueryPage, ApiError> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request.clone());
            if self.fail {
                return Err(ApiError::Application(
                    "Error executing query: syntax error".to_string(),
                ));
            }
            Ok(QueryPage {
                columns: vec!["id".to_string(), "name".to_string()],
                rows: vec![vec![json!(1), json!(null)], vec![json!(2), json!("NULL")]],
                total_rows: Some(45),
                total_pages: 3,
            })
        }

        async fn execute_statement(
            &self,
            _connection_id: Option<&str>,
            _sql: &str,
        ) -> Result<QueryPage, ApiError> {
            self.statement_calls.fetch_add(1, Ordering::SeqCst);
            Ok(QueryPage {
                columns: vec!["n".to_string()],
                rows: vec![vec![json!(1)]],
                total_rows: None,
                total_pages: 0,
            })
        }
    }

    #[derive(Default)]
    struct RecordingExporter {
        exported: Mutex<Vec<(ExportFormat, usize)>>,
    }

    impl ResultExporter for RecordingExporter {
        fn export_grid(
            &self,
            format: ExportFormat,
            grid: &ResultGrid,
        ) -> Result<PathBuf, ExportFailure> {
            self.exported.lock().push((format, grid.row_count()));
            Ok(PathBuf::from(format!("query_results.{}", format.extension())))
        }

        fn save_blob(&self, file_name: &str, _bytes: &[u8]) -> Result<PathBuf, ExportFailure> {
            Ok(PathBuf::from(file_name))
        }
    }

    fn runner(api: FakeQueryApi) -> (Arc<FakeQueryApi>, Arc<ToastCenter>, QueryRunner<FakeQueryApi>) {
        let api = Arc::new(api);
        let toasts = Arc::new(ToastCenter::default());
        let runner = QueryRunner::new(
            api.clone(),
            SessionView::default(),
            Arc::new(LogStore::in_memory(100)),
            toasts.clone(),
            20,
        );
        (api, toasts, runner)
    }

    #[tokio::test]
    async fn null_cells_render_distinctly_from_null_text() {
        let (_, _, runner) = runner(FakeQueryApi::default());

        let grid = runner
            .execute(Some("conn-1"), "SELECT id, name FROM users", 1, 20)
            .await
            .expect("query should succeed");

        assert_eq!(grid.rows[0][1], CellValue::Null);
        let null_cell = grid.render_cell(0, 1).expect("cell exists");
        let text_cell = grid.render_cell(1, 1).expect("cell exists");
        assert_eq!(null_cell.text, NULL_MARKER);
        assert!(null_cell.is_null);
        assert_eq!(text_cell.text, "NULL");
        assert!(!text_cell.is_null);
        assert_eq!(grid.render_cell(0, 0).map(|cell| cell.text), Some("1".to_string()));
    }

    #[tokio::test]
    async fn previous_page_on_first_page_is_a_no_op() {
        let (api, _, runner) = runner(FakeQueryApi::default());
        runner
            .execute(Some("conn-1"), "SELECT 1", 1, 20)
            .await
            .expect("query should succeed");

        let moved = runner
            .navigate_page(-1)
            .await
            .expect("navigation should not fail");

        assert!(moved.is_none());
        assert_eq!(api.page_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.page_state().current_page, 1);
    }

    #[tokio::test]
    async fn unpaginated_results_cannot_be_paged() {
        let (api, _, runner) = runner(FakeQueryApi::default());
        runner
            .execute(Some("conn-1"), "SHOW TABLES", 1, 0)
            .await
            .expect("query should succeed");
        assert!(!runner.page_state().can_go_next());

        for _ in 0..3 {
            let moved = runner.navigate_page(1).await.expect("navigation should not fail");
            assert!(moved.is_none());
        }

        assert_eq!(api.statement_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.page_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runner.page_state().label(), "Page 1");
    }

    #[tokio::test]
    async fn navigation_reissues_last_query_within_bounds() {
        let (api, _, runner) = runner(FakeQueryApi::default());
        runner
            .execute(Some("conn-1"), "SELECT * FROM users", 1, 20)
            .await
            .expect("query should succeed");

        runner.navigate_page(1).await.expect("next page");
        runner.navigate_page(1).await.expect("last page");
        let past_end = runner.navigate_page(1).await.expect("no-op past end");

        assert!(past_end.is_none());
        assert_eq!(api.page_calls.load(Ordering::SeqCst), 3);
        let requests = api.requests.lock();
        assert_eq!(requests[2].page, 3);
        assert_eq!(requests[2].query, "SELECT * FROM users");
        assert_eq!(runner.page_state().label(), "Page 3 of 3 (Total rows: 45)");
    }

    #[test]
    fn unknown_total_only_bounds_first_page() {
        let mut pages = PageState::new(20);
        pages.current_page = 7;
        assert_eq!(pages.target(1), Some(8));
        assert_eq!(pages.target(-7), None);
    }

    #[tokio::test]
    async fn zero_page_size_uses_statement_endpoint() {
        let (api, _, runner) = runner(FakeQueryApi::default());

        runner
            .execute(None, "SELECT 1", 1, 0)
            .await
            .expect("query should succeed");

        assert_eq!(api.statement_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.page_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_query_is_rejected_without_call() {
        let (api, toasts, runner) = runner(FakeQueryApi::default());

        let error = runner
            .execute(Some("conn-1"), "   ", 1, 20)
            .await
            .expect_err("empty query should fail");

        assert!(matches!(error, QueryRunnerError::EmptyQuery));
        assert_eq!(api.page_calls.load(Ordering::SeqCst), 0);
        assert_eq!(toasts.latest().map(|toast| toast.severity), Some(Severity::Warning));
    }

    #[tokio::test]
    async fn run_requires_open_session() {
        let (api, _, runner) = runner(FakeQueryApi::default());

        let error = runner.run("SELECT 1").await.expect_err("should need a session");

        assert!(matches!(error, QueryRunnerError::NotConnected));
        assert_eq!(api.page_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_failure_renders_inline_error() {
        let (_, toasts, runner) = runner(FakeQueryApi {
            fail: true,
            ..FakeQueryApi::default()
        });

        assert!(runner.execute(Some("c"), "SELEC 1", 1, 20).await.is_err());

        assert_eq!(
            runner.view(),
            QueryView::Error("Error executing query: syntax error".to_string())
        );
        assert_eq!(toasts.latest().map(|toast| toast.severity), Some(Severity::Danger));
    }

    #[tokio::test]
    async fn export_without_results_reports_no_data() {
        let (_, toasts, runner) = runner(FakeQueryApi::default());
        let runner = runner.with_exporter(Arc::new(RecordingExporter::default()));

        let error = runner.export("excel").expect_err("nothing to export");

        assert!(matches!(error, QueryRunnerError::NoResults));
        assert_eq!(
            toasts.latest().map(|toast| toast.message),
            Some("No data to export".to_string())
        );
    }

    #[tokio::test]
    async fn export_rejects_unsupported_format() {
        let (_, _, runner) = runner(FakeQueryApi::default());
        let exporter = Arc::new(RecordingExporter::default());
        let runner = runner.with_exporter(exporter.clone());
        runner
            .execute(Some("c"), "SELECT 1", 1, 20)
            .await
            .expect("query should succeed");

        let error = runner.export("pdf").expect_err("pdf is unsupported");
        assert!(matches!(error, QueryRunnerError::UnsupportedFormat(_)));

        let path = runner.export("excel").expect("spreadsheet export");
        assert_eq!(path, PathBuf::from("query_results.csv"));
        assert_eq!(*exporter.exported.lock(), vec![(ExportFormat::Spreadsheet, 2)]);
    }

    #[tokio::test]
    async fn disconnect_clears_results() {
        use crate::connection_manager::ConnectionObserver;

        let (_, _, runner) = runner(FakeQueryApi::default());
        runner
            .execute(Some("c"), "SELECT 1", 2, 20)
            .await
            .expect("query should succeed");

        runner.on_disconnected().await;

        assert_eq!(runner.view(), QueryView::Empty);
        assert_eq!(runner.page_state().current_page, 1);
    }
}
