use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::api::ApiError;
use crate::connection_manager::{ConnectionObserver, SessionView};
use crate::log_store::{details, LogCategory, LogStore};
use crate::notifications::{Notifier, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_table_kind", rename = "type")]
    pub kind: String,
}

fn default_table_kind() -> String {
    "TABLE".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub auto_increment: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyInfo {
    pub column_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStructure {
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub primary_keys: Vec<PrimaryKeyInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: String,
    #[serde(default)]
    pub column_name: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyInfo {
    #[serde(default)]
    pub name: Option<String>,
    pub column_name: String,
    pub referenced_table: String,
    #[serde(default)]
    pub referenced_column: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDetails {
    pub structure: TableStructure,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

#[async_trait]
pub trait SchemaApi: Send + Sync {
    async fn list_databases(&self, connection_id: &str) -> Result<Vec<DatabaseInfo>, ApiError>;
    async fn list_schemas(
        &self,
        connection_id: &str,
        database: &str,
    ) -> Result<Vec<SchemaInfo>, ApiError>;
    async fn list_tables(
        &self,
        connection_id: &str,
        database: &str,
        schema: &str,
    ) -> Result<Vec<TableInfo>, ApiError>;
    async fn table_structure(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
    ) -> Result<TableStructure, ApiError>;
    async fn table_indexes(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IndexInfo>, ApiError>;
    async fn table_foreign_keys(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyInfo>, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodePath {
    Database {
        database: String,
    },
    Schema {
        database: String,
        schema: String,
    },
    Table {
        database: String,
        schema: String,
        table: String,
    },
}

impl NodePath {
    #[must_use]
    pub fn database(database: impl Into<String>) -> Self {
        Self::Database {
            database: database.into(),
        }
    }

    #[must_use]
    pub fn schema(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Self::Schema {
            database: database.into(),
            schema: schema.into(),
        }
    }

    #[must_use]
    pub fn table(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self::Table {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Database { database } => database.clone(),
            Self::Schema { database, schema } => format!("{database}.{schema}"),
            Self::Table {
                database,
                schema,
                table,
            } => format!("{database}.{schema}.{table}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeChildren {
    Schemas(Vec<SchemaInfo>),
    Tables(Vec<TableInfo>),
    Details(TableDetails),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum NodeLoad {
    #[default]
    NotLoaded,
    Loading,
    Loaded(NodeChildren),
}

#[derive(Debug, Clone, Default)]
struct NodeState {
    load: NodeLoad,
    expanded: bool,
}

#[derive(Debug, Default)]
struct SchemaTree {
    generation: u64,
    databases: Option<Vec<DatabaseInfo>>,
    nodes: BTreeMap<NodePath, NodeState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    Fetched,
    Cached,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeNodeKind {
    Database,
    Schema,
    Group,
    Table,
    Column,
    Index,
    ForeignKey,
    Placeholder,
}

/// One rendered row of the schema tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLine {
    pub depth: usize,
    pub kind: TreeNodeKind,
    pub label: String,
    pub path: Option<NodePath>,
    pub expanded: bool,
}

#[derive(Debug, Error)]
pub enum SchemaExplorerError {
    #[error("not connected to any database")]
    NotConnected,
    #[error("schema backend failed: {0}")]
    Backend(#[source] ApiError),
}

/// Lazy schema tree. Each node fetches its children at most once per
/// session; re-expanding a loaded node only toggles visibility.
pub struct SchemaExplorer<A: SchemaApi> {
    api: Arc<A>,
    session: SessionView,
    logs: Arc<LogStore>,
    notifier: Arc<dyn Notifier>,
    tree: Mutex<SchemaTree>,
}

impl<A: SchemaApi> SchemaExplorer<A> {
    #[must_use]
    pub fn new(
        api: Arc<A>,
        session: SessionView,
        logs: Arc<LogStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            session,
            logs,
            notifier,
            tree: Mutex::new(SchemaTree::default()),
        }
    }

    fn connection_id(&self) -> Result<String, SchemaExplorerError> {
        if !self.session.is_connected() {
            return Err(SchemaExplorerError::NotConnected);
        }
        Ok(self.session.connection_id().unwrap_or_default())
    }

    pub fn reset(&self) {
        let mut tree = self.tree.lock();
        tree.generation += 1;
        tree.databases = None;
        tree.nodes.clear();
    }

    /// Reloads the database list, dropping every cached node.
    pub async fn load_databases(&self) -> Result<Vec<DatabaseInfo>, SchemaExplorerError> {
        let connection_id = self.connection_id()?;
        let generation = {
            let mut tree = self.tree.lock();
            tree.generation += 1;
            tree.nodes.clear();
            tree.generation
        };

        match self.api.list_databases(&connection_id).await {
            Ok(databases) => {
                self.logs.record(
                    LogCategory::Table,
                    "Loaded databases",
                    details([("count", json!(databases.len()))]),
                );
                let mut tree = self.tree.lock();
                if tree.generation == generation {
                    tree.databases = Some(databases.clone());
                }
                Ok(databases)
            }
            Err(error) => {
                self.report_failure("databases", &error);
                Err(SchemaExplorerError::Backend(error))
            }
        }
    }

    pub async fn expand(&self, path: &NodePath) -> Result<ExpandOutcome, SchemaExplorerError> {
        let connection_id = self.connection_id()?;
        let generation = {
            let mut tree = self.tree.lock();
            let generation = tree.generation;
            let node = tree.nodes.entry(path.clone()).or_default();
            match node.load {
                NodeLoad::Loaded(_) => {
                    node.expanded = true;
                    return Ok(ExpandOutcome::Cached);
                }
                NodeLoad::Loading => return Ok(ExpandOutcome::InFlight),
                NodeLoad::NotLoaded => node.load = NodeLoad::Loading,
            }
            generation
        };

        match self.fetch_children(&connection_id, path).await {
            Ok(children) => {
                self.logs.record(
                    LogCategory::Table,
                    "Expanded schema node",
                    details([("node", json!(path.label()))]),
                );
                let mut tree = self.tree.lock();
                if tree.generation == generation {
                    let node = tree.nodes.entry(path.clone()).or_default();
                    node.load = NodeLoad::Loaded(children);
                    node.expanded = true;
                }
                Ok(ExpandOutcome::Fetched)
            }
            Err(error) => {
                {
                    let mut tree = self.tree.lock();
                    if tree.generation == generation {
                        tree.nodes.remove(path);
                    }
                }
                self.report_failure(&path.label(), &error);
                Err(SchemaExplorerError::Backend(error))
            }
        }
    }

    pub fn collapse(&self, path: &NodePath) -> bool {
        let mut tree = self.tree.lock();
        match tree.nodes.get_mut(path) {
            Some(node) if node.expanded => {
                node.expanded = false;
                true
            }
            _ => false,
        }
    }

    /// Collapses an expanded node or expands a collapsed one.
    pub async fn toggle(&self, path: &NodePath) -> Result<Option<ExpandOutcome>, SchemaExplorerError> {
        if self.collapse(path) {
            return Ok(None);
        }
        self.expand(path).await.map(Some)
    }

    #[must_use]
    pub fn is_loaded(&self, path: &NodePath) -> bool {
        self.tree
            .lock()
            .nodes
            .get(path)
            .is_some_and(|node| matches!(node.load, NodeLoad::Loaded(_)))
    }

    #[must_use]
    pub fn is_expanded(&self, path: &NodePath) -> bool {
        self.tree
            .lock()
            .nodes
            .get(path)
            .is_some_and(|node| node.expanded)
    }

    #[must_use]
    pub fn databases(&self) -> Option<Vec<DatabaseInfo>> {
        self.tree.lock().databases.clone()
    }

    #[must_use]
    pub fn table_details(&self, path: &NodePath) -> Option<TableDetails> {
        match &self.tree.lock().nodes.get(path)?.load {
            NodeLoad::Loaded(NodeChildren::Details(details)) => Some(details.clone()),
            _ => None,
        }
    }

    /// Flattens the expanded part of the tree for display. Tables are
    /// grouped by kind.
    #[must_use]
    pub fn visible_lines(&self) -> Vec<TreeLine> {
        let tree = self.tree.lock();
        let mut lines = Vec::new();
        let Some(databases) = &tree.databases else {
            return lines;
        };

        for database in databases {
            let path = NodePath::database(&database.name);
            let node = tree.nodes.get(&path);
            lines.push(TreeLine {
                depth: 0,
                kind: TreeNodeKind::Database,
                label: database.name.clone(),
                path: Some(path.clone()),
                expanded: node.is_some_and(|node| node.expanded),
            });
            if let Some(node) = node {
                render_children(&tree, node, &path, 1, &mut lines);
            }
        }
        lines
    }

    async fn fetch_children(
        &self,
        connection_id: &str,
        path: &NodePath,
    ) -> Result<NodeChildren, ApiError> {
        match path {
            NodePath::Database { database } => self
                .api
                .list_schemas(connection_id, database)
                .await
                .map(NodeChildren::Schemas),
            NodePath::Schema { database, schema } => self
                .api
                .list_tables(connection_id, database, schema)
                .await
                .map(NodeChildren::Tables),
            NodePath::Table { schema, table, .. } => {
                let structure = self.api.table_structure(connection_id, schema, table).await?;
                let indexes = self.api.table_indexes(connection_id, schema, table).await?;
                let foreign_keys = self
                    .api
                    .table_foreign_keys(connection_id, schema, table)
                    .await?;
                Ok(NodeChildren::Details(TableDetails {
                    structure,
                    indexes,
                    foreign_keys,
                }))
            }
        }
    }

    fn report_failure(&self, what: &str, error: &ApiError) {
        self.logs.record(
            LogCategory::Error,
            "Failed to load schema information",
            details([("node", json!(what)), ("error", json!(error.to_string()))]),
        );
        self.notifier
            .notify(&format!("Error loading {what}: {error}"), Severity::Danger);
    }
}

fn render_children(
    tree: &SchemaTree,
    node: &NodeState,
    path: &NodePath,
    depth: usize,
    lines: &mut Vec<TreeLine>,
) {
    if !node.expanded && !matches!(node.load, NodeLoad::Loading) {
        return;
    }

    let children = match &node.load {
        NodeLoad::NotLoaded => return,
        NodeLoad::Loading => {
            lines.push(placeholder(depth, "Loading..."));
            return;
        }
        NodeLoad::Loaded(children) => children,
    };

    match (children, path) {
        (NodeChildren::Schemas(schemas), NodePath::Database { database }) => {
            if schemas.is_empty() {
                lines.push(placeholder(depth, "No schemas found"));
            }
            for schema in schemas {
                let child = NodePath::schema(database, &schema.name);
                let child_node = tree.nodes.get(&child);
                lines.push(TreeLine {
                    depth,
                    kind: TreeNodeKind::Schema,
                    label: schema.name.clone(),
                    path: Some(child.clone()),
                    expanded: child_node.is_some_and(|node| node.expanded),
                });
                if let Some(child_node) = child_node {
                    render_children(tree, child_node, &child, depth + 1, lines);
                }
            }
        }
        (NodeChildren::Tables(tables), NodePath::Schema { database, schema }) => {
            if tables.is_empty() {
                lines.push(placeholder(depth, "No tables found"));
            }
            let mut groups: BTreeMap<&str, Vec<&TableInfo>> = BTreeMap::new();
            for table in tables {
                groups.entry(table.kind.as_str()).or_default().push(table);
            }
            for (kind, members) in groups {
                lines.push(TreeLine {
                    depth,
                    kind: TreeNodeKind::Group,
                    label: format!("{}S ({})", kind.to_uppercase(), members.len()),
                    path: None,
                    expanded: true,
                });
                for table in members {
                    let child = NodePath::table(database, schema, &table.name);
                    let child_node = tree.nodes.get(&child);
                    lines.push(TreeLine {
                        depth: depth + 1,
                        kind: TreeNodeKind::Table,
                        label: table.name.clone(),
                        path: Some(child.clone()),
                        expanded: child_node.is_some_and(|node| node.expanded),
                    });
                    if let Some(child_node) = child_node {
                        render_children(tree, child_node, &child, depth + 2, lines);
                    }
                }
            }
        }
        (NodeChildren::Details(details), NodePath::Table { .. }) => {
            render_details(details, depth, lines);
        }
        _ => {}
    }
}

fn render_details(details: &TableDetails, depth: usize, lines: &mut Vec<TreeLine>) {
    let primary_keys: Vec<&str> = details
        .structure
        .primary_keys
        .iter()
        .map(|key| key.column_name.as_str())
        .collect();

    for column in &details.structure.columns {
        let mut label = column.name.clone();
        if !column.data_type.is_empty() {
            label.push(' ');
            label.push_str(&column.data_type);
            if let Some(size) = column.size {
                label.push_str(&format!("({size})"));
            }
        }
        if !column.nullable {
            label.push_str(" NOT NULL");
        }
        if primary_keys.contains(&column.name.as_str()) {
            label.push_str(" PK");
        }
        lines.push(TreeLine {
            depth,
            kind: TreeNodeKind::Column,
            label,
            path: None,
            expanded: false,
        });
    }

    for index in &details.indexes {
        let mut label = format!("idx {}", index.name);
        if let Some(column) = &index.column_name {
            label.push_str(&format!(" ({column})"));
        }
        if index.unique {
            label.push_str(" UNIQUE");
        }
        lines.push(TreeLine {
            depth,
            kind: TreeNodeKind::Index,
            label,
            path: None,
            expanded: false,
        });
    }

    for key in &details.foreign_keys {
        let target = match &key.referenced_column {
            Some(column) => format!("{}.{column}", key.referenced_table),
            None => key.referenced_table.clone(),
        };
        lines.push(TreeLine {
            depth,
            kind: TreeNodeKind::ForeignKey,
            label: format!("fk {} -> {target}", key.column_name),
            path: None,
            expanded: false,
        });
    }
}

fn placeholder(depth: usize, label: &str) -> TreeLine {
    TreeLine {
        depth,
        kind: TreeNodeKind::Placeholder,
        label: label.to_string(),
        path: None,
        expanded: false,
    }
}

#[async_trait]
impl<A: SchemaApi> ConnectionObserver for SchemaExplorer<A> {
    async fn on_connected(&self, _connection_id: Option<&str>) {
        self.reset();
        // failures are already surfaced as toasts
        let _ = self.load_databases().await;
    }

    async fn on_disconnected(&self) {
        self.reset();
    }
}
