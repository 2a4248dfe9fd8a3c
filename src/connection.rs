//! Connection Registry (spec §3, §4.3). Connections are a tagged union over
//! database types, each with its own attribute record — the "dynamic connection
//! fields by type" redesign called for in spec §9. Grounded on the teacher's
//! `contracts::Storage` async trait shape (`contracts.rs`) for the per-handle
//! operations, and on `mcp/config.rs`'s plain serde config structs for the
//! attribute records.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::types::ConnectionName;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresAttributes {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysqlAttributes {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowflakeAttributes {
    pub account: String,
    pub warehouse: String,
    pub role: Option<String>,
    pub schema: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub response_timeout_millis: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrinoAttributes {
    pub host: String,
    pub port: u16,
    pub catalog: String,
    pub schema: Option<String>,
    #[serde(skip_serializing)]
    pub peaka_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigqueryAttributes {
    pub project_id: String,
    pub billing_project: Option<String>,
    pub location: Option<String>,
    #[serde(skip_serializing)]
    pub service_account_key_json: Option<String>,
    pub maximum_bytes_billed: Option<u64>,
    pub query_timeout_millis: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotherduckAttributes {
    #[serde(skip_serializing)]
    pub access_token: String,
    pub database: Option<String>,
}

/// `duckdb` has no required attributes (spec §4.3, Open Questions).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuckdbAttributes {
    pub database_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Connection {
    Postgres { name: String, attributes: PostgresAttributes },
    Bigquery { name: String, attributes: BigqueryAttributes },
    Snowflake { name: String, attributes: SnowflakeAttributes },
    Trino { name: String, attributes: TrinoAttributes },
    Mysql { name: String, attributes: MysqlAttributes },
    Duckdb { name: String, attributes: DuckdbAttributes },
    Motherduck { name: String, attributes: MotherduckAttributes },
}

impl Connection {
    pub fn name(&self) -> &str {
        match self {
            Connection::Postgres { name, .. }
            | Connection::Bigquery { name, .. }
            | Connection::Snowflake { name, .. }
            | Connection::Trino { name, .. }
            | Connection::Mysql { name, .. }
            | Connection::Duckdb { name, .. }
            | Connection::Motherduck { name, .. } => name,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Connection::Postgres { .. } => "postgres",
            Connection::Bigquery { .. } => "bigquery",
            Connection::Snowflake { .. } => "snowflake",
            Connection::Trino { .. } => "trino",
            Connection::Mysql { .. } => "mysql",
            Connection::Duckdb { .. } => "duckdb",
            Connection::Motherduck { .. } => "motherduck",
        }
    }
}

/// One row of a `queryData` result set: column name to JSON-ish scalar value.
pub type Row = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub row_limit: Option<usize>,
}

/// Per-connection open handle. DuckDB is the one variant this crate actually
/// drives end-to-end (in-process, no external service required); the cloud
/// warehouse variants are real, typed, and routable but their I/O is not
/// vendored in — see DESIGN.md for the explicit scope decision.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    async fn test(&self) -> Result<(), AppError>;
    async fn sql_source(&self, sql: &str) -> Result<Vec<Row>, AppError>;
    async fn table_source(&self, table_key: &str, table_path: &str) -> Result<Vec<Row>, AppError>;
    async fn query_data(&self, sql: &str, options: QueryOptions) -> Result<Vec<Row>, AppError>;
    async fn temporary_table(&self, sql: &str) -> Result<String, AppError>;
}

struct DuckdbHandle {
    path: String,
}

#[async_trait]
impl ConnectionHandle for DuckdbHandle {
    async fn test(&self) -> Result<(), AppError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || open_duckdb(&path).map(|_| ()))
            .await
            .map_err(|e| AppError::connection_error(format!("join error: {e}")))?
    }

    async fn sql_source(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        self.query_data(sql, QueryOptions::default()).await
    }

    async fn table_source(&self, table_key: &str, _table_path: &str) -> Result<Vec<Row>, AppError> {
        let sql = format!("SELECT * FROM {table_key}");
        self.query_data(&sql, QueryOptions::default()).await
    }

    async fn query_data(&self, sql: &str, options: QueryOptions) -> Result<Vec<Row>, AppError> {
        let path = self.path.clone();
        let sql = sql.to_string();
        let rows = tokio::task::spawn_blocking(move || run_duckdb_query(&path, &sql))
            .await
            .map_err(|e| AppError::connection_error(format!("join error: {e}")))??;
        match options.row_limit {
            Some(limit) if rows.len() > limit => Ok(rows.into_iter().take(limit).collect()),
            _ => Ok(rows),
        }
    }

    async fn temporary_table(&self, sql: &str) -> Result<String, AppError> {
        let name = format!("tmp_{}", uuid::Uuid::new_v4().simple());
        let create = format!("CREATE TEMP TABLE {name} AS {sql}");
        self.query_data(&create, QueryOptions::default()).await?;
        Ok(name)
    }
}

fn open_duckdb(path: &str) -> Result<duckdb::Connection, AppError> {
    if path.is_empty() {
        duckdb::Connection::open_in_memory()
    } else {
        duckdb::Connection::open(path)
    }
    .map_err(|e| AppError::connection_error(e.to_string()))
}

fn run_duckdb_query(path: &str, sql: &str) -> Result<Vec<Row>, AppError> {
    let conn = open_duckdb(path)?;
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AppError::connection_error(e.to_string()))?;
    let column_names: Vec<String> = stmt.column_names();
    let rows = stmt
        .query_map([], |row| {
            let mut map = Row::new();
            for (i, col) in column_names.iter().enumerate() {
                let value: duckdb::types::Value = row.get(i)?;
                map.insert(col.clone(), duckdb_value_to_json(value));
            }
            Ok(map)
        })
        .map_err(|e| AppError::connection_error(e.to_string()))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| AppError::connection_error(e.to_string()))?);
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
}

/// Schema + row count for one embedded data file, via DuckDB's native table
/// functions (spec §4.5: `listDatabases` "walks embedded `.parquet`/sqlite/etc.
/// and collects schema+rowCount"). Dispatches on extension; unrecognized
/// extensions are a `ConnectionError` rather than a panic, since this walks
/// whatever a package manifest happens to list.
pub async fn inspect_data_file(path: std::path::PathBuf) -> Result<DatabaseInfo, AppError> {
    tokio::task::spawn_blocking(move || inspect_data_file_blocking(&path))
        .await
        .map_err(|e| AppError::connection_error(format!("join error: {e}")))?
}

fn inspect_data_file_blocking(path: &std::path::Path) -> Result<DatabaseInfo, AppError> {
    let scan = scan_expr(path)?;
    let conn = duckdb::Connection::open_in_memory().map_err(|e| AppError::connection_error(e.to_string()))?;

    let mut describe = conn
        .prepare(&format!("DESCRIBE SELECT * FROM {scan}"))
        .map_err(|e| AppError::connection_error(e.to_string()))?;
    let columns = describe
        .query_map([], |row| {
            let name: String = row.get(0)?;
            let type_name: String = row.get(1)?;
            Ok(ColumnInfo { name, type_name })
        })
        .map_err(|e| AppError::connection_error(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::connection_error(e.to_string()))?;

    let row_count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {scan}"), [], |row| row.get(0))
        .map_err(|e| AppError::connection_error(e.to_string()))?;

    Ok(DatabaseInfo { row_count, columns })
}

/// DuckDB table-function call for one embedded file, keyed by extension.
/// `sqlite` files need the `sqlite_scanner` extension, which this build does
/// not bundle; they surface as a clear `ConnectionError` rather than silently
/// reporting an empty schema.
fn scan_expr(path: &std::path::Path) -> Result<String, AppError> {
    let path_str = path.to_string_lossy().replace('\'', "''");
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => Ok(format!("read_parquet('{path_str}')")),
        Some("csv") => Ok(format!("read_csv_auto('{path_str}')")),
        Some("json") | Some("jsonl") | Some("ndjson") => Ok(format!("read_json_auto('{path_str}')")),
        other => Err(AppError::connection_error(format!(
            "cannot inspect schema for data file with extension {other:?}: {}",
            path.display()
        ))),
    }
}

fn duckdb_value_to_json(value: duckdb::types::Value) -> serde_json::Value {
    use duckdb::types::Value as V;
    match value {
        V::Null => serde_json::Value::Null,
        V::Boolean(b) => serde_json::Value::Bool(b),
        V::TinyInt(i) => serde_json::json!(i),
        V::SmallInt(i) => serde_json::json!(i),
        V::Int(i) => serde_json::json!(i),
        V::BigInt(i) => serde_json::json!(i),
        V::Float(f) => serde_json::json!(f),
        V::Double(f) => serde_json::json!(f),
        V::Text(s) => serde_json::Value::String(s),
        other => serde_json::Value::String(format!("{other:?}")),
    }
}

/// A variant whose I/O is declared but not compiled in (spec Open Questions:
/// keep the typed attribute schema real, surface a clear error on use).
struct UnsupportedHandle {
    type_name: &'static str,
}

#[async_trait]
impl ConnectionHandle for UnsupportedHandle {
    async fn test(&self) -> Result<(), AppError> {
        Err(self.error())
    }
    async fn sql_source(&self, _sql: &str) -> Result<Vec<Row>, AppError> {
        Err(self.error())
    }
    async fn table_source(&self, _table_key: &str, _table_path: &str) -> Result<Vec<Row>, AppError> {
        Err(self.error())
    }
    async fn query_data(&self, _sql: &str, _options: QueryOptions) -> Result<Vec<Row>, AppError> {
        Err(self.error())
    }
    async fn temporary_table(&self, _sql: &str) -> Result<String, AppError> {
        Err(self.error())
    }
}

impl UnsupportedHandle {
    fn error(&self) -> AppError {
        AppError::connection_error(format!(
            "{} driver is not compiled into this server",
            self.type_name
        ))
    }
}

fn open_handle(connection: &Connection) -> Arc<dyn ConnectionHandle> {
    match connection {
        Connection::Duckdb { attributes, .. } => Arc::new(DuckdbHandle {
            path: attributes.database_path.clone().unwrap_or_default(),
        }),
        other => Arc::new(UnsupportedHandle {
            type_name: other.type_name(),
        }),
    }
}

/// Per-project connection map. Handles are opened lazily on first use and
/// shared thereafter, guarded by a mutex per spec §5 ("registry guards
/// open/close with a mutex").
pub struct ConnectionRegistry {
    definitions: HashMap<String, Connection>,
    handles: Mutex<HashMap<String, Arc<dyn ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new(connections: Vec<Connection>) -> Self {
        let definitions = connections
            .into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();
        Self {
            definitions,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn list(&self) -> Vec<&Connection> {
        self.definitions.values().collect()
    }

    pub fn get(&self, name: &str) -> Result<&Connection, AppError> {
        self.definitions
            .get(name)
            .ok_or_else(|| AppError::connection_not_found(name))
    }

    async fn handle(&self, name: &str) -> Result<Arc<dyn ConnectionHandle>, AppError> {
        let definition = self.get(name)?;
        let mut handles = self.handles.lock().await;
        if let Some(existing) = handles.get(name) {
            return Ok(existing.clone());
        }
        let handle = open_handle(definition);
        handles.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn test(&self, name: &str) -> Result<(), AppError> {
        self.handle(name).await?.test().await
    }

    pub async fn sql_source(&self, name: &str, sql: &str) -> Result<Vec<Row>, AppError> {
        self.handle(name).await?.sql_source(sql).await
    }

    pub async fn table_source(
        &self,
        name: &str,
        table_key: &str,
        table_path: &str,
    ) -> Result<Vec<Row>, AppError> {
        self.handle(name).await?.table_source(table_key, table_path).await
    }

    pub async fn query_data(
        &self,
        name: ConnectionNameRef<'_>,
        sql: &str,
        options: QueryOptions,
    ) -> Result<Vec<Row>, AppError> {
        self.handle(name.0).await?.query_data(sql, options).await
    }

    pub async fn temporary_table(&self, name: &str, sql: &str) -> Result<String, AppError> {
        self.handle(name).await?.temporary_table(sql).await
    }

    /// Drop all cached handles, e.g. on project reload/delete.
    pub async fn close_all(&self) {
        self.handles.lock().await.clear();
    }
}

/// Thin wrapper so `query_data` can accept either a borrowed `str` or a
/// `&ConnectionName` without an extra trait bound at call sites.
pub struct ConnectionNameRef<'a>(pub &'a str);

impl<'a> From<&'a ConnectionName> for ConnectionNameRef<'a> {
    fn from(value: &'a ConnectionName) -> Self {
        ConnectionNameRef(value.as_str())
    }
}

impl<'a> From<&'a str> for ConnectionNameRef<'a> {
    fn from(value: &'a str) -> Self {
        ConnectionNameRef(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duckdb_conn(name: &str) -> Connection {
        Connection::Duckdb {
            name: name.to_string(),
            attributes: DuckdbAttributes::default(),
        }
    }

    #[tokio::test]
    async fn unknown_connection_is_not_found() {
        let registry = ConnectionRegistry::new(vec![]);
        let err = registry.test("missing").await.unwrap_err();
        assert!(matches!(err.kind, crate::error::Kind::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn duckdb_in_memory_roundtrips_a_query() {
        let registry = ConnectionRegistry::new(vec![duckdb_conn("mem")]);
        let rows = registry
            .query_data(ConnectionNameRef("mem"), "SELECT 1 AS one", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("one").unwrap(), &serde_json::json!(1));
    }

    #[tokio::test]
    async fn unsupported_driver_returns_connection_error() {
        let registry = ConnectionRegistry::new(vec![Connection::Snowflake {
            name: "sf".to_string(),
            attributes: SnowflakeAttributes {
                account: "acct".to_string(),
                warehouse: "wh".to_string(),
                role: None,
                schema: None,
                password: None,
                response_timeout_millis: None,
            },
        }]);
        let err = registry.test("sf").await.unwrap_err();
        assert!(matches!(err.kind, crate::error::Kind::ConnectionError(_)));
    }

    #[tokio::test]
    async fn inspect_parquet_reports_schema_and_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flights.parquet");
        let path_str = path.to_str().unwrap().to_string();
        tokio::task::spawn_blocking(move || {
            let conn = duckdb::Connection::open_in_memory().unwrap();
            conn.execute(
                &format!("COPY (SELECT 1 AS id, 'AA' AS carrier) TO '{path_str}' (FORMAT PARQUET)"),
                [],
            )
            .unwrap();
        })
        .await
        .unwrap();

        let info = inspect_data_file(path).await.unwrap();
        assert_eq!(info.row_count, 1);
        assert_eq!(info.columns.len(), 2);
        assert_eq!(info.columns[0].name, "id");
    }

    #[tokio::test]
    async fn inspect_unsupported_extension_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.sqlite");
        std::fs::write(&path, b"not a real sqlite file").unwrap();
        let err = inspect_data_file(path).await.unwrap_err();
        assert!(matches!(err.kind, crate::error::Kind::ConnectionError(_)));
    }
}
