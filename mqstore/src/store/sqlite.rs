use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};

use mqstore_utils::{format_datetime, parse_datetime};

use super::Store;
use crate::error::MqstoreError;
use crate::query::{Row, StoreQuery, Window};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS store (
    record_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    source TEXT NOT NULL,
    created TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS store_tenant_source_created ON store (tenant_id, source, created);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open or create the database at `path`, `":memory:"` keeps it in process
    pub fn open(path: &str, max_connections: u32, connection_timeout: Duration) -> Result<Self, MqstoreError> {
        let builder = Pool::builder().connection_timeout(connection_timeout);
        let pool = if path == ":memory:" {
            //Every in-memory connection is its own database, so exactly one is kept alive.
            builder.max_size(1).idle_timeout(None).max_lifetime(None).build(SqliteConnectionManager::memory())?
        } else {
            let manager = SqliteConnectionManager::file(path).with_init(|c| c.busy_timeout(BUSY_TIMEOUT));
            builder.max_size(max_connections.max(1)).build(manager)?
        };
        let store = Self { pool };
        store.init_schema()?;
        log::info!("store opened, path: {}", path);
        Ok(store)
    }

    #[inline]
    pub fn in_memory() -> Result<Self, MqstoreError> {
        Self::open(":memory:", 1, Duration::from_secs(5))
    }

    #[inline]
    pub fn from_settings(cfg: &mqstore_conf::Store) -> Result<Self, MqstoreError> {
        Self::open(&cfg.path, cfg.max_connections, cfg.connection_timeout)
    }

    fn init_schema(&self) -> Result<(), MqstoreError> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    #[inline]
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, MqstoreError> {
        Ok(self.pool.get()?)
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, MqstoreError>
    where
        F: FnOnce(PooledConnection<SqliteConnectionManager>) -> Result<T, MqstoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || f(pool.get()?)).await.map_err(MqstoreError::store)?
    }
}

/// SQL text and bound parameters for `query`. `first_created` is the earliest
/// `created` in the whole store, only needed for [`Window::FirstWithin`].
fn render(query: &StoreQuery, first_created: Option<NaiveDateTime>) -> (String, Vec<Value>) {
    let mut sql = String::from("SELECT record_id, created, value FROM store WHERE tenant_id = ? AND source = ?");
    let mut args = vec![Value::Text(query.tenant_id.clone()), Value::Text(query.source.clone())];

    match &query.window {
        Window::All => {}
        Window::Since(t) => {
            sql.push_str(" AND created >= ?");
            args.push(Value::Text(format_datetime(t)));
        }
        Window::FirstWithin(interval) => {
            if let Some(upper) = first_created.and_then(|first| interval.checked_add(first)) {
                sql.push_str(" AND created <= ?");
                args.push(Value::Text(format_datetime(&upper)));
            }
        }
        Window::Between(from, to) => {
            sql.push_str(" AND created >= ? AND created <= ?");
            args.push(Value::Text(format_datetime(from)));
            args.push(Value::Text(format_datetime(to)));
        }
    }

    sql.push_str(" ORDER BY record_id ");
    sql.push_str(query.order.as_sql());

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        args.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }
    (sql, args)
}

#[async_trait]
impl Store for SqliteStore {
    async fn append(
        &self,
        tenant_id: &str,
        source: &str,
        value: &str,
        observed_at: NaiveDateTime,
    ) -> Result<i64, MqstoreError> {
        let (tenant_id, source, value) = (tenant_id.to_owned(), source.to_owned(), value.to_owned());
        let created = format_datetime(&observed_at);
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO store (tenant_id, source, created, value) VALUES (?1, ?2, ?3, ?4)",
                params![tenant_id, source, created, value],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn select(&self, query: &StoreQuery) -> Result<Vec<Row>, MqstoreError> {
        let query = query.clone();
        self.blocking(move |conn| {
            let first_created = if let Window::FirstWithin(_) = query.window {
                let first: Option<String> =
                    conn.query_row("SELECT MIN(created) FROM store", [], |r| r.get(0)).optional()?.flatten();
                match first {
                    None => return Ok(Vec::new()),
                    Some(s) => Some(parse_datetime(&s).map_err(MqstoreError::store)?),
                }
            } else {
                None
            };

            let (sql, args) = render(&query, first_created);
            log::trace!("select sql: {}, args: {:?}", sql, args);
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args), |r| {
                    Ok(Row { record_id: r.get(0)?, created: r.get(1)?, value: r.get(2)? })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}
