//! Backing store for domain → tenant mappings
//!
//! SQLite via an r2d2 pool. Schema changes are numbered migrations recorded
//! in `_migrations`.

use crate::error::{Result, TenantSearchError};
use crate::tenant::{normalize_domain, TenantId};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::path::Path;

/// Source of truth for which tenant owns a domain
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Look up an already-normalized domain
    async fn lookup_tenant(&self, domain: &str) -> Result<Option<TenantId>>;
}

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// A registered tenant row
#[derive(Debug, Clone, Serialize)]
pub struct TenantRecord {
    pub tenant_id: TenantId,
    pub domain: String,
    pub created_at: String,
}

/// SQLite-backed domain store
#[derive(Clone)]
pub struct SqliteDomainStore {
    pool: DbPool,
}

impl SqliteDomainStore {
    /// Open (or create) the store at `db_path`
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TenantSearchError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        Self::with_manager(manager, 8)
    }

    /// In-memory store backed by a single shared connection
    pub fn in_memory() -> Result<Self> {
        Self::with_manager(SqliteConnectionManager::memory(), 1)
    }

    fn with_manager(manager: SqliteConnectionManager, max_size: u32) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| {
                TenantSearchError::DomainStore(format!("Failed to create connection pool: {}", e))
            })?;

        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| TenantSearchError::DomainStore(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying tenant store migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Register (or re-point) a domain to a tenant. The domain is normalized first.
    pub fn register(&self, domain: &str, tenant_id: &TenantId) -> Result<()> {
        let normalized = normalize_domain(domain);
        if normalized.is_empty() {
            return Err(TenantSearchError::InvalidQuery(format!(
                "Cannot register empty domain: {:?}",
                domain
            )));
        }

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO tenant_domains (domain, tenant_id, created_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(domain) DO UPDATE SET tenant_id = excluded.tenant_id",
            params![normalized, tenant_id.as_str()],
        )?;

        tracing::info!(domain = %normalized, tenant = %tenant_id, "Registered tenant domain");
        Ok(())
    }

    /// All registered domains, ordered by domain
    pub fn list(&self) -> Result<Vec<TenantRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT tenant_id, domain, created_at FROM tenant_domains ORDER BY domain",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TenantRecord {
                tenant_id: TenantId::new(row.get::<_, String>(0)?),
                domain: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn lookup_blocking(&self, domain: &str) -> Result<Option<TenantId>> {
        let conn = self.get_conn()?;
        let tenant: Option<String> = conn
            .query_row(
                "SELECT tenant_id FROM tenant_domains WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tenant.map(TenantId::new))
    }
}

#[async_trait]
impl DomainStore for SqliteDomainStore {
    async fn lookup_tenant(&self, domain: &str) -> Result<Option<TenantId>> {
        let store = self.clone();
        let domain = domain.to_string();
        tokio::task::spawn_blocking(move || store.lookup_blocking(&domain))
            .await
            .map_err(|e| TenantSearchError::DomainStore(format!("Lookup task failed: {}", e)))?
    }
}

/// Store migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: domain table
    r#"
    CREATE TABLE tenant_domains (
        domain TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_tenant_domains_tenant ON tenant_domains(tenant_id);
    "#,
];
