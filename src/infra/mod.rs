pub mod db_external;
pub mod demo;
pub mod memory;
pub mod source;
pub mod sql;
pub mod utils;

use anyhow::Context;
use tracing::info;

use crate::config::{Config, WarehouseKind};
use crate::infra::db_external::SqlSource;
use crate::infra::memory::MemorySource;
use crate::infra::source::{BoundsKind, DataSource, SourceError};
use crate::infra::sql::Dialect;
use crate::models::query::{AggregatePoint, AggregateQuery, NumericSummary, Predicate, QueryResult};
use crate::models::schema::{ColumnMeta, TableId};

/// 进程内唯一的数据源，由配置决定是外部数仓还是演示数据
pub enum Warehouse {
    Sql(SqlSource),
    Memory(MemorySource),
}

impl Warehouse {
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let dialect = match config.warehouse {
            WarehouseKind::Demo => {
                info!("使用内置演示数仓");
                return Ok(Self::Memory(demo::higher_ed_warehouse()));
            }
            WarehouseKind::Postgres => Dialect::Postgres,
            WarehouseKind::MySql => Dialect::MySql,
        };
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set")?;
        let source = SqlSource::connect(dialect, url, config.max_connections)
            .await
            .with_context(|| format!("failed to connect to {:?} warehouse", dialect))?;
        Ok(Self::Sql(source))
    }
}

impl DataSource for Warehouse {
    async fn list_schemas(&self) -> Result<Vec<String>, SourceError> {
        match self {
            Self::Sql(s) => s.list_schemas().await,
            Self::Memory(m) => m.list_schemas().await,
        }
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, SourceError> {
        match self {
            Self::Sql(s) => s.list_tables(schema).await,
            Self::Memory(m) => m.list_tables(schema).await,
        }
    }

    async fn describe_columns(&self, table: &TableId) -> Result<Vec<ColumnMeta>, SourceError> {
        match self {
            Self::Sql(s) => s.describe_columns(table).await,
            Self::Memory(m) => m.describe_columns(table).await,
        }
    }

    async fn distinct_values(
        &self,
        table: &TableId,
        column: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<String>, SourceError> {
        match self {
            Self::Sql(s) => s.distinct_values(table, column, predicate, limit).await,
            Self::Memory(m) => m.distinct_values(table, column, predicate, limit).await,
        }
    }

    async fn column_bounds(
        &self,
        table: &TableId,
        column: &str,
        kind: BoundsKind,
    ) -> Result<Option<(String, String)>, SourceError> {
        match self {
            Self::Sql(s) => s.column_bounds(table, column, kind).await,
            Self::Memory(m) => m.column_bounds(table, column, kind).await,
        }
    }

    async fn fetch_rows(
        &self,
        table: &TableId,
        columns: &[String],
        predicate: &Predicate,
        limit: Option<usize>,
    ) -> Result<QueryResult, SourceError> {
        match self {
            Self::Sql(s) => s.fetch_rows(table, columns, predicate, limit).await,
            Self::Memory(m) => m.fetch_rows(table, columns, predicate, limit).await,
        }
    }

    async fn count_rows(&self, table: &TableId, predicate: &Predicate) -> Result<u64, SourceError> {
        match self {
            Self::Sql(s) => s.count_rows(table, predicate).await,
            Self::Memory(m) => m.count_rows(table, predicate).await,
        }
    }

    async fn fetch_aggregate(
        &self,
        table: &TableId,
        predicate: &Predicate,
        query: &AggregateQuery,
    ) -> Result<Vec<AggregatePoint>, SourceError> {
        match self {
            Self::Sql(s) => s.fetch_aggregate(table, predicate, query).await,
            Self::Memory(m) => m.fetch_aggregate(table, predicate, query).await,
        }
    }

    async fn fetch_summary(
        &self,
        table: &TableId,
        predicate: &Predicate,
        column: &str,
    ) -> Result<NumericSummary, SourceError> {
        match self {
            Self::Sql(s) => s.fetch_summary(table, predicate, column).await,
            Self::Memory(m) => m.fetch_summary(table, predicate, column).await,
        }
    }
}
