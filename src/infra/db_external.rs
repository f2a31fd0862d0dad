use sqlx::mysql::{MySqlArguments, MySqlPoolOptions};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{MySql, Pool, Postgres, Row};
use tracing::{debug, info};

use crate::infra::source::{BoundsKind, DataSource, SourceError};
use crate::infra::sql::{self, BindValue, Dialect, SqlStatement};
use crate::infra::utils::{mysql_row_values, pg_row_values};
use crate::models::query::{AggregatePoint, AggregateQuery, NumericSummary, Predicate, QueryResult};
use crate::models::schema::{ColumnMeta, TableId};

pub enum DynamicPool {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
}

/// 外部数仓 (Postgres / MySQL)，只执行只读查询
pub struct SqlSource {
    pool: DynamicPool,
}

fn pg_query(stmt: &SqlStatement) -> Query<'_, Postgres, PgArguments> {
    stmt.binds.iter().fold(sqlx::query(&stmt.sql), |q, b| match b {
        BindValue::Text(s) => q.bind(s.clone()),
        BindValue::Float(f) => q.bind(*f),
        BindValue::Date(d) => q.bind(*d),
        BindValue::Bool(v) => q.bind(*v),
        BindValue::Int(n) => q.bind(*n),
    })
}

fn mysql_query(stmt: &SqlStatement) -> Query<'_, MySql, MySqlArguments> {
    stmt.binds.iter().fold(sqlx::query(&stmt.sql), |q, b| match b {
        BindValue::Text(s) => q.bind(s.clone()),
        BindValue::Float(f) => q.bind(*f),
        BindValue::Date(d) => q.bind(*d),
        BindValue::Bool(v) => q.bind(*v),
        BindValue::Int(n) => q.bind(*n),
    })
}

impl SqlSource {
    pub async fn connect(dialect: Dialect, url: &str, max_connections: u32) -> Result<Self, SourceError> {
        let pool = match dialect {
            Dialect::Postgres => {
                let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
                DynamicPool::Postgres(pool)
            }
            Dialect::MySql => {
                let pool = MySqlPoolOptions::new().max_connections(max_connections).connect(url).await?;
                DynamicPool::MySql(pool)
            }
        };
        info!("数仓连接池已建立: dialect={:?}, max_connections={}", dialect, max_connections);
        Ok(Self { pool })
    }

    pub fn dialect(&self) -> Dialect {
        match &self.pool {
            DynamicPool::Postgres(_) => Dialect::Postgres,
            DynamicPool::MySql(_) => Dialect::MySql,
        }
    }

    /// 读取结果第一列的全部字符串
    async fn fetch_strings(&self, stmt: SqlStatement) -> Result<Vec<String>, SourceError> {
        debug!("SQL: {}", stmt.sql);
        let values = match &self.pool {
            DynamicPool::Postgres(p) => pg_query(&stmt)
                .fetch_all(p)
                .await?
                .into_iter()
                .filter_map(|r| r.try_get::<String, _>(0).ok())
                .collect(),
            DynamicPool::MySql(p) => mysql_query(&stmt)
                .fetch_all(p)
                .await?
                .into_iter()
                .filter_map(|r| r.try_get::<String, _>(0).ok())
                .collect(),
        };
        Ok(values)
    }
}

impl DataSource for SqlSource {
    async fn list_schemas(&self) -> Result<Vec<String>, SourceError> {
        self.fetch_strings(sql::list_schemas(self.dialect())).await
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, SourceError> {
        self.fetch_strings(sql::list_tables(self.dialect(), schema)).await
    }

    async fn describe_columns(&self, table: &TableId) -> Result<Vec<ColumnMeta>, SourceError> {
        let stmt = sql::describe_columns(self.dialect(), table);
        debug!("SQL: {}", stmt.sql);
        let columns = match &self.pool {
            DynamicPool::Postgres(p) => pg_query(&stmt)
                .fetch_all(p)
                .await?
                .iter()
                .map(|r| -> Result<ColumnMeta, sqlx::Error> {
                    Ok(ColumnMeta {
                        name: r.try_get(0)?,
                        data_type: r.try_get(1)?,
                        nullable: r.try_get::<String, _>(2)?.eq_ignore_ascii_case("YES"),
                        ordinal: r.try_get::<i64, _>(3)?.try_into().unwrap_or(u32::MAX),
                        is_key: r.try_get(4)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            DynamicPool::MySql(p) => mysql_query(&stmt)
                .fetch_all(p)
                .await?
                .iter()
                .map(|r| -> Result<ColumnMeta, sqlx::Error> {
                    Ok(ColumnMeta {
                        name: r.try_get(0)?,
                        data_type: r.try_get(1)?,
                        nullable: r.try_get::<String, _>(2)?.eq_ignore_ascii_case("YES"),
                        ordinal: r.try_get::<i64, _>(3)?.try_into().unwrap_or(u32::MAX),
                        is_key: r.try_get::<i64, _>(4)? != 0,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(columns)
    }

    async fn distinct_values(
        &self,
        table: &TableId,
        column: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<String>, SourceError> {
        self.fetch_strings(sql::select_distinct(self.dialect(), table, column, predicate, limit))
            .await
    }

    async fn column_bounds(
        &self,
        table: &TableId,
        column: &str,
        kind: BoundsKind,
    ) -> Result<Option<(String, String)>, SourceError> {
        let stmt = sql::select_bounds(self.dialect(), table, column, kind);
        debug!("SQL: {}", stmt.sql);
        let (lo, hi): (Option<String>, Option<String>) = match &self.pool {
            DynamicPool::Postgres(p) => {
                let row = pg_query(&stmt).fetch_one(p).await?;
                (row.try_get(0)?, row.try_get(1)?)
            }
            DynamicPool::MySql(p) => {
                let row = mysql_query(&stmt).fetch_one(p).await?;
                (row.try_get(0)?, row.try_get(1)?)
            }
        };
        Ok(lo.zip(hi))
    }

    async fn fetch_rows(
        &self,
        table: &TableId,
        columns: &[String],
        predicate: &Predicate,
        limit: Option<usize>,
    ) -> Result<QueryResult, SourceError> {
        let stmt = sql::select_rows(self.dialect(), table, columns, predicate, limit);
        debug!("SQL: {} ({} binds)", stmt.sql, stmt.binds.len());
        let rows = match &self.pool {
            DynamicPool::Postgres(p) => pg_query(&stmt)
                .fetch_all(p)
                .await?
                .iter()
                .map(pg_row_values)
                .collect(),
            DynamicPool::MySql(p) => mysql_query(&stmt)
                .fetch_all(p)
                .await?
                .iter()
                .map(mysql_row_values)
                .collect(),
        };
        Ok(QueryResult {
            columns: columns.to_vec(),
            rows,
        })
    }

    async fn count_rows(&self, table: &TableId, predicate: &Predicate) -> Result<u64, SourceError> {
        let stmt = sql::count_rows(self.dialect(), table, predicate);
        debug!("SQL: {}", stmt.sql);
        let count: i64 = match &self.pool {
            DynamicPool::Postgres(p) => pg_query(&stmt).fetch_one(p).await?.try_get(0)?,
            DynamicPool::MySql(p) => mysql_query(&stmt).fetch_one(p).await?.try_get(0)?,
        };
        Ok(count.max(0) as u64)
    }

    async fn fetch_aggregate(
        &self,
        table: &TableId,
        predicate: &Predicate,
        query: &AggregateQuery,
    ) -> Result<Vec<AggregatePoint>, SourceError> {
        let stmt = sql::select_aggregate(self.dialect(), table, predicate, query);
        debug!("SQL: {}", stmt.sql);
        let pairs: Vec<(Option<String>, Option<f64>)> = match &self.pool {
            DynamicPool::Postgres(p) => pg_query(&stmt)
                .fetch_all(p)
                .await?
                .iter()
                .map(|r| -> Result<(Option<String>, Option<f64>), sqlx::Error> {
                    Ok((r.try_get(0)?, r.try_get(1)?))
                })
                .collect::<Result<_, sqlx::Error>>()?,
            DynamicPool::MySql(p) => mysql_query(&stmt)
                .fetch_all(p)
                .await?
                .iter()
                .map(|r| -> Result<(Option<String>, Option<f64>), sqlx::Error> {
                    Ok((r.try_get(0)?, r.try_get(1)?))
                })
                .collect::<Result<_, sqlx::Error>>()?,
        };
        Ok(pairs
            .into_iter()
            .map(|(label, value)| AggregatePoint {
                label: label.unwrap_or_default(),
                value,
            })
            .collect())
    }

    async fn fetch_summary(
        &self,
        table: &TableId,
        predicate: &Predicate,
        column: &str,
    ) -> Result<NumericSummary, SourceError> {
        let stmt = sql::select_summary(self.dialect(), table, predicate, column);
        debug!("SQL: {}", stmt.sql);
        let (count, mean, std_dev, min, max): (i64, Option<f64>, Option<f64>, Option<f64>, Option<f64>) =
            match &self.pool {
                DynamicPool::Postgres(p) => {
                    let r = pg_query(&stmt).fetch_one(p).await?;
                    (r.try_get(0)?, r.try_get(1)?, r.try_get(2)?, r.try_get(3)?, r.try_get(4)?)
                }
                DynamicPool::MySql(p) => {
                    let r = mysql_query(&stmt).fetch_one(p).await?;
                    (r.try_get(0)?, r.try_get(1)?, r.try_get(2)?, r.try_get(3)?, r.try_get(4)?)
                }
            };
        Ok(NumericSummary {
            column: column.to_string(),
            count: count.max(0) as u64,
            mean,
            std_dev,
            min,
            max,
        })
    }
}
