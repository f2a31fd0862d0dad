use std::future::Future;
use thiserror::Error;

use crate::models::query::{AggregatePoint, AggregateQuery, NumericSummary, Predicate, QueryResult};
use crate::models::schema::{ColumnMeta, TableId};

/// 数据源层的原始错误，由上层包装成带上下文的 `ExplorerError`
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("column {column} cannot be read as {expected}: {detail}")]
    Coercion {
        column: String,
        expected: &'static str,
        detail: String,
    },

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("unknown table: {0}")]
    UnknownTable(TableId),
}

/// 边界探测的目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsKind {
    Numeric,
    Date,
}

/// 只读数仓抽象。所有过滤与聚合都在数据源侧执行
///
/// 不存在的 schema / 表在元数据查询中返回空列表 (与 information_schema 一致)，
/// 由上层区分 "schema 不存在" 与 "表不存在"。
pub trait DataSource: Send + Sync {
    fn list_schemas(&self) -> impl Future<Output = Result<Vec<String>, SourceError>> + Send;

    /// 只列出基础表
    fn list_tables(
        &self,
        schema: &str,
    ) -> impl Future<Output = Result<Vec<String>, SourceError>> + Send;

    /// 按声明顺序返回列
    fn describe_columns(
        &self,
        table: &TableId,
    ) -> impl Future<Output = Result<Vec<ColumnMeta>, SourceError>> + Send;

    /// 有界的去重探测: 满足谓词的行中最多返回 `limit` 个非空值的文本形式，按文本排序
    fn distinct_values(
        &self,
        table: &TableId,
        column: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<String>, SourceError>> + Send;

    /// 非空值的最小 / 最大值文本；全为空时返回 `None`
    fn column_bounds(
        &self,
        table: &TableId,
        column: &str,
        kind: BoundsKind,
    ) -> impl Future<Output = Result<Option<(String, String)>, SourceError>> + Send;

    fn fetch_rows(
        &self,
        table: &TableId,
        columns: &[String],
        predicate: &Predicate,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<QueryResult, SourceError>> + Send;

    fn count_rows(
        &self,
        table: &TableId,
        predicate: &Predicate,
    ) -> impl Future<Output = Result<u64, SourceError>> + Send;

    /// 空分组不参与聚合；结果按分类标签升序
    fn fetch_aggregate(
        &self,
        table: &TableId,
        predicate: &Predicate,
        query: &AggregateQuery,
    ) -> impl Future<Output = Result<Vec<AggregatePoint>, SourceError>> + Send;

    fn fetch_summary(
        &self,
        table: &TableId,
        predicate: &Predicate,
        column: &str,
    ) -> impl Future<Output = Result<NumericSummary, SourceError>> + Send;
}
