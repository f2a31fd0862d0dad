//! 查询执行: 谓词整体下推到数据源，失败时补上表名与操作名

use tracing::{debug, instrument};

use crate::error::{ExplorerError, Result};
use crate::infra::source::DataSource;
use crate::models::query::{AggregatePoint, AggregateQuery, NumericSummary, Predicate, QueryResult};
use crate::models::schema::{ColumnDescriptor, TableId};

/// `limit = None` 表示取全部行
#[instrument(skip_all, fields(table = %table, clauses = predicate.clauses.len()))]
pub async fn execute<S: DataSource>(
    source: &S,
    table: &TableId,
    columns: &[ColumnDescriptor],
    predicate: &Predicate,
    limit: Option<usize>,
) -> Result<QueryResult> {
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let result = source
        .fetch_rows(table, &names, predicate, limit)
        .await
        .map_err(|e| ExplorerError::query(table, "execute", e))?;
    debug!("返回 {} 行", result.len());
    Ok(result)
}

pub async fn count<S: DataSource>(source: &S, table: &TableId, predicate: &Predicate) -> Result<u64> {
    source
        .count_rows(table, predicate)
        .await
        .map_err(|e| ExplorerError::query(table, "count", e))
}

#[instrument(skip_all, fields(table = %table, group = %query.group_column))]
pub async fn execute_aggregate<S: DataSource>(
    source: &S,
    table: &TableId,
    predicate: &Predicate,
    query: &AggregateQuery,
) -> Result<Vec<AggregatePoint>> {
    let points = source
        .fetch_aggregate(table, predicate, query)
        .await
        .map_err(|e| ExplorerError::query(table, "aggregate", e))?;
    debug!("聚合得到 {} 个分类", points.len());
    Ok(points)
}

/// 过滤后最多 `limit` 个去重值
pub async fn distinct<S: DataSource>(
    source: &S,
    table: &TableId,
    predicate: &Predicate,
    column: &str,
    limit: usize,
) -> Result<Vec<String>> {
    source
        .distinct_values(table, column, predicate, limit)
        .await
        .map_err(|e| ExplorerError::query(table, "distinct", e))
}

pub async fn summarize<S: DataSource>(
    source: &S,
    table: &TableId,
    predicate: &Predicate,
    column: &str,
) -> Result<NumericSummary> {
    source
        .fetch_summary(table, predicate, column)
        .await
        .map_err(|e| ExplorerError::query(table, "summary", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inspector::describe;
    use crate::infra::demo::higher_ed_warehouse;
    use crate::models::query::Test;

    #[tokio::test]
    async fn limit_caps_rows_and_keeps_column_order() {
        let src = higher_ed_warehouse();
        let table = TableId::new("finance", "billing");
        let columns = describe(&src, &table).await.unwrap();

        let rows = execute(&src, &table, &columns, &Predicate::all(), Some(5)).await.unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows.columns[0], "billing_id");

        let all = execute(&src, &table, &columns, &Predicate::all(), None).await.unwrap();
        assert_eq!(all.len(), 40);
    }

    #[tokio::test]
    async fn count_agrees_with_unlimited_execute() {
        let src = higher_ed_warehouse();
        let table = TableId::new("finance", "billing");
        let columns = describe(&src, &table).await.unwrap();
        let predicate = Predicate::all().and(
            "payment_status",
            Test::In {
                values: vec!["Overdue".into(), "Unpaid".into()],
            },
        );
        let rows = execute(&src, &table, &columns, &predicate, None).await.unwrap();
        let n = count(&src, &table, &predicate).await.unwrap();
        assert_eq!(rows.len() as u64, n);
        assert_eq!(n, 20);
    }

    #[tokio::test]
    async fn unknown_column_is_reported_with_context() {
        let src = higher_ed_warehouse();
        let table = TableId::new("finance", "billing");
        let predicate = Predicate::all().and("nope", Test::Equals { value: true });
        let err = count(&src, &table, &predicate).await.unwrap_err();
        match err {
            ExplorerError::QueryExecution { table: t, operation, .. } => {
                assert_eq!(t, table);
                assert_eq!(operation, "count");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
