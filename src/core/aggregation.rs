//! 聚合引擎: 校验分组列 / 度量列后再下推分组查询

use tracing::{debug, instrument};

use crate::core::executor;
use crate::error::{ExplorerError, Result};
use crate::infra::source::DataSource;
use crate::models::filter::FilterSpec;
use crate::models::query::{
    AggregateQuery, AggregateRequest, AggregationResult, ChartCandidates, GroupBucket, MetricFn, Predicate,
};
use crate::models::schema::{ColumnDescriptor, SemanticType, TableId};

/// 分类数超过该值的列不推荐作图
pub const CHART_MAX_CATEGORIES: usize = 15;
/// 未指定 top 时，图表默认展示的分类数
pub const CHART_TOP_N: usize = 10;

fn find<'a>(columns: &'a [ColumnDescriptor], name: &str) -> Result<&'a ColumnDescriptor> {
    columns
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| ExplorerError::InvalidAggregationInput(format!("unknown column `{}`", name)))
}

/// 在发出任何查询之前校验列组合
pub fn plan(columns: &[ColumnDescriptor], request: &AggregateRequest) -> Result<AggregateQuery> {
    let group = find(columns, &request.group_column)?;
    let bucket = match group.category {
        SemanticType::Text | SemanticType::Boolean => GroupBucket::Value,
        SemanticType::Date => GroupBucket::Month,
        SemanticType::Numeric => {
            return Err(ExplorerError::InvalidAggregationInput(format!(
                "group column `{}` is numeric and has no categorical meaning",
                group.name
            )))
        }
    };

    if let Some(metric) = request.metric_column.as_deref() {
        let metric = find(columns, metric)?;
        if metric.category != SemanticType::Numeric {
            return Err(ExplorerError::InvalidAggregationInput(format!(
                "metric column `{}` is not numeric",
                metric.name
            )));
        }
    } else if request.metric_fn != MetricFn::Count {
        return Err(ExplorerError::InvalidAggregationInput(format!(
            "{:?} requires a metric column",
            request.metric_fn
        )));
    }

    if request.top == Some(0) {
        return Err(ExplorerError::InvalidAggregationInput("top must be at least 1".into()));
    }

    Ok(AggregateQuery {
        group_column: group.name.clone(),
        bucket,
        metric_column: request.metric_column.clone(),
        metric_fn: request.metric_fn,
    })
}

#[instrument(skip_all, fields(table = %table, group = %request.group_column))]
pub async fn aggregate<S: DataSource>(
    source: &S,
    table: &TableId,
    columns: &[ColumnDescriptor],
    predicate: &Predicate,
    request: &AggregateRequest,
) -> Result<AggregationResult> {
    let query = plan(columns, request)?;
    let points = executor::execute_aggregate(source, table, predicate, &query).await?;
    let result = AggregationResult::new(&query, points);
    Ok(match request.top {
        // 截断后重新判定状态
        Some(n) => AggregationResult::new(&query, result.top(n).points),
        None => result,
    })
}

/// 分类计数图
pub async fn category_counts<S: DataSource>(
    source: &S,
    table: &TableId,
    columns: &[ColumnDescriptor],
    predicate: &Predicate,
    group_column: &str,
) -> Result<AggregationResult> {
    let request = AggregateRequest {
        top: Some(CHART_TOP_N),
        ..AggregateRequest::count(group_column)
    };
    aggregate(source, table, columns, predicate, &request).await
}

/// 分类 x 数值度量图
pub async fn category_metric<S: DataSource>(
    source: &S,
    table: &TableId,
    columns: &[ColumnDescriptor],
    predicate: &Predicate,
    group_column: &str,
    metric_column: &str,
    metric_fn: MetricFn,
) -> Result<AggregationResult> {
    let request = AggregateRequest::metric(group_column, metric_column, metric_fn);
    aggregate(source, table, columns, predicate, &request).await
}

/// 推荐作图列: 过滤后有 2..=15 个分类的文本 / 布尔筛选列，以及过滤后有非空值的数值列
///
/// 分类数用有界的去重探测 (最多 16 个值) 判定，高基数列不会触发全量分组。
#[instrument(skip_all, fields(table = %table))]
pub async fn suggest_chart_columns<S: DataSource>(
    source: &S,
    table: &TableId,
    columns: &[ColumnDescriptor],
    specs: &[FilterSpec],
    predicate: &Predicate,
) -> Result<ChartCandidates> {
    let mut candidates = ChartCandidates::default();

    for spec in specs {
        if !matches!(spec.column.category, SemanticType::Text | SemanticType::Boolean) {
            continue;
        }
        let groups = executor::distinct(source, table, predicate, spec.name(), CHART_MAX_CATEGORIES + 1)
            .await?
            .len();
        debug!("列 {} 过滤后分类数 {}", spec.name(), groups);
        if (2..=CHART_MAX_CATEGORIES).contains(&groups) {
            candidates.categorical.push(spec.name().to_string());
        }
    }

    for column in columns.iter().filter(|c| c.category == SemanticType::Numeric && !c.is_key) {
        let summary = executor::summarize(source, table, predicate, &column.name).await?;
        if summary.count > 0 {
            candidates.numeric.push(column.name.clone());
        }
    }
    Ok(candidates)
}
