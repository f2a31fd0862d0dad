//! 探索会话: 一个会话只持有一张当前表及其筛选状态，会话之间互不共享
//!
//! 换表时整体丢弃旧的列描述、控件、筛选状态和结果缓存；同一筛选状态下的
//! 重复查询直接复用缓存，筛选一旦变化缓存即失效。

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::core::{aggregation, composer, executor, export, inspector, widgets};
use crate::core::export::ExportArtifact;
use crate::core::widgets::FilterPolicy;
use crate::error::{ExplorerError, Result};
use crate::infra::source::DataSource;
use crate::models::filter::{FilterSpec, FilterState, Selection};
use crate::models::query::{
    AggregateRequest, AggregationResult, ChartCandidates, NumericSummary, Predicate, QueryResult, RowCounts,
};
use crate::models::schema::{ColumnDescriptor, SemanticType, TableId};

struct TableSelection {
    table: TableId,
    columns: Vec<ColumnDescriptor>,
    specs: Vec<FilterSpec>,
    state: FilterState,
    predicate: Predicate,
    /// 只缓存有上限的结果；全量结果 (`all` / 导出) 每次现取
    rows: HashMap<usize, Arc<QueryResult>>,
    filtered: Option<u64>,
    total: Option<u64>,
    aggregates: HashMap<AggregateRequest, AggregationResult>,
}

impl TableSelection {
    fn invalidate(&mut self) {
        self.rows.clear();
        self.filtered = None;
        self.aggregates.clear();
    }

    fn spec(&self, column: &str) -> Result<&FilterSpec> {
        self.specs
            .iter()
            .find(|s| s.name() == column)
            .ok_or_else(|| ExplorerError::InvalidFilter {
                column: column.to_string(),
                reason: format!("not a filterable column of {}", self.table),
            })
    }

    /// 重新组合谓词；谓词变化时结果缓存失效
    fn recompose(&mut self) {
        let predicate = composer::compose(&self.specs, &self.state);
        if predicate != self.predicate {
            debug!("谓词变化: {} 个子条件", predicate.clauses.len());
            self.predicate = predicate;
            self.invalidate();
        }
    }
}

/// 当前表的控件面板 (列、控件、当前选择)
#[derive(Debug, Serialize)]
pub struct FilterPanel<'a> {
    pub table: &'a TableId,
    pub columns: &'a [ColumnDescriptor],
    pub filters: &'a [FilterSpec],
    pub state: &'a FilterState,
}

pub struct ExplorerSession {
    id: Uuid,
    policy: FilterPolicy,
    current: Option<TableSelection>,
}

fn invalid(column: &str, reason: impl Into<String>) -> ExplorerError {
    ExplorerError::InvalidFilter {
        column: column.to_string(),
        reason: reason.into(),
    }
}

impl ExplorerSession {
    pub fn new(policy: FilterPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            policy,
            current: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn table(&self) -> Option<&TableId> {
        self.current.as_ref().map(|c| &c.table)
    }

    fn selection(&self) -> Result<&TableSelection> {
        self.current.as_ref().ok_or(ExplorerError::NoTableSelected)
    }

    fn selection_mut(&mut self) -> Result<&mut TableSelection> {
        self.current.as_mut().ok_or(ExplorerError::NoTableSelected)
    }

    pub fn panel(&self) -> Result<FilterPanel<'_>> {
        let sel = self.selection()?;
        Ok(FilterPanel {
            table: &sel.table,
            columns: &sel.columns,
            filters: &sel.specs,
            state: &sel.state,
        })
    }

    pub fn predicate(&self) -> Result<&Predicate> {
        Ok(&self.selection()?.predicate)
    }

    /// 选表: 先丢弃旧表的一切状态，再读取元数据并生成控件
    #[instrument(skip_all, fields(session = %self.id, table = %table))]
    pub async fn select_table<S: DataSource>(&mut self, source: &S, table: TableId) -> Result<FilterPanel<'_>> {
        self.current = None;
        let columns = inspector::describe(source, &table).await?;
        let specs = widgets::build_specs(source, &table, &columns, &self.policy).await;
        info!("已选择表 {}: {} 列, {} 个筛选", table, columns.len(), specs.len());
        self.current = Some(TableSelection {
            table,
            columns,
            specs,
            state: FilterState::new(),
            predicate: Predicate::all(),
            rows: HashMap::new(),
            filtered: None,
            total: None,
            aggregates: HashMap::new(),
        });
        self.panel()
    }

    /// 设置某列的筛选；空选择等价于清除
    #[instrument(skip_all, fields(session = %self.id, column = %column))]
    pub fn set_filter(&mut self, column: &str, selection: Selection) -> Result<()> {
        let sel = self.selection_mut()?;
        let spec = sel.spec(column)?;
        if selection.is_empty() {
            sel.state.clear(column);
            sel.recompose();
            return Ok(());
        }
        if !selection.fits(spec.widget) {
            return Err(invalid(column, format!("selection does not fit a {:?} filter", spec.widget)));
        }
        match &selection {
            Selection::Range { min, max } if !(min <= max) => {
                return Err(invalid(column, format!("range {}..{} is empty", min, max)));
            }
            Selection::DateRange { start, end } if start > end => {
                return Err(invalid(column, format!("date range {}..{} is empty", start, end)));
            }
            _ => {}
        }
        sel.state.set(column, selection);
        sel.recompose();
        Ok(())
    }

    pub fn clear_filter(&mut self, column: &str) -> Result<bool> {
        let sel = self.selection_mut()?;
        sel.spec(column)?;
        let removed = sel.state.clear(column);
        sel.recompose();
        Ok(removed)
    }

    pub fn clear_filters(&mut self) -> Result<()> {
        let sel = self.selection_mut()?;
        sel.state.clear_all();
        sel.recompose();
        Ok(())
    }

    /// 丢弃缓存，下一次读取重新查询
    pub fn refresh(&mut self) -> Result<()> {
        let sel = self.selection_mut()?;
        sel.invalidate();
        sel.total = None;
        Ok(())
    }

    /// `limit = None` 表示全部行
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn rows<S: DataSource>(&mut self, source: &S, limit: Option<usize>) -> Result<Arc<QueryResult>> {
        let sel = self.selection_mut()?;
        if let Some(cached) = limit.and_then(|n| sel.rows.get(&n)) {
            debug!("行缓存命中: limit={:?}", limit);
            return Ok(Arc::clone(cached));
        }
        let result = Arc::new(executor::execute(source, &sel.table, &sel.columns, &sel.predicate, limit).await?);
        if let Some(n) = limit {
            sel.rows.insert(n, Arc::clone(&result));
        }
        Ok(result)
    }

    pub async fn row_counts<S: DataSource>(&mut self, source: &S) -> Result<RowCounts> {
        let sel = self.selection_mut()?;
        let total = match sel.total {
            Some(n) => n,
            None => {
                let n = executor::count(source, &sel.table, &Predicate::all()).await?;
                sel.total = Some(n);
                n
            }
        };
        let filtered = match sel.filtered {
            Some(n) => n,
            None if sel.predicate.is_universal() => total,
            None => executor::count(source, &sel.table, &sel.predicate).await?,
        };
        sel.filtered = Some(filtered);
        Ok(RowCounts { filtered, total })
    }

    #[instrument(skip_all, fields(session = %self.id, group = %request.group_column))]
    pub async fn aggregate<S: DataSource>(
        &mut self,
        source: &S,
        request: AggregateRequest,
    ) -> Result<AggregationResult> {
        let sel = self.selection_mut()?;
        if let Some(cached) = sel.aggregates.get(&request) {
            return Ok(cached.clone());
        }
        let result = aggregation::aggregate(source, &sel.table, &sel.columns, &sel.predicate, &request).await?;
        sel.aggregates.insert(request, result.clone());
        Ok(result)
    }

    /// 数值列统计；未指定列时统计全部非主键数值列
    pub async fn summary<S: DataSource>(&self, source: &S, columns: &[String]) -> Result<Vec<NumericSummary>> {
        let sel = self.selection()?;
        let targets: Vec<&ColumnDescriptor> = if columns.is_empty() {
            sel.columns
                .iter()
                .filter(|c| c.category == SemanticType::Numeric && !c.is_key)
                .collect()
        } else {
            columns
                .iter()
                .map(|name| {
                    sel.columns
                        .iter()
                        .find(|c| &c.name == name && c.category == SemanticType::Numeric)
                        .ok_or_else(|| {
                            ExplorerError::InvalidAggregationInput(format!("`{}` is not a numeric column", name))
                        })
                })
                .collect::<Result<_>>()?
        };

        let mut summaries = Vec::with_capacity(targets.len());
        for column in targets {
            summaries.push(executor::summarize(source, &sel.table, &sel.predicate, &column.name).await?);
        }
        Ok(summaries)
    }

    pub async fn chart_candidates<S: DataSource>(&self, source: &S) -> Result<ChartCandidates> {
        let sel = self.selection()?;
        aggregation::suggest_chart_columns(source, &sel.table, &sel.columns, &sel.specs, &sel.predicate).await
    }

    /// 导出当前过滤结果的全部行
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn export<S: DataSource>(&mut self, source: &S) -> Result<ExportArtifact> {
        let rows = self.rows(source, None).await?;
        let table = &self.selection()?.table;
        export::export(table, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::demo::{higher_ed_warehouse, FINANCIAL_AID_COUNT, STUDENT_COUNT};
    use crate::infra::memory::MemorySource;
    use crate::models::filter::WidgetKind;
    use crate::models::query::{ChartStatus, MetricFn};

    async fn session_on(src: &MemorySource, schema: &str, table: &str) -> ExplorerSession {
        let mut session = ExplorerSession::new(FilterPolicy::default());
        session.select_table(src, TableId::new(schema, table)).await.unwrap();
        session
    }

    fn values(vs: &[&str]) -> Selection {
        Selection::Values {
            values: vs.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn disbursed_aid_only() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "finance", "financial_aid").await;

        let all = session.rows(&src, None).await.unwrap();
        assert_eq!(all.len(), FINANCIAL_AID_COUNT);

        session.set_filter("status", values(&["Disbursed"])).unwrap();
        let rows = session.rows(&src, None).await.unwrap();
        assert!(!rows.is_empty());
        assert!(rows.column_values("status").all(|v| v == "Disbursed"));

        let artifact = session.export(&src).await.unwrap();
        assert_eq!(artifact.filename, "finance_financial_aid_export.csv");
        let text = String::from_utf8(artifact.bytes).unwrap();
        assert_eq!(text.lines().count(), rows.len() + 1);
    }

    #[tokio::test]
    async fn gpa_range_excludes_nulls() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "student", "sis").await;
        session.set_filter("gpa", Selection::Range { min: 3.5, max: 4.0 }).unwrap();

        let rows = session.rows(&src, None).await.unwrap();
        assert!(!rows.is_empty());
        for v in rows.column_values("gpa") {
            let gpa = v.as_f64().expect("null gpa leaked through the range filter");
            assert!((3.5..=4.0).contains(&gpa));
        }

        let counts = session.row_counts(&src).await.unwrap();
        assert_eq!(counts.filtered, rows.len() as u64);
        assert_eq!(counts.total, STUDENT_COUNT as u64);
    }

    #[tokio::test]
    async fn average_gpa_by_department_without_filters() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "student", "sis").await;
        let result = session
            .aggregate(&src, AggregateRequest::metric("department", "gpa", MetricFn::Avg))
            .await
            .unwrap();
        assert_eq!(result.points.len(), 6);
        assert_eq!(result.status, ChartStatus::Ready);
        assert!(result.points.iter().all(|p| p.value.is_some()));
    }

    #[tokio::test]
    async fn switching_tables_resets_filters() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "finance", "billing").await;
        session.set_filter("payment_status", values(&["Overdue"])).unwrap();
        assert_eq!(session.row_counts(&src).await.unwrap().filtered, 10);

        session
            .select_table(&src, TableId::new("student", "address"))
            .await
            .unwrap();
        let panel = session.panel().unwrap();
        assert!(panel.state.is_empty());
        assert!(panel.filters.iter().all(|s| s.name() != "payment_status"));
        assert!(session.predicate().unwrap().is_universal());
        assert_eq!(session.rows(&src, None).await.unwrap().len(), STUDENT_COUNT);

        let err = session.set_filter("payment_status", values(&["Overdue"])).unwrap_err();
        assert!(matches!(err, ExplorerError::InvalidFilter { .. }));
    }

    #[tokio::test]
    async fn failed_selection_leaves_no_table() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "finance", "billing").await;
        assert!(session.select_table(&src, TableId::new("finance", "ledger")).await.is_err());
        assert!(session.table().is_none());
    }

    #[tokio::test]
    async fn narrowing_never_adds_rows() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "student", "sis").await;
        let mut last = session.row_counts(&src).await.unwrap().filtered;

        let steps = [
            ("department", values(&["Biology", "History", "Mathematics"])),
            ("department", values(&["Biology", "History"])),
            ("gpa", Selection::Range { min: 2.5, max: 4.0 }),
            ("gpa", Selection::Range { min: 3.0, max: 3.8 }),
            ("is_full_time", Selection::Flag { value: true }),
        ];
        for (column, selection) in steps {
            session.set_filter(column, selection).unwrap();
            let now = session.row_counts(&src).await.unwrap().filtered;
            assert!(now <= last, "{} widened the result: {} > {}", column, now, last);
            last = now;
        }
    }

    #[tokio::test]
    async fn empty_state_selects_every_row() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "finance", "financial_aid").await;
        session.set_filter("status", values(&["Pending"])).unwrap();
        session.clear_filters().unwrap();
        let counts = session.row_counts(&src).await.unwrap();
        assert_eq!(counts.filtered, counts.total);
        assert_eq!(session.rows(&src, None).await.unwrap().len(), FINANCIAL_AID_COUNT);
    }

    #[tokio::test]
    async fn empty_selection_clears_the_filter() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "student", "sis").await;
        session.set_filter("class_level", values(&["Senior"])).unwrap();
        assert_eq!(session.panel().unwrap().state.len(), 1);
        session.set_filter("class_level", values(&[])).unwrap();
        assert!(session.panel().unwrap().state.is_empty());
        assert!(!session.clear_filter("class_level").unwrap());
    }

    #[tokio::test]
    async fn malformed_selections_are_rejected() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "student", "sis").await;
        let spec_kind = session
            .panel()
            .unwrap()
            .filters
            .iter()
            .find(|s| s.name() == "email")
            .map(|s| s.widget);
        assert_eq!(spec_kind, Some(WidgetKind::FreeText));

        assert!(session.set_filter("email", values(&["x"])).is_err());
        assert!(session.set_filter("gpa", Selection::Range { min: 4.0, max: 3.0 }).is_err());
        assert!(session.set_filter("gpa", Selection::Range { min: f64::NAN, max: 3.0 }).is_err());
        assert!(session.set_filter("student_id", values(&["1000"])).is_err());
        assert!(session.panel().unwrap().state.is_empty());
    }

    #[tokio::test]
    async fn operations_need_a_table() {
        let src = higher_ed_warehouse();
        let mut session = ExplorerSession::new(FilterPolicy::default());
        assert!(matches!(session.rows(&src, Some(5)).await, Err(ExplorerError::NoTableSelected)));
        assert!(matches!(
            session.set_filter("status", values(&["Paid"])),
            Err(ExplorerError::NoTableSelected)
        ));
        assert!(matches!(session.export(&src).await, Err(ExplorerError::NoTableSelected)));
    }

    #[tokio::test]
    async fn cached_rows_are_replaced_after_a_filter_change() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "finance", "billing").await;
        let first = session.rows(&src, Some(20)).await.unwrap();
        let again = session.rows(&src, Some(20)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        session.set_filter("payment_status", values(&["Paid"])).unwrap();
        let filtered = session.rows(&src, Some(20)).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &filtered));
        assert_eq!(filtered.len(), 10);
    }

    #[tokio::test]
    async fn unbounded_rows_are_not_retained() {
        let src = higher_ed_warehouse();
        let mut session = session_on(&src, "finance", "financial_aid").await;
        let all = session.rows(&src, None).await.unwrap();
        assert_eq!(Arc::strong_count(&all), 1);
        let again = session.rows(&src, None).await.unwrap();
        assert!(!Arc::ptr_eq(&all, &again));
        assert_eq!(all.len(), again.len());

        session.export(&src).await.unwrap();
        let bounded = session.rows(&src, Some(5)).await.unwrap();
        assert_eq!(Arc::strong_count(&bounded), 2);
    }

    #[tokio::test]
    async fn summary_defaults_to_numeric_columns() {
        let src = higher_ed_warehouse();
        let session = session_on(&src, "student", "sis").await;
        let summaries = session.summary(&src, &[]).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].column, "gpa");
        assert!(summaries[0].count < STUDENT_COUNT as u64);
        assert!(session.summary(&src, &["department".to_string()]).await.is_err());
    }
}
