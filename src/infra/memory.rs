//! 内存数仓：演示模式与测试使用，谓词在数据源内部求值，语义与 SQL 下推保持一致

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::infra::source::{BoundsKind, DataSource, SourceError};
use crate::infra::utils::{parse_date, value_text};
use crate::models::query::{
    AggregatePoint, AggregateQuery, Clause, GroupBucket, MetricFn, NumericSummary, Predicate,
    QueryResult, Test,
};
use crate::models::schema::{ColumnMeta, TableId};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width must match columns");
        self.rows.push(row);
    }

    fn index_of(&self, column: &str) -> Result<usize, SourceError> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| SourceError::UnknownColumn(column.to_string()))
    }

    /// 先解析谓词中的列下标，再逐行求值
    fn matching_rows<'a>(&'a self, predicate: &'a Predicate) -> Result<Vec<&'a Vec<Value>>, SourceError> {
        let resolved = predicate
            .clauses
            .iter()
            .map(|c| -> Result<(usize, &Clause), SourceError> { Ok((self.index_of(&c.column)?, c)) })
            .collect::<Result<Vec<(usize, &Clause)>, SourceError>>()?;
        Ok(self
            .rows
            .iter()
            .filter(|row| resolved.iter().all(|(i, c)| matches(&row[*i], &c.test)))
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    schemas: BTreeMap<String, BTreeMap<String, MemoryTable>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schemas.entry(schema.into()).or_default();
        self
    }

    pub fn with_table(mut self, table: TableId, data: MemoryTable) -> Self {
        self.schemas
            .entry(table.schema)
            .or_default()
            .insert(table.table, data);
        self
    }

    fn table(&self, table: &TableId) -> Result<&MemoryTable, SourceError> {
        self.schemas
            .get(&table.schema)
            .and_then(|tables| tables.get(&table.table))
            .ok_or_else(|| SourceError::UnknownTable(table.clone()))
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date(s),
        _ => None,
    }
}

fn matches(value: &Value, test: &Test) -> bool {
    if value.is_null() {
        return false;
    }
    match test {
        Test::In { values } => value_text(value).is_some_and(|t| values.contains(&t)),
        Test::Between { min, max } => as_number(value).is_some_and(|x| *min <= x && x <= *max),
        Test::DateBetween { start, end } => as_date(value).is_some_and(|d| *start <= d && d <= *end),
        Test::Equals { value: expected } => value.as_bool() == Some(*expected),
        Test::Contains { text } => value_text(value)
            .is_some_and(|t| t.to_lowercase().contains(&text.to_lowercase())),
    }
}

fn coercion(column: &str, expected: &'static str, value: &Value) -> SourceError {
    SourceError::Coercion {
        column: column.to_string(),
        expected,
        detail: format!("unexpected value {}", value),
    }
}

impl DataSource for MemorySource {
    async fn list_schemas(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.schemas.keys().cloned().collect())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, SourceError> {
        Ok(self
            .schemas
            .get(schema)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn describe_columns(&self, table: &TableId) -> Result<Vec<ColumnMeta>, SourceError> {
        Ok(self
            .table(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn distinct_values(
        &self,
        table: &TableId,
        column: &str,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<String>, SourceError> {
        let data = self.table(table)?;
        let idx = data.index_of(column)?;
        let distinct: std::collections::BTreeSet<String> = data
            .matching_rows(predicate)?
            .into_iter()
            .filter_map(|row| value_text(&row[idx]))
            .collect();
        Ok(distinct.into_iter().take(limit).collect())
    }

    async fn column_bounds(
        &self,
        table: &TableId,
        column: &str,
        kind: BoundsKind,
    ) -> Result<Option<(String, String)>, SourceError> {
        let data = self.table(table)?;
        let idx = data.index_of(column)?;
        let present = data.rows.iter().map(|row| &row[idx]).filter(|v| !v.is_null());
        match kind {
            BoundsKind::Numeric => {
                let mut bounds: Option<((f64, String), (f64, String))> = None;
                for value in present {
                    let x = as_number(value).ok_or_else(|| coercion(column, "number", value))?;
                    let text = value_text(value).unwrap_or_default();
                    bounds = Some(match bounds {
                        None => ((x, text.clone()), (x, text)),
                        Some((lo, hi)) => (
                            if x < lo.0 { (x, text.clone()) } else { lo },
                            if x > hi.0 { (x, text) } else { hi },
                        ),
                    });
                }
                Ok(bounds.map(|(lo, hi)| (lo.1, hi.1)))
            }
            BoundsKind::Date => {
                let mut bounds: Option<(NaiveDate, NaiveDate)> = None;
                for value in present {
                    let d = as_date(value).ok_or_else(|| coercion(column, "date", value))?;
                    bounds = Some(match bounds {
                        None => (d, d),
                        Some((lo, hi)) => (lo.min(d), hi.max(d)),
                    });
                }
                Ok(bounds.map(|(lo, hi)| (lo.to_string(), hi.to_string())))
            }
        }
    }

    async fn fetch_rows(
        &self,
        table: &TableId,
        columns: &[String],
        predicate: &Predicate,
        limit: Option<usize>,
    ) -> Result<QueryResult, SourceError> {
        let data = self.table(table)?;
        let projection = if columns.is_empty() {
            (0..data.columns.len()).collect::<Vec<_>>()
        } else {
            columns
                .iter()
                .map(|c| data.index_of(c))
                .collect::<Result<Vec<_>, _>>()?
        };
        let rows = data
            .matching_rows(predicate)?
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| projection.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(QueryResult {
            columns: projection
                .iter()
                .map(|&i| data.columns[i].name.clone())
                .collect(),
            rows,
        })
    }

    async fn count_rows(&self, table: &TableId, predicate: &Predicate) -> Result<u64, SourceError> {
        Ok(self.table(table)?.matching_rows(predicate)?.len() as u64)
    }

    async fn fetch_aggregate(
        &self,
        table: &TableId,
        predicate: &Predicate,
        query: &AggregateQuery,
    ) -> Result<Vec<AggregatePoint>, SourceError> {
        let data = self.table(table)?;
        let group_idx = data.index_of(&query.group_column)?;
        let metric_idx = query
            .metric_column
            .as_deref()
            .map(|m| data.index_of(m))
            .transpose()?;

        // label -> (行数, 非空度量个数, 度量和)
        let mut groups: BTreeMap<String, (u64, u64, f64)> = BTreeMap::new();
        for row in data.matching_rows(predicate)? {
            let group = &row[group_idx];
            let label = match query.bucket {
                GroupBucket::Value => value_text(group),
                GroupBucket::Month => as_date(group).map(|d| d.format("%Y-%m").to_string()),
            };
            let Some(label) = label else { continue };
            let entry = groups.entry(label).or_default();
            entry.0 += 1;
            if let Some(i) = metric_idx {
                if let Some(x) = as_number(&row[i]) {
                    entry.1 += 1;
                    entry.2 += x;
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|(label, (rows, present, sum))| {
                let value = match (query.metric_fn, metric_idx) {
                    (MetricFn::Count, None) => Some(rows as f64),
                    (MetricFn::Count, Some(_)) => Some(present as f64),
                    (MetricFn::Sum, Some(_)) if present > 0 => Some(sum),
                    (MetricFn::Avg, Some(_)) if present > 0 => Some(sum / present as f64),
                    _ => None,
                };
                AggregatePoint { label, value }
            })
            .collect())
    }

    async fn fetch_summary(
        &self,
        table: &TableId,
        predicate: &Predicate,
        column: &str,
    ) -> Result<NumericSummary, SourceError> {
        let data = self.table(table)?;
        let idx = data.index_of(column)?;
        let values = data
            .matching_rows(predicate)?
            .into_iter()
            .map(|row| &row[idx])
            .filter(|v| !v.is_null())
            .map(|v| as_number(v).ok_or_else(|| coercion(column, "number", v)))
            .collect::<Result<Vec<f64>, _>>()?;

        let n = values.len();
        let mean = (n > 0).then(|| values.iter().sum::<f64>() / n as f64);
        let std_dev = mean.filter(|_| n > 1).map(|m| {
            let var = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        });
        Ok(NumericSummary {
            column: column.to_string(),
            count: n as u64,
            mean,
            std_dev,
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
        })
    }
}
