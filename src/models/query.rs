use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单列上的判定
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Test {
    In { values: Vec<String> },
    Between { min: f64, max: f64 },
    DateBetween { start: NaiveDate, end: NaiveDate },
    Equals { value: bool },
    /// 不区分大小写的子串匹配
    Contains { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clause {
    pub column: String,
    pub test: Test,
}

/// 各列子条件的 AND 组合；没有子条件时匹配全部行
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Predicate {
    pub clauses: Vec<Clause>,
}

impl Predicate {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_universal(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn and(mut self, column: impl Into<String>, test: Test) -> Self {
        self.clauses.push(Clause {
            column: column.into(),
            test,
        });
        self
    }
}

/// 一次过滤查询的结果，只整体替换不做增量修改
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// 取某一列的全部值 (列不存在时为空)
    pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Value> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

    /// 转成对象数组，供 API 直接返回
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut map = Map::new();
                for (name, val) in self.columns.iter().zip(row) {
                    map.insert(name.clone(), val.clone());
                }
                Value::Object(map)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricFn {
    #[default]
    Count,
    Sum,
    Avg,
}

/// 分组方式: 原值，或日期按自然月分桶
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupBucket {
    Value,
    Month,
}

/// 下推到数据源的分组聚合
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateQuery {
    pub group_column: String,
    pub bucket: GroupBucket,
    pub metric_column: Option<String>,
    pub metric_fn: MetricFn,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub group_column: String,
    #[serde(default)]
    pub metric_column: Option<String>,
    #[serde(default)]
    pub metric_fn: MetricFn,
    #[serde(default)]
    pub top: Option<usize>,
}

impl AggregateRequest {
    pub fn count(group_column: impl Into<String>) -> Self {
        Self {
            group_column: group_column.into(),
            metric_column: None,
            metric_fn: MetricFn::Count,
            top: None,
        }
    }

    pub fn metric(
        group_column: impl Into<String>,
        metric_column: impl Into<String>,
        metric_fn: MetricFn,
    ) -> Self {
        Self {
            group_column: group_column.into(),
            metric_column: Some(metric_column.into()),
            metric_fn,
            top: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatePoint {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartStatus {
    Ready,
    /// 少于两个分类，图表无意义但不是错误
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_column: String,
    pub metric_column: Option<String>,
    pub metric_fn: MetricFn,
    pub points: Vec<AggregatePoint>,
    pub status: ChartStatus,
}

impl AggregationResult {
    pub fn new(query: &AggregateQuery, points: Vec<AggregatePoint>) -> Self {
        let status = if points.len() < 2 {
            ChartStatus::InsufficientData
        } else {
            ChartStatus::Ready
        };
        Self {
            group_column: query.group_column.clone(),
            metric_column: query.metric_column.clone(),
            metric_fn: query.metric_fn,
            points,
            status,
        }
    }

    /// 只保留数值最大的 n 个分类 (同值按标签排序)
    pub fn top(mut self, n: usize) -> Self {
        self.points.sort_by(|a, b| {
            let (x, y) = (a.value.unwrap_or(f64::NEG_INFINITY), b.value.unwrap_or(f64::NEG_INFINITY));
            y.total_cmp(&x).then_with(|| a.label.cmp(&b.label))
        });
        self.points.truncate(n);
        self
    }

    pub fn value_of(&self, label: &str) -> Option<f64> {
        self.points
            .iter()
            .find(|p| p.label == label)
            .and_then(|p| p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: u64,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartCandidates {
    pub categorical: Vec<String>,
    pub numeric: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    pub filtered: u64,
    pub total: u64,
}
