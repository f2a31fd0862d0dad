//! 筛选控件工厂
//!
//! 分两步: 先对每一列做一次廉价探测 (`probe`，有 I/O)，再按固定决策表
//! 把探测结果映射成控件 (`classify`，纯函数)。单列探测失败只会把该列降级为
//! 自由文本，不会让整张表不可用。

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use crate::infra::source::{BoundsKind, DataSource};
use crate::infra::utils::parse_date;
use crate::models::filter::{DateBounds, Domain, FilterSpec, NumericBounds, WidgetKind};
use crate::models::query::Predicate;
use crate::models::schema::{ColumnDescriptor, SemanticType, TableId};

pub const DEFAULT_COLUMN_LIMIT: usize = 12;
pub const DEFAULT_CATEGORICAL_LIMIT: usize = 6;
pub const DISTINCT_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterPolicy {
    /// 按声明顺序最多提供多少列筛选
    pub column_limit: usize,
    /// 文本列 (多选 / 自由文本) 的数量上限
    pub categorical_limit: usize,
    /// 去重值个数不超过该阈值时使用多选
    pub distinct_threshold: usize,
    pub exclude_keys: bool,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            column_limit: DEFAULT_COLUMN_LIMIT,
            categorical_limit: DEFAULT_CATEGORICAL_LIMIT,
            distinct_threshold: DISTINCT_THRESHOLD,
            exclude_keys: true,
        }
    }
}

/// 单列探测结果
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// 最多 `threshold + 1` 个去重值
    Distinct(Vec<String>),
    Numeric(Option<(String, String)>),
    Date(Option<(String, String)>),
    Flag,
    Failed(String),
}

/// 决策表: 控件只由语义类别和去重值个数决定
pub fn select_widget(category: SemanticType, distinct_count: usize, threshold: usize) -> WidgetKind {
    match category {
        SemanticType::Boolean => WidgetKind::Radio,
        SemanticType::Date => WidgetKind::DateRange,
        SemanticType::Numeric => WidgetKind::Range,
        SemanticType::Text if distinct_count <= threshold => WidgetKind::Multiselect,
        SemanticType::Text => WidgetKind::FreeText,
    }
}

/// 选出参与筛选的列: 排除主键，取前 `column_limit` 列，文本列最多 `categorical_limit` 个
pub fn filterable_columns<'a>(columns: &'a [ColumnDescriptor], policy: &FilterPolicy) -> Vec<&'a ColumnDescriptor> {
    let mut text_seen = 0;
    columns
        .iter()
        .filter(|c| !(policy.exclude_keys && c.is_key))
        .take(policy.column_limit)
        .filter(|c| {
            if c.category != SemanticType::Text {
                return true;
            }
            text_seen += 1;
            text_seen <= policy.categorical_limit
        })
        .collect()
}

pub async fn probe<S: DataSource>(
    source: &S,
    table: &TableId,
    column: &ColumnDescriptor,
    policy: &FilterPolicy,
) -> Probe {
    let result = match column.category {
        SemanticType::Boolean => return Probe::Flag,
        SemanticType::Text => source
            .distinct_values(table, &column.name, &Predicate::all(), policy.distinct_threshold + 1)
            .await
            .map(Probe::Distinct),
        SemanticType::Numeric => source
            .column_bounds(table, &column.name, BoundsKind::Numeric)
            .await
            .map(Probe::Numeric),
        SemanticType::Date => source
            .column_bounds(table, &column.name, BoundsKind::Date)
            .await
            .map(Probe::Date),
    };
    result.unwrap_or_else(|e| Probe::Failed(e.to_string()))
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// `NUMERIC(10,2)` -> 2
fn declared_scale(data_type: &str) -> u32 {
    data_type
        .split_once('(')
        .and_then(|(_, args)| args.trim_end_matches(')').split(',').nth(1))
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// 步长取小数位数 (声明精度与观测值中较大者): 整数为 1，两位小数为 0.01
fn numeric_bounds(lo: &str, hi: &str, min_scale: u32) -> Option<NumericBounds> {
    let (lo, hi) = (parse_decimal(lo)?, parse_decimal(hi)?);
    let scale = lo.scale().max(hi.scale()).max(min_scale).min(28);
    Some(NumericBounds {
        min: lo.to_f64()?,
        max: hi.to_f64()?,
        step: Decimal::new(1, scale).to_f64()?,
    })
}

fn date_bounds(lo: &str, hi: &str) -> Option<DateBounds> {
    Some(DateBounds {
        min: parse_date(lo)?,
        max: parse_date(hi)?,
    })
}

fn demote(column: ColumnDescriptor, reason: &str) -> FilterSpec {
    warn!("列 {} 探测失败，降级为自由文本: {}", column.name, reason);
    FilterSpec {
        column,
        widget: WidgetKind::FreeText,
        domain: Domain::Open,
    }
}

/// 探测结果 -> 控件与取值范围
pub fn classify(column: ColumnDescriptor, probe: Probe, threshold: usize) -> FilterSpec {
    let (distinct_count, domain) = match probe {
        Probe::Failed(reason) => return demote(column, &reason),
        Probe::Flag => (2, Domain::Tristate),
        Probe::Numeric(None) => (0, Domain::Numeric(None)),
        Probe::Numeric(Some((lo, hi))) => match numeric_bounds(&lo, &hi, declared_scale(&column.data_type)) {
            Some(b) => (2, Domain::Numeric(Some(b))),
            None => return demote(column, &format!("bounds `{}`..`{}` are not numeric", lo, hi)),
        },
        Probe::Date(None) => (0, Domain::Date(None)),
        Probe::Date(Some((lo, hi))) => match date_bounds(&lo, &hi) {
            Some(b) => (2, Domain::Date(Some(b))),
            None => return demote(column, &format!("bounds `{}`..`{}` are not dates", lo, hi)),
        },
        Probe::Distinct(mut values) => {
            values.sort();
            values.dedup();
            (values.len(), Domain::Discrete(values))
        }
    };

    let widget = select_widget(column.category, distinct_count, threshold);
    let domain = match (widget, domain) {
        (WidgetKind::FreeText, _) => Domain::Open,
        (_, domain) => domain,
    };
    FilterSpec { column, widget, domain }
}

/// 为当前表生成全部筛选控件，按声明顺序
#[instrument(skip_all, fields(table = %table))]
pub async fn build_specs<S: DataSource>(
    source: &S,
    table: &TableId,
    columns: &[ColumnDescriptor],
    policy: &FilterPolicy,
) -> Vec<FilterSpec> {
    let mut specs = Vec::new();
    for column in filterable_columns(columns, policy) {
        let probe = probe(source, table, column, policy).await;
        debug!("列 {} 探测结果: {:?}", column.name, probe);
        specs.push(classify(column.clone(), probe, policy.distinct_threshold));
    }
    info!("表 {} 生成筛选控件 {} 个", table, specs.len());
    specs
}
