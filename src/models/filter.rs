use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::schema::ColumnDescriptor;

/// 筛选控件形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetKind {
    Multiselect,
    Range,
    DateRange,
    /// 三态: true / false / 任意
    Radio,
    FreeText,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateBounds {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

/// 控件的取值范围。`None` 边界表示该列没有任何非空值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Domain {
    Discrete(Vec<String>),
    Numeric(Option<NumericBounds>),
    Date(Option<DateBounds>),
    Tristate,
    Open,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSpec {
    pub column: ColumnDescriptor,
    pub widget: WidgetKind,
    pub domain: Domain,
}

impl FilterSpec {
    pub fn name(&self) -> &str {
        &self.column.name
    }
}

/// 用户在某一列上的当前选择
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    Values { values: Vec<String> },
    Range { min: f64, max: f64 },
    DateRange { start: NaiveDate, end: NaiveDate },
    Flag { value: bool },
    Text { text: String },
}

impl Selection {
    /// 空选择等价于"不约束"
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::Values { values } => values.is_empty(),
            Selection::Text { text } => text.trim().is_empty(),
            _ => false,
        }
    }

    /// 选择的形态是否与控件匹配
    pub fn fits(&self, widget: WidgetKind) -> bool {
        matches!(
            (widget, self),
            (WidgetKind::Multiselect, Selection::Values { .. })
                | (WidgetKind::Range, Selection::Range { .. })
                | (WidgetKind::DateRange, Selection::DateRange { .. })
                | (WidgetKind::Radio, Selection::Flag { .. })
                | (WidgetKind::FreeText, Selection::Text { .. })
        )
    }
}

/// 当前表上的筛选状态。只通过 set / clear 修改，换表时整体丢弃
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterState {
    selections: BTreeMap<String, Selection>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Selection> {
        self.selections.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, selection: Selection) {
        self.selections.insert(column.into(), selection);
    }

    pub fn clear(&mut self, column: &str) -> bool {
        self.selections.remove(column).is_some()
    }

    pub fn clear_all(&mut self) {
        self.selections.clear();
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Selection)> {
        self.selections.iter()
    }
}
