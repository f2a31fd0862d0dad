use serde::Deserialize;

use crate::error::ExplorerError;

/// 默认展示行数
pub const DEFAULT_ROW_LIMIT: usize = 20;
/// 可选的展示行数，另有 `all`
pub const ROW_LIMIT_OPTIONS: [usize; 4] = [5, 20, 50, 100];

#[derive(Debug, Deserialize)]
pub struct SelectTableRequest {
    pub schema: String,
    pub table: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RowsParams {
    pub limit: Option<String>,
}

impl RowsParams {
    /// `None` 表示返回全部行
    pub fn row_limit(&self) -> Result<Option<usize>, ExplorerError> {
        match self.limit.as_deref().map(str::trim) {
            None | Some("") => Ok(Some(DEFAULT_ROW_LIMIT)),
            Some(v) if v.eq_ignore_ascii_case("all") => Ok(None),
            Some(v) => match v.parse::<usize>() {
                Ok(n) if ROW_LIMIT_OPTIONS.contains(&n) => Ok(Some(n)),
                _ => Err(ExplorerError::InvalidRowLimit(v.to_string())),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    /// 逗号分隔的数值列名
    pub columns: Option<String>,
}

impl SummaryParams {
    pub fn column_list(&self) -> Vec<String> {
        self.columns
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    }
}
