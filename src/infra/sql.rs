//! 把谓词与聚合请求渲染成参数化 SQL。
//!
//! 标识符按方言加引号，所有用户输入的值都走绑定参数，绝不拼接进 SQL 文本。

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

use crate::infra::source::BoundsKind;
use crate::models::query::{AggregateQuery, GroupBucket, MetricFn, Predicate, Test};
use crate::models::schema::TableId;

static LIKE_SPECIAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\\%_]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    pub fn table_ref(self, table: &TableId) -> String {
        format!("{}.{}", self.quote_ident(&table.schema), self.quote_ident(&table.table))
    }

    fn text_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "TEXT",
            Dialect::MySql => "CHAR",
        }
    }

    fn float_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "DOUBLE PRECISION",
            Dialect::MySql => "DOUBLE",
        }
    }

    pub fn as_text(self, expr: &str) -> String {
        format!("CAST({} AS {})", expr, self.text_type())
    }

    fn as_float(self, expr: &str) -> String {
        format!("CAST({} AS {})", expr, self.float_type())
    }

    fn month_bucket(self, expr: &str) -> String {
        match self {
            Dialect::Postgres => format!("TO_CHAR({}, 'YYYY-MM')", expr),
            Dialect::MySql => format!("DATE_FORMAT({}, '%Y-%m')", expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Float(f64),
    Date(NaiveDate),
    Bool(bool),
    Int(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

/// 转义 LIKE 通配符 (默认转义符为反斜杠)
pub fn escape_like(text: &str) -> String {
    LIKE_SPECIAL.replace_all(text, r"\$0").into_owned()
}

struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    binds: Vec<BindValue>,
}

impl SqlBuilder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            binds: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    fn bind(&mut self, value: BindValue) -> &mut Self {
        self.binds.push(value);
        match self.dialect {
            Dialect::Postgres => {
                let placeholder = format!("${}", self.binds.len());
                self.sql.push_str(&placeholder);
            }
            Dialect::MySql => self.sql.push('?'),
        }
        self
    }

    /// WHERE 子句: 谓词中的各列条件 + 额外的固定条件，全部 AND
    fn push_where(&mut self, predicate: &Predicate, extra: &[String]) {
        let mut first = true;
        for clause in &predicate.clauses {
            self.push(if first { " WHERE " } else { " AND " });
            first = false;
            let col = self.dialect.quote_ident(&clause.column);
            match &clause.test {
                Test::In { values } if values.is_empty() => {
                    self.push("1 = 0");
                }
                Test::In { values } => {
                    let expr = self.dialect.as_text(&col);
                    self.push(&expr).push(" IN (");
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.bind(BindValue::Text(v.clone()));
                    }
                    self.push(")");
                }
                Test::Between { min, max } => {
                    self.push(&col).push(" BETWEEN ");
                    self.bind(BindValue::Float(*min)).push(" AND ");
                    self.bind(BindValue::Float(*max));
                }
                Test::DateBetween { start, end } => {
                    self.push(&format!("CAST({} AS DATE) BETWEEN ", col));
                    self.bind(BindValue::Date(*start)).push(" AND ");
                    self.bind(BindValue::Date(*end));
                }
                // Postgres 没有 bit = boolean，统一转成整数比较 (bool 与 bit(1) 都能转)
                Test::Equals { value } => match self.dialect {
                    Dialect::Postgres => {
                        self.push(&format!("CAST({} AS INTEGER) = ", col));
                        self.bind(BindValue::Int(i32::from(*value)));
                    }
                    Dialect::MySql => {
                        self.push(&col).push(" = ");
                        self.bind(BindValue::Bool(*value));
                    }
                },
                Test::Contains { text } => {
                    let expr = format!("LOWER({})", self.dialect.as_text(&col));
                    self.push(&expr).push(" LIKE ");
                    let pattern = format!("%{}%", escape_like(&text.to_lowercase()));
                    self.bind(BindValue::Text(pattern));
                }
            }
        }
        for cond in extra {
            self.push(if first { " WHERE " } else { " AND " });
            first = false;
            self.push(cond);
        }
    }

    fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            binds: self.binds,
        }
    }
}

pub fn list_schemas(dialect: Dialect) -> SqlStatement {
    let mut b = SqlBuilder::new(dialect);
    let name = dialect.as_text("schema_name");
    b.push(&format!("SELECT {} FROM information_schema.schemata ORDER BY 1", name));
    b.finish()
}

pub fn list_tables(dialect: Dialect, schema: &str) -> SqlStatement {
    let mut b = SqlBuilder::new(dialect);
    let name = dialect.as_text("table_name");
    b.push(&format!("SELECT {} FROM information_schema.tables WHERE table_schema = ", name));
    b.bind(BindValue::Text(schema.to_string()));
    b.push(" AND table_type = 'BASE TABLE' ORDER BY 1");
    b.finish()
}

/// 列: 名称, 声明类型 (带精度), 可空("YES"/"NO"), 序号, 是否主键
pub fn describe_columns(dialect: Dialect, table: &TableId) -> SqlStatement {
    let mut b = SqlBuilder::new(dialect);
    match dialect {
        Dialect::Postgres => {
            b.push(
                "SELECT CAST(c.column_name AS TEXT), \
                 CAST(CASE WHEN c.data_type = 'numeric' AND c.numeric_scale IS NOT NULL \
                 THEN 'numeric(' || c.numeric_precision || ',' || c.numeric_scale || ')' \
                 WHEN c.data_type = 'bit' AND c.character_maximum_length IS NOT NULL \
                 THEN 'bit(' || c.character_maximum_length || ')' \
                 ELSE c.data_type END AS TEXT), \
                 CAST(c.is_nullable AS TEXT), CAST(c.ordinal_position AS BIGINT), \
                 EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage k \
                 ON tc.constraint_name = k.constraint_name AND tc.table_schema = k.table_schema \
                 WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = c.table_schema \
                 AND tc.table_name = c.table_name AND k.column_name = c.column_name) \
                 FROM information_schema.columns c WHERE c.table_schema = ",
            );
            b.bind(BindValue::Text(table.schema.clone()));
            b.push(" AND c.table_name = ");
            b.bind(BindValue::Text(table.table.clone()));
            b.push(" ORDER BY c.ordinal_position");
        }
        Dialect::MySql => {
            b.push(
                "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR), \
                 CAST(IS_NULLABLE AS CHAR), CAST(ORDINAL_POSITION AS SIGNED), \
                 CAST(COLUMN_KEY = 'PRI' AS SIGNED) \
                 FROM information_schema.columns WHERE TABLE_SCHEMA = ",
            );
            b.bind(BindValue::Text(table.schema.clone()));
            b.push(" AND TABLE_NAME = ");
            b.bind(BindValue::Text(table.table.clone()));
            b.push(" ORDER BY ORDINAL_POSITION");
        }
    }
    b.finish()
}

pub fn select_distinct(
    dialect: Dialect,
    table: &TableId,
    column: &str,
    predicate: &Predicate,
    limit: usize,
) -> SqlStatement {
    let col = dialect.quote_ident(column);
    let mut b = SqlBuilder::new(dialect);
    b.push(&format!(
        "SELECT DISTINCT {} AS val FROM {}",
        dialect.as_text(&col),
        dialect.table_ref(table)
    ));
    b.push_where(predicate, &[format!("{} IS NOT NULL", col)]);
    b.push(&format!(" ORDER BY 1 LIMIT {}", limit));
    b.finish()
}

pub fn select_bounds(dialect: Dialect, table: &TableId, column: &str, kind: BoundsKind) -> SqlStatement {
    let col = dialect.quote_ident(column);
    let (lo, hi) = match kind {
        BoundsKind::Numeric => (format!("MIN({})", col), format!("MAX({})", col)),
        BoundsKind::Date => (
            format!("CAST(MIN({}) AS DATE)", col),
            format!("CAST(MAX({}) AS DATE)", col),
        ),
    };
    let mut b = SqlBuilder::new(dialect);
    b.push(&format!(
        "SELECT {}, {} FROM {}",
        dialect.as_text(&lo),
        dialect.as_text(&hi),
        dialect.table_ref(table)
    ));
    b.finish()
}

pub fn select_rows(
    dialect: Dialect,
    table: &TableId,
    columns: &[String],
    predicate: &Predicate,
    limit: Option<usize>,
) -> SqlStatement {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut b = SqlBuilder::new(dialect);
    b.push(&format!("SELECT {} FROM {}", projection, dialect.table_ref(table)));
    b.push_where(predicate, &[]);
    if let Some(n) = limit {
        b.push(&format!(" LIMIT {}", n));
    }
    b.finish()
}

pub fn count_rows(dialect: Dialect, table: &TableId, predicate: &Predicate) -> SqlStatement {
    let mut b = SqlBuilder::new(dialect);
    b.push(&format!("SELECT COUNT(*) FROM {}", dialect.table_ref(table)));
    b.push_where(predicate, &[]);
    b.finish()
}

/// 输出两列: label (文本), metric (浮点)
pub fn select_aggregate(
    dialect: Dialect,
    table: &TableId,
    predicate: &Predicate,
    query: &AggregateQuery,
) -> SqlStatement {
    let group = dialect.quote_ident(&query.group_column);
    let label = match query.bucket {
        GroupBucket::Value => dialect.as_text(&group),
        GroupBucket::Month => dialect.month_bucket(&group),
    };
    let metric = match (query.metric_fn, query.metric_column.as_deref()) {
        (MetricFn::Count, None) => "COUNT(*)".to_string(),
        (MetricFn::Count, Some(m)) => format!("COUNT({})", dialect.quote_ident(m)),
        (MetricFn::Sum, Some(m)) => format!("SUM({})", dialect.quote_ident(m)),
        (MetricFn::Avg, Some(m)) => format!("AVG({})", dialect.quote_ident(m)),
        // 上层已校验 SUM/AVG 必须带度量列
        (MetricFn::Sum | MetricFn::Avg, None) => "NULL".to_string(),
    };
    let mut b = SqlBuilder::new(dialect);
    b.push(&format!(
        "SELECT {} AS label, {} AS metric FROM {}",
        label,
        dialect.as_float(&metric),
        dialect.table_ref(table)
    ));
    b.push_where(predicate, &[format!("{} IS NOT NULL", group)]);
    b.push(" GROUP BY 1 ORDER BY 1");
    b.finish()
}

pub fn select_summary(dialect: Dialect, table: &TableId, predicate: &Predicate, column: &str) -> SqlStatement {
    let col = dialect.quote_ident(column);
    let mut b = SqlBuilder::new(dialect);
    b.push(&format!(
        "SELECT COUNT({c}), {}, {}, {}, {} FROM {}",
        dialect.as_float(&format!("AVG({})", col)),
        dialect.as_float(&format!("STDDEV_SAMP({})", col)),
        dialect.as_float(&format!("MIN({})", col)),
        dialect.as_float(&format!("MAX({})", col)),
        dialect.table_ref(table),
        c = col,
    ));
    b.push_where(predicate, &[]);
    b.finish()
}
