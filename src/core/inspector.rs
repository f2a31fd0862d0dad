use tracing::{debug, info, instrument};

use crate::error::{ExplorerError, Result};
use crate::infra::source::DataSource;
use crate::models::schema::{ColumnDescriptor, ColumnMeta, SemanticType, TableId};

/// 声明类型 -> 语义类别。全映射，未知类型一律视为文本
///
/// 只看基础类型名 (第一个单词、去掉括号参数)，所以 `NUMERIC(10,2)`、
/// `timestamp without time zone`、`INT UNSIGNED` 都能正确归类。
pub fn classify(declared: &str) -> SemanticType {
    let upper = declared.trim().to_ascii_uppercase();
    let base = upper
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();

    // MySQL 的布尔列声明为 TINYINT(1)
    if upper.starts_with("TINYINT(1)") {
        return SemanticType::Boolean;
    }
    // 只有单比特的 BIT 是布尔；bit(8)、bit varying 按文本处理
    if base == "BIT" {
        let width: String = upper[3..].chars().filter(|c| !c.is_whitespace()).collect();
        return match width.as_str() {
            "" | "(1)" => SemanticType::Boolean,
            _ => SemanticType::Text,
        };
    }
    match base {
        "BOOL" | "BOOLEAN" => SemanticType::Boolean,
        "INT" | "INTEGER" | "INT2" | "INT4" | "INT8" | "SMALLINT" | "BIGINT" | "TINYINT"
        | "MEDIUMINT" | "BYTEINT" | "SERIAL" | "SMALLSERIAL" | "BIGSERIAL" | "NUMBER"
        | "NUMERIC" | "DECIMAL" | "DEC" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "REAL"
        | "MONEY" | "YEAR" => SemanticType::Numeric,
        "DATE" | "DATETIME" => SemanticType::Date,
        t if t.starts_with("TIMESTAMP") || t.starts_with("TIME") => SemanticType::Date,
        _ => SemanticType::Text,
    }
}

pub fn descriptor(meta: ColumnMeta) -> ColumnDescriptor {
    ColumnDescriptor {
        category: classify(&meta.data_type),
        name: meta.name,
        data_type: meta.data_type,
        nullable: meta.nullable,
        ordinal: meta.ordinal,
        is_key: meta.is_key,
    }
}

/// 列出可浏览的 schema，排除系统 schema (不区分大小写)
pub async fn list_schemas<S: DataSource>(source: &S, excluded: &[String]) -> Result<Vec<String>> {
    let schemas = source
        .list_schemas()
        .await
        .map_err(|e| ExplorerError::metadata("schemas", e))?;
    Ok(schemas
        .into_iter()
        .filter(|s| !excluded.iter().any(|x| x.eq_ignore_ascii_case(s)))
        .collect())
}

pub async fn list_tables<S: DataSource>(source: &S, schema: &str) -> Result<Vec<String>> {
    let tables = source
        .list_tables(schema)
        .await
        .map_err(|e| ExplorerError::metadata(schema, e))?;
    if tables.is_empty() {
        ensure_schema(source, schema).await?;
    }
    Ok(tables)
}

async fn ensure_schema<S: DataSource>(source: &S, schema: &str) -> Result<()> {
    let schemas = source
        .list_schemas()
        .await
        .map_err(|e| ExplorerError::metadata(schema, e))?;
    if schemas.iter().any(|s| s == schema) {
        Ok(())
    } else {
        Err(ExplorerError::SchemaNotFound(schema.to_string()))
    }
}

/// 读取表的列描述；schema 不存在、表不存在、元数据查询失败分别报错
#[instrument(skip_all, fields(table = %table))]
pub async fn describe<S: DataSource>(source: &S, table: &TableId) -> Result<Vec<ColumnDescriptor>> {
    let columns = source
        .describe_columns(table)
        .await
        .map_err(|e| ExplorerError::metadata(table, e))?;

    if columns.is_empty() {
        ensure_schema(source, &table.schema).await?;
        return Err(ExplorerError::TableNotFound(table.clone()));
    }

    let descriptors: Vec<ColumnDescriptor> = columns.into_iter().map(descriptor).collect();
    for d in &descriptors {
        debug!("列 {} ({}) -> {:?}", d.name, d.data_type, d.category);
    }
    info!("表 {} 元数据读取完成: {} 列", table, descriptors.len());
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::demo::higher_ed_warehouse;

    #[test]
    fn classification_covers_common_declared_types() {
        for t in ["INTEGER", "int4", "BIGINT", "NUMERIC(10,2)", "number(38,0)", "double precision", "REAL", "int unsigned", "decimal", "tinyint(4)"] {
            assert_eq!(classify(t), SemanticType::Numeric, "{}", t);
        }
        for t in ["DATE", "timestamp without time zone", "TIMESTAMP_NTZ", "timestamptz", "DATETIME", "time"] {
            assert_eq!(classify(t), SemanticType::Date, "{}", t);
        }
        for t in ["BOOLEAN", "bool", "BIT", "bit(1)", "BIT (1)", "tinyint(1)"] {
            assert_eq!(classify(t), SemanticType::Boolean, "{}", t);
        }
        for t in ["VARCHAR(50)", "character varying", "TEXT", "uuid", "jsonb", "POINT", "INTERVAL", "", "USER-DEFINED"] {
            assert_eq!(classify(t), SemanticType::Text, "{}", t);
        }
    }

    #[test]
    fn only_single_bit_columns_are_boolean() {
        for t in ["bit(8)", "BIT(64)", "bit varying", "bit varying(1)", "varbit"] {
            assert_eq!(classify(t), SemanticType::Text, "{}", t);
        }
    }

    #[tokio::test]
    async fn describe_keeps_declaration_order() {
        let src = higher_ed_warehouse();
        let cols = describe(&src, &TableId::new("student", "sis")).await.unwrap();
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names[0], "student_id");
        assert!(cols[0].is_key);
        let gpa = cols.iter().find(|c| c.name == "gpa").unwrap();
        assert_eq!(gpa.category, SemanticType::Numeric);
        let full_time = cols.iter().find(|c| c.name == "is_full_time").unwrap();
        assert_eq!(full_time.category, SemanticType::Boolean);
    }

    #[tokio::test]
    async fn missing_schema_and_table_are_distinguished() {
        let src = higher_ed_warehouse();
        let err = describe(&src, &TableId::new("hr", "staff")).await.unwrap_err();
        assert!(matches!(err, ExplorerError::SchemaNotFound(s) if s == "hr"));

        let err = describe(&src, &TableId::new("student", "grades")).await.unwrap_err();
        assert!(matches!(err, ExplorerError::TableNotFound(t) if t.table == "grades"));
    }

    #[tokio::test]
    async fn empty_schema_lists_no_tables() {
        let src = higher_ed_warehouse();
        assert!(list_tables(&src, "advising").await.unwrap().is_empty());
        assert!(matches!(
            list_tables(&src, "nowhere").await,
            Err(ExplorerError::SchemaNotFound(_))
        ));
    }

    #[tokio::test]
    async fn system_schemas_are_hidden() {
        let src = higher_ed_warehouse();
        let schemas = list_schemas(&src, &["FINANCE".to_string()]).await.unwrap();
        assert_eq!(schemas, vec!["advising", "student"]);
    }
}
