//! CSV 导出: 表头 + 原顺序的行，逗号分隔，`\n` 换行

use serde_json::Value;
use std::io::Write;
use tracing::info;

use crate::error::Result;
use crate::models::query::QueryResult;
use crate::models::schema::TableId;

pub struct ExportArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// `{schema}_{table}_export.csv`，全部小写
pub fn export_filename(table: &TableId) -> String {
    format!("{}_{}_export.csv", table.schema, table.table).to_lowercase()
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_record<W: Write, I: IntoIterator<Item = String>>(out: &mut W, fields: I) -> std::io::Result<()> {
    let line = fields
        .into_iter()
        .map(|f| csv_escape(&f))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{}", line)
}

pub fn write_csv<W: Write>(out: &mut W, result: &QueryResult) -> Result<()> {
    write_record(out, result.columns.iter().cloned())?;
    for row in &result.rows {
        write_record(out, row.iter().map(field_text))?;
    }
    out.flush()?;
    Ok(())
}

pub fn export(table: &TableId, result: &QueryResult) -> Result<ExportArtifact> {
    let mut bytes = Vec::new();
    write_csv(&mut bytes, result)?;
    let filename = export_filename(table);
    info!("导出 {}: {} 行, {} 字节", filename, result.len(), bytes.len());
    Ok(ExportArtifact { filename, bytes })
}
