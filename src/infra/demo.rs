//! 高校演示数据集: finance / student / advising 三个 schema，数据按下标确定性生成

use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};

use crate::infra::memory::{MemorySource, MemoryTable};
use crate::models::schema::{ColumnMeta, TableId};

const FIRST_NAMES: [&str; 12] = [
    "Ava", "Liam", "Mia", "Noah", "Zoe", "Ethan", "Lucy", "Omar", "Priya", "Mateo", "Hana", "Kofi",
];
const LAST_NAMES: [&str; 10] = [
    "Smith", "Garcia", "Chen", "Okafor", "Novak", "Patel", "Kim", "Silva", "Haddad", "Brown",
];
const DEPARTMENTS: [&str; 6] = [
    "Biology",
    "Business",
    "Computer Science",
    "Education",
    "History",
    "Mathematics",
];
const CLASS_LEVELS: [&str; 4] = ["Freshman", "Sophomore", "Junior", "Senior"];
const AID_TYPES: [&str; 4] = ["Grant", "Loan", "Scholarship", "Work-Study"];
const AID_STATUSES: [&str; 4] = ["Approved", "Cancelled", "Disbursed", "Pending"];
const PAYMENT_STATUSES: [&str; 4] = ["Overdue", "Paid", "Partial", "Unpaid"];
const CITIES: [(&str, &str); 8] = [
    ("Austin", "TX"),
    ("Boston", "MA"),
    ("Chicago", "IL"),
    ("Denver", "CO"),
    ("Madison", "WI"),
    ("Portland", "OR"),
    ("Raleigh", "NC"),
    ("Tucson", "AZ"),
];

pub const STUDENT_COUNT: usize = 60;
pub const FINANCIAL_AID_COUNT: usize = 50;
pub const BILLING_COUNT: usize = 40;

fn day(base: NaiveDate, offset: usize) -> String {
    (base + Duration::days(offset as i64)).to_string()
}

fn base_date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// 保留两位小数
fn cents(value: f64) -> Value {
    json!((value * 100.0).round() / 100.0)
}

fn student_sis() -> MemoryTable {
    let mut table = MemoryTable::new(vec![
        ColumnMeta::new("student_id", "INTEGER", 1).key(),
        ColumnMeta::new("first_name", "VARCHAR(50)", 2),
        ColumnMeta::new("last_name", "VARCHAR(50)", 3),
        ColumnMeta::new("email", "VARCHAR(120)", 4),
        ColumnMeta::new("department", "VARCHAR(60)", 5),
        ColumnMeta::new("class_level", "VARCHAR(20)", 6),
        ColumnMeta::new("gpa", "NUMERIC(3,2)", 7),
        ColumnMeta::new("enrollment_date", "DATE", 8),
        ColumnMeta::new("is_full_time", "BOOLEAN", 9),
    ]);
    let enrolled = base_date(2021, 8, 16);
    for i in 0..STUDENT_COUNT {
        let first = FIRST_NAMES[i % FIRST_NAMES.len()];
        let last = LAST_NAMES[(i * 7) % LAST_NAMES.len()];
        // 每 9 个学生有一个尚无 GPA
        let gpa = if i % 9 == 4 {
            Value::Null
        } else {
            cents(2.0 + ((i * 37) % 201) as f64 / 100.0)
        };
        table.push_row(vec![
            json!(1000 + i),
            json!(first),
            json!(last),
            json!(format!("{}.{}{}@university.edu", first, last, i).to_lowercase()),
            json!(DEPARTMENTS[(i * 5) % DEPARTMENTS.len()]),
            json!(CLASS_LEVELS[i % CLASS_LEVELS.len()]),
            gpa,
            json!(day(enrolled, (i * 23) % 900)),
            json!(i % 4 != 3),
        ]);
    }
    table
}

fn student_address() -> MemoryTable {
    let mut table = MemoryTable::new(vec![
        ColumnMeta::new("address_id", "INTEGER", 1).key(),
        ColumnMeta::new("student_id", "INTEGER", 2),
        ColumnMeta::new("street", "VARCHAR(120)", 3),
        ColumnMeta::new("city", "VARCHAR(60)", 4),
        ColumnMeta::new("state", "CHAR(2)", 5),
        ColumnMeta::new("postal_code", "VARCHAR(10)", 6),
        ColumnMeta::new("is_primary", "BOOLEAN", 7),
    ]);
    for i in 0..STUDENT_COUNT {
        let (city, state) = CITIES[(i * 3) % CITIES.len()];
        table.push_row(vec![
            json!(5000 + i),
            json!(1000 + i),
            json!(format!("{} College Ave", 100 + i * 11)),
            json!(city),
            json!(state),
            json!(format!("{:05}", 10000 + i * 731)),
            json!(i % 5 != 0),
        ]);
    }
    table
}

fn finance_financial_aid() -> MemoryTable {
    let mut table = MemoryTable::new(vec![
        ColumnMeta::new("aid_id", "INTEGER", 1).key(),
        ColumnMeta::new("student_id", "INTEGER", 2),
        ColumnMeta::new("aid_type", "VARCHAR(30)", 3),
        ColumnMeta::new("amount", "NUMERIC(10,2)", 4),
        ColumnMeta::new("status", "VARCHAR(20)", 5),
        ColumnMeta::new("award_date", "DATE", 6),
        ColumnMeta::new("academic_year", "VARCHAR(9)", 7),
        ColumnMeta::new("is_need_based", "BOOLEAN", 8),
    ]);
    let awarded = base_date(2023, 7, 1);
    for i in 0..FINANCIAL_AID_COUNT {
        table.push_row(vec![
            json!(1 + i),
            json!(1000 + (i * 13) % STUDENT_COUNT),
            json!(AID_TYPES[i % AID_TYPES.len()]),
            cents(500.0 + ((i * 137) % 40) as f64 * 125.25),
            json!(AID_STATUSES[(i * 3) % AID_STATUSES.len()]),
            json!(day(awarded, (i * 11) % 400)),
            json!(if i % 2 == 0 { "2023-2024" } else { "2024-2025" }),
            json!(i % 3 == 0),
        ]);
    }
    table
}

fn finance_billing() -> MemoryTable {
    let mut table = MemoryTable::new(vec![
        ColumnMeta::new("billing_id", "INTEGER", 1).key(),
        ColumnMeta::new("student_id", "INTEGER", 2),
        ColumnMeta::new("term", "VARCHAR(20)", 3),
        ColumnMeta::new("amount_due", "NUMERIC(10,2)", 4),
        ColumnMeta::new("payment_status", "VARCHAR(20)", 5),
        ColumnMeta::new("due_date", "DATE", 6),
    ]);
    let due = base_date(2024, 8, 30);
    for i in 0..BILLING_COUNT {
        table.push_row(vec![
            json!(9000 + i),
            json!(1000 + (i * 7) % STUDENT_COUNT),
            json!(if i % 2 == 0 { "Fall 2024" } else { "Spring 2025" }),
            cents(1200.0 + ((i * 53) % 30) as f64 * 87.5),
            json!(PAYMENT_STATUSES[i % PAYMENT_STATUSES.len()]),
            json!(day(due, (i % 2) * 150 + i)),
        ]);
    }
    table
}

/// 演示数仓，`advising` schema 目前没有表
pub fn higher_ed_warehouse() -> MemorySource {
    MemorySource::new()
        .with_table(TableId::new("finance", "billing"), finance_billing())
        .with_table(TableId::new("finance", "financial_aid"), finance_financial_aid())
        .with_table(TableId::new("student", "address"), student_address())
        .with_table(TableId::new("student", "sis"), student_sis())
        .with_schema("advising")
}
