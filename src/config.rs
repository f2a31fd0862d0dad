//! 运行配置: `.env` + 环境变量

use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::core::widgets::FilterPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
/// 会话空闲多久后被回收
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
/// 不对用户展示的系统 schema
pub const DEFAULT_EXCLUDED_SCHEMAS: [&str; 6] = [
    "information_schema",
    "pg_catalog",
    "pg_toast",
    "mysql",
    "performance_schema",
    "sys",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseKind {
    Postgres,
    MySql,
    /// 内置高校演示数据，无需数据库
    Demo,
}

impl FromStr for WarehouseKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "demo" | "memory" => Ok(Self::Demo),
            other => bail!("unsupported EXPLORER_DB_TYPE `{}` (expected postgres, mysql or demo)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub warehouse: WarehouseKind,
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub session_ttl: Duration,
    pub policy: FilterPolicy,
    pub excluded_schemas: Vec<String>,
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(v) => v.trim().parse().with_context(|| format!("invalid {}: `{}`", key, v)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let warehouse = match lookup("EXPLORER_DB_TYPE") {
            Some(v) if !v.trim().is_empty() => v.parse()?,
            // 没有配置数据库时退回演示数据
            _ if database_url.is_none() => WarehouseKind::Demo,
            _ => WarehouseKind::Postgres,
        };
        if warehouse != WarehouseKind::Demo && database_url.is_none() {
            bail!("DATABASE_URL must be set for {:?}", warehouse);
        }

        let defaults = FilterPolicy::default();
        let policy = FilterPolicy {
            column_limit: parse_or(&lookup, "EXPLORER_FILTER_COLUMN_LIMIT", defaults.column_limit)?,
            categorical_limit: parse_or(&lookup, "EXPLORER_CATEGORICAL_LIMIT", defaults.categorical_limit)?,
            distinct_threshold: defaults.distinct_threshold,
            exclude_keys: parse_or(&lookup, "EXPLORER_EXCLUDE_KEY_COLUMNS", defaults.exclude_keys)?,
        };

        let ttl_secs = parse_or(&lookup, "EXPLORER_SESSION_TTL_SECS", DEFAULT_SESSION_TTL.as_secs())?;
        if ttl_secs == 0 {
            bail!("EXPLORER_SESSION_TTL_SECS must be at least 1");
        }

        let excluded_schemas = match lookup("EXPLORER_EXCLUDED_SCHEMAS") {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_EXCLUDED_SCHEMAS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            warehouse,
            database_url,
            bind_addr: parse_or(&lookup, "EXPLORER_BIND_ADDR", DEFAULT_BIND_ADDR.parse()?)?,
            max_connections: parse_or(&lookup, "EXPLORER_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            session_ttl: Duration::from_secs(ttl_secs),
            policy,
            excluded_schemas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_demo_without_a_database() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.warehouse, WarehouseKind::Demo);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
        assert_eq!(config.policy, FilterPolicy::default());
        assert!(config.excluded_schemas.contains(&"pg_catalog".to_string()));
    }

    #[test]
    fn database_url_implies_postgres() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/warehouse")])).unwrap();
        assert_eq!(config.warehouse, WarehouseKind::Postgres);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("EXPLORER_DB_TYPE", "MySQL"),
            ("DATABASE_URL", "mysql://root@localhost/warehouse"),
            ("EXPLORER_BIND_ADDR", "127.0.0.1:8080"),
            ("EXPLORER_MAX_CONNECTIONS", "12"),
            ("EXPLORER_SESSION_TTL_SECS", "90"),
            ("EXPLORER_FILTER_COLUMN_LIMIT", "8"),
            ("EXPLORER_CATEGORICAL_LIMIT", "3"),
            ("EXPLORER_EXCLUDE_KEY_COLUMNS", "false"),
            ("EXPLORER_EXCLUDED_SCHEMAS", "sys, audit ,"),
        ]))
        .unwrap();
        assert_eq!(config.warehouse, WarehouseKind::MySql);
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.session_ttl, Duration::from_secs(90));
        assert_eq!(config.policy.column_limit, 8);
        assert_eq!(config.policy.categorical_limit, 3);
        assert!(!config.policy.exclude_keys);
        assert_eq!(config.excluded_schemas, vec!["sys", "audit"]);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[("EXPLORER_DB_TYPE", "oracle")])).is_err());
        assert!(Config::from_lookup(lookup(&[("EXPLORER_DB_TYPE", "postgres")])).is_err());
        let err = Config::from_lookup(lookup(&[("EXPLORER_MAX_CONNECTIONS", "many")])).unwrap_err();
        assert!(err.to_string().contains("EXPLORER_MAX_CONNECTIONS"));
        assert!(Config::from_lookup(lookup(&[("EXPLORER_SESSION_TTL_SECS", "0")])).is_err());
    }
}
