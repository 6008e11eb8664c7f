//! SQL Flavor：选择方言实现、标识符引号与占位符风格。

use crate::dialect::{
    Dialect, MySqlDialect, OracleDialect, PlaceholderStyle, PostgreSqlDialect, SqlServerDialect,
    SqliteDialect,
};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 支持的数据库后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flavor {
    #[default]
    MySQL,
    PostgreSQL,
    SQLite,
    SQLServer,
    Oracle,
}

impl Flavor {
    /// 全部后端，顺序即全局默认值的存储编码。
    pub const ALL: [Flavor; 5] = [
        Self::MySQL,
        Self::PostgreSQL,
        Self::SQLite,
        Self::SQLServer,
        Self::Oracle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::MySQL => "MySQL",
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLite => "SQLite",
            Self::SQLServer => "SQLServer",
            Self::Oracle => "Oracle",
        }
    }
}

static PROCESS_FLAVOR: AtomicU8 = AtomicU8::new(Flavor::MySQL as u8);
static PROCESS_FLAVOR_SCOPE: Mutex<()> = Mutex::new(());

fn decode(code: u8) -> Flavor {
    Flavor::ALL
        .get(usize::from(code))
        .copied()
        .unwrap_or_default()
}

/// 构建器未显式指定方言时使用的 Flavor。
pub fn default_flavor() -> Flavor {
    decode(PROCESS_FLAVOR.load(Ordering::Acquire))
}

/// 替换全局默认 Flavor，返回旧值。
pub fn set_default_flavor(flavor: Flavor) -> Flavor {
    decode(PROCESS_FLAVOR.swap(flavor as u8, Ordering::AcqRel))
}

/// 作用域内的默认 Flavor；drop 时恢复旧值并释放全局锁。
pub struct DefaultFlavorGuard {
    previous: Flavor,
    _scope: MutexGuard<'static, ()>,
}

impl Drop for DefaultFlavorGuard {
    fn drop(&mut self) {
        set_default_flavor(self.previous);
    }
}

pub fn set_default_flavor_scoped(flavor: Flavor) -> DefaultFlavorGuard {
    let scope = PROCESS_FLAVOR_SCOPE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    DefaultFlavorGuard {
        previous: set_default_flavor(flavor),
        _scope: scope,
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown flavor `{0}`")]
pub struct ParseFlavorError(pub String);

impl FromStr for Flavor {
    type Err = ParseFlavorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSQL),
            "sqlite" | "sqlite3" => Ok(Self::SQLite),
            "sqlserver" | "mssql" => Ok(Self::SQLServer),
            "oracle" => Ok(Self::Oracle),
            _ => Err(ParseFlavorError(s.to_string())),
        }
    }
}

impl Flavor {
    /// 为标识符加引号。
    pub fn quote(self, name: &str) -> String {
        match self {
            Self::MySQL => format!("`{name}`"),
            Self::SQLServer => format!("[{name}]"),
            Self::PostgreSQL | Self::SQLite | Self::Oracle => format!("\"{name}\""),
        }
    }

    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Self::MySQL | Self::SQLite => PlaceholderStyle::QuestionMark,
            Self::PostgreSQL => PlaceholderStyle::DollarNumbered,
            Self::SQLServer => PlaceholderStyle::AtNumbered,
            Self::Oracle => PlaceholderStyle::ColonNumbered,
        }
    }

    /// 该 Flavor 对应的方言实现。
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::MySQL => Box::new(MySqlDialect),
            Self::PostgreSQL => Box::new(PostgreSqlDialect),
            Self::SQLite => Box::new(SqliteDialect),
            Self::SQLServer => Box::new(SqlServerDialect),
            Self::Oracle => Box::new(OracleDialect),
        }
    }
}
