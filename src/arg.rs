//! 参数模型：把原始值与目标 SQL 类型、参数模式绑在一起。

use crate::value::SqlValue;
use std::fmt;

/// 目标 SQL 类型（未声明时由值推断）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Null,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Binary,
    Blob,
    Clob,
    Date,
    Time,
    Timestamp,
    Geometry,
    Other,
}

impl SqlType {
    /// 根据值推断类型。
    pub fn infer(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => Self::Null,
            SqlValue::Bool(_) => Self::Boolean,
            SqlValue::I64(_) | SqlValue::U64(_) => Self::BigInt,
            SqlValue::F64(_) => Self::Double,
            SqlValue::String(_) => Self::Varchar,
            SqlValue::Bytes(_) => Self::Binary,
            SqlValue::DateTime(_) => Self::Timestamp,
        }
    }

    /// 按名称解析（大小写不敏感），未知名称返回 `None`。
    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name.trim().to_ascii_uppercase().as_str() {
            "NULL" => Self::Null,
            "BOOLEAN" | "BOOL" | "BIT" => Self::Boolean,
            "TINYINT" => Self::TinyInt,
            "SMALLINT" => Self::SmallInt,
            "INT" | "INTEGER" => Self::Integer,
            "BIGINT" => Self::BigInt,
            "FLOAT" | "REAL" => Self::Float,
            "DOUBLE" => Self::Double,
            "DECIMAL" | "NUMERIC" => Self::Decimal,
            "CHAR" | "NCHAR" => Self::Char,
            "VARCHAR" | "NVARCHAR" => Self::Varchar,
            "LONGVARCHAR" | "LONGNVARCHAR" => Self::LongVarchar,
            "BINARY" | "VARBINARY" => Self::Binary,
            "BLOB" => Self::Blob,
            "CLOB" | "NCLOB" => Self::Clob,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" | "DATETIME" => Self::Timestamp,
            "GEOMETRY" => Self::Geometry,
            "OTHER" => Self::Other,
            _ => return None,
        };
        Some(t)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::TinyInt
                | Self::SmallInt
                | Self::Integer
                | Self::BigInt
                | Self::Float
                | Self::Double
                | Self::Decimal
        )
    }

    pub fn is_textual(self) -> bool {
        matches!(self, Self::Char | Self::Varchar | Self::LongVarchar | Self::Clob)
    }

    /// 声明类型能否承载推断出的值类型（`Null`/`Other` 总是兼容）。
    pub fn accepts(self, actual: SqlType) -> bool {
        if self == actual || matches!(self, Self::Other) || matches!(actual, Self::Null) {
            return true;
        }
        match actual {
            Self::BigInt | Self::Double => self.is_numeric() || self.is_textual(),
            Self::Boolean => self == Self::Boolean || self.is_numeric(),
            Self::Varchar => self.is_textual() || self == Self::Geometry,
            Self::Binary => matches!(self, Self::Blob | Self::Geometry),
            Self::Timestamp => matches!(self, Self::Date | Self::Time),
            _ => false,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "NULL",
            Self::Boolean => "BOOLEAN",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Decimal => "DECIMAL",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::LongVarchar => "LONGVARCHAR",
            Self::Binary => "BINARY",
            Self::Blob => "BLOB",
            Self::Clob => "CLOB",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Geometry => "GEOMETRY",
            Self::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// 参数方向（存储过程使用 OUT/INOUT）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SqlMode {
    #[default]
    In,
    Out,
    InOut,
}

impl SqlMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(Self::In),
            "OUT" => Some(Self::Out),
            "INOUT" => Some(Self::InOut),
            _ => None,
        }
    }
}

/// 绑定参数：值 + 目标类型 + 来源名称。
#[derive(Debug, Clone, PartialEq)]
pub struct SqlArg {
    pub name: Option<String>,
    pub value: SqlValue,
    pub sql_type: SqlType,
    pub mode: SqlMode,
    pub type_handler: Option<String>,
}

impl SqlArg {
    pub fn new(value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        Self {
            name: None,
            sql_type: SqlType::infer(&value),
            value,
            mode: SqlMode::In,
            type_handler: None,
        }
    }

    pub fn typed(value: impl Into<SqlValue>, sql_type: SqlType) -> Self {
        let mut arg = Self::new(value);
        arg.sql_type = sql_type;
        arg
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mode(mut self, mode: SqlMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_type_handler(mut self, handler: impl Into<String>) -> Self {
        self.type_handler = Some(handler.into());
        self
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

impl From<SqlValue> for SqlArg {
    fn from(value: SqlValue) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn infer_follows_value_kind() {
        assert_eq!(SqlType::infer(&SqlValue::from(1_i32)), SqlType::BigInt);
        assert_eq!(SqlType::infer(&SqlValue::from("a")), SqlType::Varchar);
        assert_eq!(SqlType::infer(&SqlValue::Null), SqlType::Null);
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(SqlType::from_name("int"), Some(SqlType::Integer));
        assert_eq!(SqlType::from_name(" Varchar "), Some(SqlType::Varchar));
        assert_eq!(SqlType::from_name("jsonb"), None);
        assert_eq!(SqlMode::from_name("inout"), Some(SqlMode::InOut));
    }

    #[test]
    fn declared_type_compatibility() {
        assert!(SqlType::Integer.accepts(SqlType::BigInt));
        assert!(SqlType::Varchar.accepts(SqlType::BigInt));
        assert!(SqlType::Timestamp.accepts(SqlType::Null));
        assert!(!SqlType::Integer.accepts(SqlType::Binary));
        assert!(!SqlType::Boolean.accepts(SqlType::Timestamp));
    }

    #[test]
    fn typed_arg_keeps_declared_type() {
        let arg = SqlArg::typed("POINT(1 1)", SqlType::Geometry).with_name("loc");
        assert_eq!(arg.sql_type, SqlType::Geometry);
        assert_eq!(arg.name.as_deref(), Some("loc"));
        assert_eq!(arg.mode, SqlMode::In);
    }
}
