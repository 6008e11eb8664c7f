//! 绑定参数的值模型。

use std::borrow::Cow;
use std::fmt;
use time::format_description::well_known::Rfc3339;

/// 绑定到占位符上的原始值。
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(Cow<'static, str>),
    Bytes(Vec<u8>),
    DateTime(time::OffsetDateTime),
}

impl SqlValue {
    /// `None` 即 SQL NULL。
    pub fn from_option<T: Into<SqlValue>>(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            Self::U64(v) => i64::try_from(*v).ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// 数值视图；字符串会尝试按数字解析（表达式比较时使用）。
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I64(v) => Some(*v as f64),
            Self::U64(v) => Some(*v as f64),
            Self::F64(v) => Some(*v),
            Self::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub(crate) fn is_numeric(&self) -> bool {
        matches!(self, Self::I64(_) | Self::U64(_) | Self::F64(_))
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::DateTime(dt) => {
                let s = dt.format(&Rfc3339).map_err(|_| fmt::Error)?;
                f.write_str(&s)
            }
        }
    }
}

/// `From<$t>` 转换表：每行给出源类型与构造表达式。
macro_rules! value_conversions {
    ($($t:ty => |$v:ident| $make:expr;)+) => {
        $(impl From<$t> for SqlValue {
            fn from($v: $t) -> Self {
                $make
            }
        })+
    };
}

value_conversions! {
    () => |_unit| SqlValue::Null;
    bool => |b| SqlValue::Bool(b);
    i8 => |n| SqlValue::I64(i64::from(n));
    i16 => |n| SqlValue::I64(i64::from(n));
    i32 => |n| SqlValue::I64(i64::from(n));
    i64 => |n| SqlValue::I64(n);
    u8 => |n| SqlValue::U64(u64::from(n));
    u16 => |n| SqlValue::U64(u64::from(n));
    u32 => |n| SqlValue::U64(u64::from(n));
    u64 => |n| SqlValue::U64(n);
    f32 => |n| SqlValue::F64(f64::from(n));
    f64 => |n| SqlValue::F64(n);
    char => |c| SqlValue::String(Cow::Owned(c.to_string()));
    String => |s| SqlValue::String(Cow::Owned(s));
    &'static str => |s| SqlValue::String(Cow::Borrowed(s));
    Vec<u8> => |bytes| SqlValue::Bytes(bytes);
    time::OffsetDateTime => |dt| SqlValue::DateTime(dt);
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        Self::from_option(v)
    }
}
