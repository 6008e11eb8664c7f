//! 参数上下文：模板求值时只读的 名称 -> 值 查找表。

use crate::error::BindingError;
use crate::value::SqlValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// 上下文中的值：标量、列表或嵌套对象。
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Value(SqlValue),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    pub fn null() -> Self {
        Self::Value(SqlValue::Null)
    }

    pub fn value(v: impl Into<SqlValue>) -> Self {
        Self::Value(v.into())
    }

    pub fn list<T: Into<ParamValue>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(SqlValue::Null))
    }

    pub fn as_scalar(&self) -> Option<&SqlValue> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// 成员访问：对象按键取值。
    pub fn member(&self, key: &str) -> Option<&ParamValue> {
        match self {
            Self::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// 下标访问：列表按位置，对象按键。
    pub fn index(&self, key: &ParamValue) -> Option<&ParamValue> {
        match (self, key) {
            (Self::List(items), Self::Value(v)) => {
                let i = usize::try_from(v.as_i64()?).ok()?;
                items.get(i)
            }
            (Self::Map(m), Self::Value(SqlValue::String(k))) => m.get(k.as_ref()),
            (Self::Map(m), Self::Value(v)) => m.get(&v.to_string()),
            _ => None,
        }
    }
}

impl From<SqlValue> for ParamValue {
    fn from(v: SqlValue) -> Self {
        Self::Value(v)
    }
}

macro_rules! scalar_into_param {
    ($($t:ty),+ $(,)?) => {
        $(impl From<$t> for ParamValue {
            fn from(v: $t) -> Self {
                Self::Value(SqlValue::from(v))
            }
        })+
    };
}

scalar_into_param!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u16,
    u32,
    u64,
    f32,
    f64,
    char,
    String,
    &'static str,
    time::OffsetDateTime,
);

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        Self::list(items)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or_else(Self::null, Into::into)
    }
}

impl From<BTreeMap<String, ParamValue>> for ParamValue {
    fn from(m: BTreeMap<String, ParamValue>) -> Self {
        Self::Map(m)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => Self::null(),
            Value::Bool(b) => Self::value(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::value(i)
                } else if let Some(u) = n.as_u64() {
                    Self::value(u)
                } else {
                    Self::value(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::value(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(obj) => {
                Self::Map(obj.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// 名称查找：上下文与模板内部的局部作用域都实现它。
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<&ParamValue>;
}

/// 单次调用的参数上下文，构建后只读。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamContext {
    root: BTreeMap<String, ParamValue>,
}

/// 单个非对象参数在上下文中的名字。
pub const SINGLE_PARAMETER: &str = "_parameter";

impl ParamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.root.insert(name.into(), value.into());
        self
    }

    /// 位置参数：依次命名为 `arg0`, `arg1`, ...
    pub fn positional<T: Into<ParamValue>>(values: impl IntoIterator<Item = T>) -> Self {
        let root = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("arg{i}"), v.into()))
            .collect();
        Self { root }
    }

    /// 对象的字段成为顶层名字；非对象值以 `_parameter`/`arg0` 暴露。
    pub fn from_json(value: serde_json::Value) -> Self {
        match ParamValue::from(value) {
            ParamValue::Map(root) => Self { root },
            other => Self::new()
                .with(SINGLE_PARAMETER, other.clone())
                .with("arg0", other),
        }
    }

    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, BindingError> {
        let json = serde_json::to_value(value).map_err(|e| BindingError::Serialize(e.to_string()))?;
        Ok(Self::from_json(json))
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.root.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.root.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl Lookup for ParamContext {
    fn lookup(&self, name: &str) -> Option<&ParamValue> {
        self.root.get(name)
    }
}

/// 模板求值的局部作用域（bind / foreach 的绑定），查不到时交给上层。
pub(crate) struct Scope<'p> {
    parent: &'p dyn Lookup,
    vars: BTreeMap<String, ParamValue>,
}

impl<'p> Scope<'p> {
    pub(crate) fn new(parent: &'p dyn Lookup) -> Self {
        Self {
            parent,
            vars: BTreeMap::new(),
        }
    }

    pub(crate) fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.vars.insert(name.into(), value);
    }
}

impl Lookup for Scope<'_> {
    fn lookup(&self, name: &str) -> Option<&ParamValue> {
        self.vars.get(name).or_else(|| self.parent.lookup(name))
    }
}
