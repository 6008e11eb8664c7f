//! Field resolver：属性 -> 列 的映射元数据。
//!
//! - 实体模式：只接受 `TableMapping` 中声明过的属性。
//! - Map 模式：未声明的键按命名约定（`FieldMapperFunc`）直接当作列名。
//!
//! Rust 没有运行时反射，实体的取值/回写通过 `sql_entity!` 生成的 `RowAccess` 实现完成。

use crate::arg::SqlType;
use crate::error::UsageError;
use crate::field_mapper::{FieldMapperFunc, default_field_mapper};
use crate::value::SqlValue;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// 类型化的字段描述符，通常由 `sql_entity!` 生成为关联常量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    property: &'static str,
}

impl Field {
    pub const fn new(property: &'static str) -> Self {
        Self { property }
    }

    pub const fn property(&self) -> &'static str {
        self.property
    }
}

/// 可以作为字段引用的类型：字段描述符或字符串键。
pub trait FieldRef {
    fn property(&self) -> &str;
}

impl FieldRef for Field {
    fn property(&self) -> &str {
        self.property
    }
}

impl FieldRef for &str {
    fn property(&self) -> &str {
        self
    }
}

impl FieldRef for String {
    fn property(&self) -> &str {
        self
    }
}

impl FieldRef for &String {
    fn property(&self) -> &str {
        self
    }
}

/// 主键生成函数：插入前为空主键生成值。
pub type KeyGeneratorFunc = Arc<dyn Fn(&FieldMapping) -> Result<SqlValue, String> + Send + Sync>;

/// 主键生成策略。
#[derive(Clone)]
pub enum KeyPolicy {
    /// 插入前生成并写入行（仅当该字段为空时）。
    Before(KeyGeneratorFunc),
    /// 插入后通过 select-key 语句取回并写回行。
    After { select_key: String },
}

impl fmt::Debug for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before(_) => f.write_str("Before(..)"),
            Self::After { select_key } => f
                .debug_struct("After")
                .field("select_key", select_key)
                .finish(),
        }
    }
}

/// 单个属性的映射。
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub property: String,
    pub column: String,
    pub primary_key: bool,
    pub insert: bool,
    pub update: bool,
    pub sql_type: Option<SqlType>,
    pub type_handler: Option<String>,
    /// SELECT 列表中的列表达式，如 `AsText(loc)`。
    pub select_template: Option<String>,
    /// INSERT 的值表达式，如 `GeomFromText(?)`。
    pub insert_template: Option<String>,
    pub set_col_template: Option<String>,
    pub set_value_template: Option<String>,
    pub where_col_template: Option<String>,
    pub where_value_template: Option<String>,
    pub key_policy: Option<KeyPolicy>,
}

impl FieldMapping {
    pub fn new(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column: column.into(),
            primary_key: false,
            insert: true,
            update: true,
            sql_type: None,
            type_handler: None,
            select_template: None,
            insert_template: None,
            set_col_template: None,
            set_value_template: None,
            where_col_template: None,
            where_value_template: None,
            key_policy: None,
        }
    }

    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn insert(mut self, insert: bool) -> Self {
        self.insert = insert;
        self
    }

    pub fn update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn sql_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    pub fn type_handler(mut self, handler: impl Into<String>) -> Self {
        self.type_handler = Some(handler.into());
        self
    }

    pub fn select_template(mut self, template: impl Into<String>) -> Self {
        self.select_template = Some(template.into());
        self
    }

    pub fn insert_template(mut self, template: impl Into<String>) -> Self {
        self.insert_template = Some(template.into());
        self
    }

    pub fn set_col_template(mut self, template: impl Into<String>) -> Self {
        self.set_col_template = Some(template.into());
        self
    }

    pub fn set_value_template(mut self, template: impl Into<String>) -> Self {
        self.set_value_template = Some(template.into());
        self
    }

    pub fn where_col_template(mut self, template: impl Into<String>) -> Self {
        self.where_col_template = Some(template.into());
        self
    }

    pub fn where_value_template(mut self, template: impl Into<String>) -> Self {
        self.where_value_template = Some(template.into());
        self
    }

    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = Some(policy);
        self
    }
}

/// 表映射：表名 + 有序字段列表。
#[derive(Clone)]
pub struct TableMapping {
    catalog: Option<String>,
    schema: Option<String>,
    table: String,
    use_delimited: bool,
    map_mode: bool,
    mapper: FieldMapperFunc,
    fields: Vec<FieldMapping>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for TableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // mapper 无法 Debug
        f.debug_struct("TableMapping")
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("use_delimited", &self.use_delimited)
            .field("map_mode", &self.map_mode)
            .field("fields", &self.fields)
            .finish()
    }
}

impl TableMapping {
    /// 实体模式的表映射。
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: None,
            table: table.into(),
            use_delimited: false,
            map_mode: false,
            mapper: default_field_mapper(),
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Map 模式的表映射：任意键都按 mapper 解析为列。
    pub fn for_map(table: impl Into<String>) -> Self {
        let mut m = Self::new(table);
        m.map_mode = true;
        m
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// 所有标识符都加引号。
    pub fn delimited(mut self, use_delimited: bool) -> Self {
        self.use_delimited = use_delimited;
        self
    }

    pub fn with_mapper(mut self, mapper: FieldMapperFunc) -> Self {
        self.mapper = mapper;
        self
    }

    /// 追加字段；同名属性会被覆盖。
    pub fn with_field(mut self, field: FieldMapping) -> Self {
        match self.index.get(&field.property) {
            Some(&i) => self.fields[i] = field,
            None => {
                self.index.insert(field.property.clone(), self.fields.len());
                self.fields.push(field);
            }
        }
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn use_delimited(&self) -> bool {
        self.use_delimited
    }

    pub fn is_map_mode(&self) -> bool {
        self.map_mode
    }

    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn field(&self, property: &str) -> Option<&FieldMapping> {
        self.index.get(property).map(|&i| &self.fields[i])
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    /// 解析属性：声明过的字段直接返回，Map 模式下未声明的键按命名约定生成。
    pub fn resolve(&self, property: &str) -> Result<Cow<'_, FieldMapping>, UsageError> {
        if let Some(f) = self.field(property) {
            return Ok(Cow::Borrowed(f));
        }
        if self.map_mode {
            let column = (self.mapper)(property);
            return Ok(Cow::Owned(FieldMapping::new(property, column)));
        }
        Err(UsageError::NoSuchProperty(property.to_string()))
    }
}

/// 行访问：按属性名读取值、枚举属性、回写生成的主键。
pub trait RowAccess {
    /// `None` 表示行中没有这个属性。
    fn value_of(&self, property: &str) -> Option<SqlValue>;

    fn properties(&self) -> Vec<String>;

    /// 回写成功返回 `true`（属性存在且类型可转换）。
    fn write_back(&mut self, property: &str, value: SqlValue) -> bool;
}

/// 带有静态表映射的实体。
pub trait Entity: RowAccess {
    fn table_mapping() -> TableMapping;
}

impl RowAccess for BTreeMap<String, SqlValue> {
    fn value_of(&self, property: &str) -> Option<SqlValue> {
        self.get(property).cloned()
    }

    fn properties(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn write_back(&mut self, property: &str, value: SqlValue) -> bool {
        self.insert(property.to_string(), value);
        true
    }
}

/// 把 `SqlValue` 转回字段类型（用于主键回写）。
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: SqlValue) -> Option<Self>;
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        Some(value)
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        value.as_i64()
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromSqlValue for u64 {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::U64(v) => Some(v),
            SqlValue::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for u32 {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        u64::from_sql_value(value).and_then(|v| u32::try_from(v).ok())
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        if value.is_numeric() { value.as_f64() } else { None }
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bool(b) => Some(b),
            SqlValue::I64(v) => Some(v != 0),
            SqlValue::U64(v) => Some(v != 0),
            _ => None,
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::String(s) => Some(s.into_owned()),
            SqlValue::Null | SqlValue::Bytes(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl FromSqlValue for time::OffsetDateTime {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => Some(None),
            v => T::from_sql_value(v).map(Some),
        }
    }
}
