//! 值渲染：模板引擎与条件构造器写入占位符的唯一入口。
//!
//! 类型推断、模板包装（如 `GeomFromText(?)`）与参数收集都在这里完成，
//! 两条路径因此得到一致的结果。

use crate::arg::{SqlArg, SqlMode, SqlType};
use crate::bound::BoundStatement;
use crate::dialect::Dialect;
use crate::mapping::FieldMapping;
use crate::value::SqlValue;

/// 一个值要写入的位置及其声明信息。
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueSlot<'a> {
    pub name: Option<&'a str>,
    pub sql_type: Option<SqlType>,
    pub mode: SqlMode,
    pub type_handler: Option<&'a str>,
    /// 自定义值表达式，内含一个 `?`。
    pub template: Option<&'a str>,
}

impl<'a> ValueSlot<'a> {
    pub fn named(name: &'a str) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    /// 以字段映射声明的类型写入；`template` 由调用方按读/写场景选择。
    pub fn for_field(field: &'a FieldMapping, template: Option<&'a str>) -> Self {
        Self {
            name: Some(&field.property),
            sql_type: field.sql_type,
            mode: SqlMode::In,
            type_handler: field.type_handler.as_deref(),
            template,
        }
    }
}

/// 累积中的 SQL 文本与参数。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlBuffer {
    sql: String,
    args: Vec<SqlArg>,
}

impl SqlBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[SqlArg] {
        &self.args
    }

    pub fn push_str(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    /// 追加带 `?` 的片段及其参数（`apply` 之类的原样片段）。
    pub fn push_fragment(&mut self, sql: &str, args: impl IntoIterator<Item = SqlArg>) {
        self.sql.push_str(sql);
        self.args.extend(args);
    }

    /// 需要时补一个空格，避免与前一段文本粘连。
    pub fn separate(&mut self) {
        if self.sql.chars().next_back().is_some_and(|c| !c.is_whitespace()) {
            self.sql.push(' ');
        }
    }

    pub fn append(&mut self, other: SqlBuffer) {
        self.sql.push_str(&other.sql);
        self.args.extend(other.args);
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty() && self.args.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<SqlArg>) {
        (self.sql, self.args)
    }

    pub fn into_bound(self) -> BoundStatement {
        BoundStatement::new(self.sql, self.args)
    }
}

/// 把一个值渲染为占位符（或包装后的占位符）并收集参数。
pub fn render_value(dialect: &dyn Dialect, slot: &ValueSlot<'_>, value: SqlValue, out: &mut SqlBuffer) {
    let arg = bind_arg(slot, value);
    out.sql.push_str(value_term(dialect, slot, arg.sql_type));
    out.args.push(arg);
}

/// 值在 SQL 中的写法：显式模板优先，其次是方言的类型包装，否则为 `?`。
pub fn value_term<'a>(dialect: &dyn Dialect, slot: &ValueSlot<'a>, sql_type: SqlType) -> &'a str {
    slot.template
        .or_else(|| dialect.write_term(sql_type))
        .unwrap_or("?")
}

/// 按声明（或推断）的类型生成参数。
pub fn bind_arg(slot: &ValueSlot<'_>, value: SqlValue) -> SqlArg {
    let sql_type = slot.sql_type.unwrap_or_else(|| SqlType::infer(&value));
    SqlArg {
        name: slot.name.map(str::to_string),
        value,
        sql_type,
        mode: slot.mode,
        type_handler: slot.type_handler.map(str::to_string),
    }
}

/// WHERE 中的列表达式：显式模板优先，否则为裸列名。
///
/// 类型包装只作用于值一侧（`loc = GeomFromText(?)`），读取包装留给 SELECT 列表。
pub fn where_column(dialect: &dyn Dialect, use_qualifier: bool, field: &FieldMapping) -> String {
    match &field.where_col_template {
        Some(t) => t.clone(),
        None => dialect.fmt_name(use_qualifier, &field.column),
    }
}
