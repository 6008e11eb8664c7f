//! 条件构造器：谓词树、连接词状态与 WHERE 渲染。
//!
//! 谓词只记录字段映射与原始值，渲染推迟到 `bound_sql()`，
//! 因此在构造过程中切换方言也能得到一致的结果。

use crate::arg::SqlArg;
use crate::dialect::{Dialect, LikeMode};
use crate::error::UsageError;
use crate::mapping::{FieldMapping, FieldRef, RowAccess, TableMapping};
use crate::render::{SqlBuffer, ValueSlot, where_column, render_value};
use crate::sql_text::count_placeholders;
use crate::value::SqlValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 两个相邻谓词之间的连接词。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connective {
    #[default]
    And,
    Or,
}

impl Connective {
    fn as_sql(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Compare {
        field: FieldMapping,
        op: CompareOp,
        value: SqlValue,
    },
    NullCheck {
        field: FieldMapping,
        is_null: bool,
    },
    InList {
        field: FieldMapping,
        negate: bool,
        values: Vec<SqlValue>,
    },
    Between {
        field: FieldMapping,
        negate: bool,
        low: SqlValue,
        high: SqlValue,
    },
    /// `( ? < col AND col <= ? )` 一类的区间。
    Range {
        field: FieldMapping,
        low_closed: bool,
        high_closed: bool,
        low: SqlValue,
        high: SqlValue,
    },
    Like {
        field: FieldMapping,
        mode: LikeMode,
        negate: bool,
        value: SqlValue,
    },
    Raw {
        sql: String,
        args: Vec<SqlArg>,
    },
    Group(Vec<Entry>),
}

#[derive(Debug, Clone)]
struct Entry {
    connective: Connective,
    negate: bool,
    predicate: Predicate,
}

/// 谓词树及其构造状态。
///
/// 同一个实例只能由一个调用方顺序使用；分组闭包拿到的是子树。
#[derive(Debug, Clone)]
pub struct Criteria {
    mapping: Arc<TableMapping>,
    dialect: Box<dyn Dialect>,
    entries: Vec<Entry>,
    next: Connective,
    negate_next: bool,
    locked: bool,
    error: Option<UsageError>,
}

impl Criteria {
    pub fn new(mapping: Arc<TableMapping>, dialect: Box<dyn Dialect>) -> Self {
        Self {
            mapping,
            dialect,
            entries: Vec::new(),
            next: Connective::And,
            negate_next: false,
            locked: false,
            error: None,
        }
    }

    pub fn mapping(&self) -> &TableMapping {
        &self.mapping
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn set_dialect(&mut self, dialect: Box<dyn Dialect>) -> Box<dyn Dialect> {
        std::mem::replace(&mut self.dialect, dialect)
    }

    /// 进入 GROUP BY / ORDER BY 之后不再接受谓词。
    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }

    /// 记录第一个错误，后续错误忽略。
    pub(crate) fn fail(&mut self, err: UsageError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub(crate) fn error(&self) -> Option<&UsageError> {
        self.error.as_ref()
    }

    pub(crate) fn resolve(&mut self, property: &str) -> Option<FieldMapping> {
        match self.mapping.resolve(property) {
            Ok(f) => Some(f.into_owned()),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn child(&self) -> Self {
        Self::new(self.mapping.clone(), self.dialect.clone())
    }

    fn push(&mut self, predicate: Predicate) {
        if self.locked {
            self.fail(UsageError::ConditionLocked);
            return;
        }
        let entry = Entry {
            connective: std::mem::take(&mut self.next),
            negate: std::mem::take(&mut self.negate_next),
            predicate,
        };
        self.entries.push(entry);
    }

    /// 解析字段后追加谓词；解析失败时只记录错误。
    fn push_field(&mut self, property: &str, build: impl FnOnce(FieldMapping) -> Predicate) {
        match self.resolve(property) {
            Some(field) => self.push(build(field)),
            None => self.reset_pending(),
        }
    }

    fn reset_pending(&mut self) {
        self.next = Connective::And;
        self.negate_next = false;
    }

    pub(crate) fn connect(&mut self, connective: Connective) {
        self.next = connective;
    }

    pub(crate) fn negate(&mut self) {
        self.negate_next = true;
    }

    pub(crate) fn compare(&mut self, property: &str, op: CompareOp, value: SqlValue) {
        // 与 null 比较没有意义，改写为 IS [NOT] NULL
        match (op, value.is_null()) {
            (CompareOp::Eq, true) => self.null_check(property, true),
            (CompareOp::Ne, true) => self.null_check(property, false),
            _ => self.push_field(property, |field| Predicate::Compare { field, op, value }),
        }
    }

    pub(crate) fn null_check(&mut self, property: &str, is_null: bool) {
        self.push_field(property, |field| Predicate::NullCheck { field, is_null });
    }

    pub(crate) fn in_list(&mut self, property: &str, negate: bool, values: Vec<SqlValue>) {
        if values.is_empty() {
            self.fail(UsageError::EmptyInList(property.to_string()));
            self.reset_pending();
            return;
        }
        self.push_field(property, |field| Predicate::InList {
            field,
            negate,
            values,
        });
    }

    pub(crate) fn between(&mut self, property: &str, negate: bool, low: SqlValue, high: SqlValue) {
        self.push_field(property, |field| Predicate::Between {
            field,
            negate,
            low,
            high,
        });
    }

    pub(crate) fn range(
        &mut self,
        property: &str,
        negate: bool,
        (low_closed, high_closed): (bool, bool),
        low: SqlValue,
        high: SqlValue,
    ) {
        if negate {
            self.negate();
        }
        self.push_field(property, |field| Predicate::Range {
            field,
            low_closed,
            high_closed,
            low,
            high,
        });
    }

    pub(crate) fn like(&mut self, property: &str, mode: LikeMode, negate: bool, value: SqlValue) {
        self.push_field(property, |field| Predicate::Like {
            field,
            mode,
            negate,
            value,
        });
    }

    pub(crate) fn raw(&mut self, sql: &str, args: Vec<SqlValue>) {
        let placeholders = count_placeholders(sql);
        if placeholders != args.len() {
            self.fail(UsageError::ApplyArgs {
                sql: sql.to_string(),
                placeholders,
                args: args.len(),
            });
            return;
        }
        self.push(Predicate::Raw {
            sql: sql.to_string(),
            args: args.into_iter().map(SqlArg::new).collect(),
        });
    }

    /// 在子树中构造一组条件，整体加括号追加；空组直接丢弃。
    pub(crate) fn group(&mut self, connective: Option<Connective>, negate: bool, build: impl FnOnce(&mut Criteria)) {
        let mut child = self.child();
        build(&mut child);
        if let Some(err) = child.error {
            self.fail(err);
            self.reset_pending();
            return;
        }
        if child.entries.is_empty() {
            self.reset_pending();
            return;
        }
        if let Some(c) = connective {
            self.connect(c);
        }
        if negate {
            self.negate();
        }
        self.push(Predicate::Group(child.entries));
    }

    /// 按样本的非 null 属性生成一组等值条件。
    pub(crate) fn eq_by_sample(&mut self, row: &dyn RowAccess) {
        let properties: Vec<String> = if self.mapping.is_map_mode() {
            row.properties()
        } else {
            self.mapping.fields().iter().map(|f| f.property.clone()).collect()
        };
        self.group(None, false, |c| {
            for property in properties {
                match row.value_of(&property) {
                    Some(v) if !v.is_null() => c.compare(&property, CompareOp::Eq, v),
                    _ => {}
                }
            }
        });
    }

    /// 追加 ` WHERE ...`；没有谓词时什么都不写。
    pub(crate) fn render_where(&self, out: &mut SqlBuffer) {
        if self.entries.is_empty() {
            return;
        }
        out.push_str(" WHERE ");
        self.render_entries(&self.entries, out);
    }

    fn render_entries(&self, entries: &[Entry], out: &mut SqlBuffer) {
        for (i, entry) in entries.iter().enumerate() {
            // 括号后的第一项不带连接词
            if i > 0 {
                out.push_str(entry.connective.as_sql());
            }
            if entry.negate {
                out.push_str("NOT ");
            }
            self.render_predicate(&entry.predicate, out);
        }
    }

    fn render_predicate(&self, predicate: &Predicate, out: &mut SqlBuffer) {
        let dialect = self.dialect.as_ref();
        let q = self.mapping.use_delimited();
        match predicate {
            Predicate::Compare { field, op, value } => {
                out.push_str(&where_column(dialect, q, field));
                out.push_str(" ");
                out.push_str(op.as_str());
                out.push_str(" ");
                self.write_value(field, value.clone(), out);
            }
            Predicate::NullCheck { field, is_null } => {
                out.push_str(&where_column(dialect, q, field));
                out.push_str(if *is_null { " IS NULL" } else { " IS NOT NULL" });
            }
            Predicate::InList { field, negate, values } => {
                out.push_str(&where_column(dialect, q, field));
                out.push_str(if *negate { " NOT IN ( " } else { " IN ( " });
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" , ");
                    }
                    self.write_value(field, v.clone(), out);
                }
                out.push_str(" )");
            }
            Predicate::Between { field, negate, low, high } => {
                out.push_str(&where_column(dialect, q, field));
                out.push_str(if *negate { " NOT BETWEEN " } else { " BETWEEN " });
                self.write_value(field, low.clone(), out);
                out.push_str(" AND ");
                self.write_value(field, high.clone(), out);
            }
            Predicate::Range {
                field,
                low_closed,
                high_closed,
                low,
                high,
            } => {
                let column = where_column(dialect, q, field);
                out.push_str("( ");
                self.write_value(field, low.clone(), out);
                out.push_str(if *low_closed { " <= " } else { " < " });
                out.push_str(&column);
                out.push_str(" AND ");
                out.push_str(&column);
                out.push_str(if *high_closed { " <= " } else { " < " });
                self.write_value(field, high.clone(), out);
                out.push_str(" )");
            }
            Predicate::Like {
                field,
                mode,
                negate,
                value,
            } => {
                out.push_str(&where_column(dialect, q, field));
                out.push_str(if *negate { " NOT LIKE " } else { " LIKE " });
                let slot = ValueSlot::for_field(field, Some(dialect.like_term(*mode)));
                render_value(dialect, &slot, value.clone(), out);
            }
            Predicate::Raw { sql, args } => out.push_fragment(sql, args.iter().cloned()),
            Predicate::Group(entries) => {
                out.push_str("( ");
                self.render_entries(entries, out);
                out.push_str(" )");
            }
        }
    }

    fn write_value(&self, field: &FieldMapping, value: SqlValue, out: &mut SqlBuffer) {
        let slot = ValueSlot::for_field(field, field.where_value_template.as_deref());
        render_value(self.dialect.as_ref(), &slot, value, out);
    }
}

/// 谓词方法集合：查询、更新、删除构造器与分组闭包共用。
///
/// 所有方法都返回 `&mut Self` 以便链式调用；用法错误在 `bound_sql()` 时报告。
pub trait Compare {
    fn criteria(&mut self) -> &mut Criteria;

    /// 下一个谓词用 AND 连接（默认）。
    fn and(&mut self) -> &mut Self {
        self.criteria().connect(Connective::And);
        self
    }

    /// 下一个谓词用 OR 连接，之后恢复为 AND。
    fn or(&mut self) -> &mut Self {
        self.criteria().connect(Connective::Or);
        self
    }

    /// 对下一个谓词取反。
    fn not(&mut self) -> &mut Self {
        self.criteria().negate();
        self
    }

    fn eq(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().compare(field.property(), CompareOp::Eq, value.into());
        self
    }

    fn eq_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.eq(field, value);
        }
        self
    }

    fn ne(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().compare(field.property(), CompareOp::Ne, value.into());
        self
    }

    fn ne_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.ne(field, value);
        }
        self
    }

    fn gt(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().compare(field.property(), CompareOp::Gt, value.into());
        self
    }

    fn gt_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.gt(field, value);
        }
        self
    }

    fn ge(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().compare(field.property(), CompareOp::Ge, value.into());
        self
    }

    fn ge_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.ge(field, value);
        }
        self
    }

    fn lt(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().compare(field.property(), CompareOp::Lt, value.into());
        self
    }

    fn lt_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.lt(field, value);
        }
        self
    }

    fn le(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().compare(field.property(), CompareOp::Le, value.into());
        self
    }

    fn le_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.le(field, value);
        }
        self
    }

    fn is_null(&mut self, field: impl FieldRef) -> &mut Self {
        self.criteria().null_check(field.property(), true);
        self
    }

    fn is_null_if(&mut self, test: bool, field: impl FieldRef) -> &mut Self {
        if test {
            self.is_null(field);
        }
        self
    }

    fn is_not_null(&mut self, field: impl FieldRef) -> &mut Self {
        self.criteria().null_check(field.property(), false);
        self
    }

    fn is_not_null_if(&mut self, test: bool, field: impl FieldRef) -> &mut Self {
        if test {
            self.is_not_null(field);
        }
        self
    }

    fn in_<V: Into<SqlValue>>(&mut self, field: impl FieldRef, values: impl IntoIterator<Item = V>) -> &mut Self {
        let values = values.into_iter().map(Into::into).collect();
        self.criteria().in_list(field.property(), false, values);
        self
    }

    fn in_if<V: Into<SqlValue>>(
        &mut self,
        test: bool,
        field: impl FieldRef,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        if test {
            self.in_(field, values);
        }
        self
    }

    fn not_in<V: Into<SqlValue>>(&mut self, field: impl FieldRef, values: impl IntoIterator<Item = V>) -> &mut Self {
        let values = values.into_iter().map(Into::into).collect();
        self.criteria().in_list(field.property(), true, values);
        self
    }

    fn not_in_if<V: Into<SqlValue>>(
        &mut self,
        test: bool,
        field: impl FieldRef,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        if test {
            self.not_in(field, values);
        }
        self
    }

    fn between(
        &mut self,
        field: impl FieldRef,
        low: impl Into<SqlValue>,
        high: impl Into<SqlValue>,
    ) -> &mut Self {
        self.criteria().between(field.property(), false, low.into(), high.into());
        self
    }

    fn between_if(
        &mut self,
        test: bool,
        field: impl FieldRef,
        low: impl Into<SqlValue>,
        high: impl Into<SqlValue>,
    ) -> &mut Self {
        if test {
            self.between(field, low, high);
        }
        self
    }

    fn not_between(
        &mut self,
        field: impl FieldRef,
        low: impl Into<SqlValue>,
        high: impl Into<SqlValue>,
    ) -> &mut Self {
        self.criteria().between(field.property(), true, low.into(), high.into());
        self
    }

    fn not_between_if(
        &mut self,
        test: bool,
        field: impl FieldRef,
        low: impl Into<SqlValue>,
        high: impl Into<SqlValue>,
    ) -> &mut Self {
        if test {
            self.not_between(field, low, high);
        }
        self
    }

    /// `low < field < high`
    fn range_open_open(&mut self, field: impl FieldRef, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> &mut Self {
        self.criteria().range(field.property(), false, (false, false), low.into(), high.into());
        self
    }

    /// `low < field <= high`
    fn range_open_closed(&mut self, field: impl FieldRef, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> &mut Self {
        self.criteria().range(field.property(), false, (false, true), low.into(), high.into());
        self
    }

    /// `low <= field < high`
    fn range_closed_open(&mut self, field: impl FieldRef, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> &mut Self {
        self.criteria().range(field.property(), false, (true, false), low.into(), high.into());
        self
    }

    /// `low <= field <= high`
    fn range_closed_closed(&mut self, field: impl FieldRef, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> &mut Self {
        self.criteria().range(field.property(), false, (true, true), low.into(), high.into());
        self
    }

    fn range_not_open_open(&mut self, field: impl FieldRef, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> &mut Self {
        self.criteria().range(field.property(), true, (false, false), low.into(), high.into());
        self
    }

    fn range_not_open_closed(&mut self, field: impl FieldRef, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> &mut Self {
        self.criteria().range(field.property(), true, (false, true), low.into(), high.into());
        self
    }

    fn range_not_closed_open(&mut self, field: impl FieldRef, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> &mut Self {
        self.criteria().range(field.property(), true, (true, false), low.into(), high.into());
        self
    }

    fn range_not_closed_closed(&mut self, field: impl FieldRef, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> &mut Self {
        self.criteria().range(field.property(), true, (true, true), low.into(), high.into());
        self
    }

    /// 包含：`%value%`
    fn like(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().like(field.property(), LikeMode::Contains, false, value.into());
        self
    }

    fn like_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.like(field, value);
        }
        self
    }

    fn not_like(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().like(field.property(), LikeMode::Contains, true, value.into());
        self
    }

    fn not_like_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.not_like(field, value);
        }
        self
    }

    /// 前缀：`value%`
    fn like_right(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().like(field.property(), LikeMode::StartsWith, false, value.into());
        self
    }

    fn like_right_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.like_right(field, value);
        }
        self
    }

    fn not_like_right(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().like(field.property(), LikeMode::StartsWith, true, value.into());
        self
    }

    fn not_like_right_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.not_like_right(field, value);
        }
        self
    }

    /// 后缀：`%value`
    fn like_left(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().like(field.property(), LikeMode::EndsWith, false, value.into());
        self
    }

    fn like_left_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.like_left(field, value);
        }
        self
    }

    fn not_like_left(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        self.criteria().like(field.property(), LikeMode::EndsWith, true, value.into());
        self
    }

    fn not_like_left_if(&mut self, test: bool, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        if test {
            self.not_like_left(field, value);
        }
        self
    }

    /// 原样追加一段 SQL，`?` 的数量必须与参数个数一致。
    fn apply<V: Into<SqlValue>>(&mut self, sql: &str, args: impl IntoIterator<Item = V>) -> &mut Self {
        let args = args.into_iter().map(Into::into).collect();
        self.criteria().raw(sql, args);
        self
    }

    /// 样本中非 null 的属性逐一做等值比较，整体作为一组。
    fn eq_by_sample(&mut self, sample: &dyn RowAccess) -> &mut Self {
        self.criteria().eq_by_sample(sample);
        self
    }

    fn eq_by_map(&mut self, sample: &BTreeMap<String, SqlValue>) -> &mut Self {
        self.criteria().eq_by_sample(sample);
        self
    }

    /// 括号分组，沿用当前连接词。
    fn nested(&mut self, build: impl FnOnce(&mut Criteria)) -> &mut Self {
        self.criteria().group(None, false, build);
        self
    }

    fn and_nested(&mut self, build: impl FnOnce(&mut Criteria)) -> &mut Self {
        self.criteria().group(Some(Connective::And), false, build);
        self
    }

    fn or_nested(&mut self, build: impl FnOnce(&mut Criteria)) -> &mut Self {
        self.criteria().group(Some(Connective::Or), false, build);
        self
    }

    fn not_nested(&mut self, build: impl FnOnce(&mut Criteria)) -> &mut Self {
        self.criteria().group(None, true, build);
        self
    }
}

impl Compare for Criteria {
    fn criteria(&mut self) -> &mut Criteria {
        self
    }
}
