//! QueryBuilder：按表映射构建 SELECT 语句。
//!
//! 子句顺序固定为 WHERE、GROUP BY、ORDER BY、分页；构造器只追加，
//! 因此进入 GROUP BY 后不再接受谓词，进入 ORDER BY 后不再接受 GROUP BY。

use crate::bound::BoundStatement;
use crate::criteria::{Compare, Criteria};
use crate::dialect::Dialect;
use crate::error::{Result, UsageError};
use crate::flavor::{Flavor, default_flavor};
use crate::mapping::{Entity, FieldMapping, FieldRef, TableMapping};
use crate::page::Page;
use crate::render::SqlBuffer;
use crate::value::SqlValue;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 排序方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => " ASC",
            Self::Desc => " DESC",
        }
    }
}

/// NULL 值在排序中的位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

impl NullsOrder {
    fn as_sql(self) -> &'static str {
        match self {
            Self::First => " NULLS FIRST",
            Self::Last => " NULLS LAST",
        }
    }
}

#[derive(Debug, Clone)]
enum SelectItem {
    Field(FieldMapping),
    Raw(String),
}

#[derive(Debug, Clone)]
struct OrderItem {
    field: FieldMapping,
    order: Option<SortOrder>,
    nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Where,
    GroupBy,
    OrderBy,
}

/// SELECT 构造器。
///
/// `R` 是行类型：实体模式下为实体本身，Map 模式下为 `BTreeMap<String, SqlValue>`。
/// 构造器是单调用方的累加器，不要在多个调用方之间共享。
pub struct QueryBuilder<R = BTreeMap<String, SqlValue>> {
    criteria: Criteria,
    select: Vec<SelectItem>,
    group_by: Vec<FieldMapping>,
    order_by: Vec<OrderItem>,
    stage: Stage,
    page: Page,
    _row: PhantomData<fn() -> R>,
}

impl<R> Clone for QueryBuilder<R> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            select: self.select.clone(),
            group_by: self.group_by.clone(),
            order_by: self.order_by.clone(),
            stage: self.stage,
            page: self.page,
            _row: PhantomData,
        }
    }
}

impl<R> fmt::Debug for QueryBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("criteria", &self.criteria)
            .field("select", &self.select)
            .field("group_by", &self.group_by)
            .field("order_by", &self.order_by)
            .field("page", &self.page)
            .finish()
    }
}

impl<E: Entity> QueryBuilder<E> {
    /// 实体模式：使用实体声明的表映射。
    pub fn of() -> Self {
        Self::with_mapping(E::table_mapping())
    }
}

impl QueryBuilder {
    /// Map 模式：通常配合 `TableMapping::for_map`，未声明的键按映射函数推导列名。
    pub fn for_map(mapping: TableMapping) -> Self {
        Self::with_mapping(mapping)
    }
}

impl<R> QueryBuilder<R> {
    fn with_mapping(mapping: TableMapping) -> Self {
        Self {
            criteria: Criteria::new(Arc::new(mapping), default_flavor().dialect()),
            select: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            stage: Stage::Where,
            page: Page::default(),
            _row: PhantomData,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.criteria.dialect().flavor()
    }

    /// 切换方言，返回之前的 flavor。
    pub fn set_flavor(&mut self, flavor: Flavor) -> Flavor {
        self.criteria.set_dialect(flavor.dialect()).flavor()
    }

    pub fn set_dialect(&mut self, dialect: Box<dyn Dialect>) -> &mut Self {
        self.criteria.set_dialect(dialect);
        self
    }

    /// 替换查询列。
    pub fn select<F: FieldRef>(&mut self, fields: impl IntoIterator<Item = F>) -> &mut Self {
        self.select.clear();
        self.select_add(fields)
    }

    pub fn select_add<F: FieldRef>(&mut self, fields: impl IntoIterator<Item = F>) -> &mut Self {
        for field in fields {
            if let Some(f) = self.criteria.resolve(field.property()) {
                self.select.push(SelectItem::Field(f));
            }
        }
        self
    }

    /// 用原样文本替换查询列，如 `count(*) AS total`。
    pub fn apply_select(&mut self, sql: impl Into<String>) -> &mut Self {
        self.select.clear();
        self.apply_select_add(sql)
    }

    pub fn apply_select_add(&mut self, sql: impl Into<String>) -> &mut Self {
        self.select.push(SelectItem::Raw(sql.into()));
        self
    }

    /// 恢复为 `SELECT *`。
    pub fn select_all(&mut self) -> &mut Self {
        self.select.clear();
        self
    }

    pub fn group_by<F: FieldRef>(&mut self, fields: impl IntoIterator<Item = F>) -> &mut Self {
        if self.stage > Stage::GroupBy {
            self.criteria.fail(UsageError::GroupByLocked);
            return self;
        }
        self.stage = Stage::GroupBy;
        self.criteria.lock();
        for field in fields {
            if let Some(f) = self.criteria.resolve(field.property()) {
                self.group_by.push(f);
            }
        }
        self
    }

    /// 不带方向的排序，使用数据库默认顺序。
    pub fn order_by<F: FieldRef>(&mut self, fields: impl IntoIterator<Item = F>) -> &mut Self {
        self.push_order(fields, None, None)
    }

    pub fn asc<F: FieldRef>(&mut self, fields: impl IntoIterator<Item = F>) -> &mut Self {
        self.push_order(fields, Some(SortOrder::Asc), None)
    }

    pub fn desc<F: FieldRef>(&mut self, fields: impl IntoIterator<Item = F>) -> &mut Self {
        self.push_order(fields, Some(SortOrder::Desc), None)
    }

    pub fn order_by_nulls(&mut self, field: impl FieldRef, order: SortOrder, nulls: NullsOrder) -> &mut Self {
        self.push_order([field], Some(order), Some(nulls))
    }

    fn push_order<F: FieldRef>(
        &mut self,
        fields: impl IntoIterator<Item = F>,
        order: Option<SortOrder>,
        nulls: Option<NullsOrder>,
    ) -> &mut Self {
        self.stage = Stage::OrderBy;
        self.criteria.lock();
        for field in fields {
            if let Some(field) = self.criteria.resolve(field.property()) {
                self.order_by.push(OrderItem { field, order, nulls });
            }
        }
        self
    }

    /// 开启分页：页码从 0 开始，`page_size <= 0` 表示不分页。
    pub fn init_page(&mut self, page_size: i64, page_number: i64) -> &mut Self {
        self.page = Page::new(page_size, page_number);
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    pub fn bound_sql(&self) -> Result<BoundStatement> {
        let (sql, args) = self.render(true)?.into_parts();
        let dialect = self.criteria.dialect();
        let (sql, args) = if self.page.is_enabled() {
            dialect.page_sql(sql, args, self.page.first_record_position(), self.page.page_size())
        } else {
            (sql, args)
        };
        tracing::debug!(table = %self.criteria.mapping().table(), sql = %sql, args = args.len(), "query compiled");
        Ok(BoundStatement::new(sql, args))
    }

    /// 统计语句：包裹不含排序与分页的查询。
    pub fn count_bound_sql(&self) -> Result<BoundStatement> {
        let (sql, args) = self.render(false)?.into_parts();
        let sql = self.criteria.dialect().count_sql(&sql);
        tracing::debug!(table = %self.criteria.mapping().table(), sql = %sql, args = args.len(), "count query compiled");
        Ok(BoundStatement::new(sql, args))
    }

    fn render(&self, with_order: bool) -> Result<SqlBuffer, UsageError> {
        if let Some(err) = self.criteria.error() {
            return Err(err.clone());
        }
        let dialect = self.criteria.dialect();
        let mapping = self.criteria.mapping();
        let q = mapping.use_delimited();

        let mut out = SqlBuffer::new();
        out.push_str("SELECT ");
        if self.select.is_empty() {
            out.push_str("*");
        } else {
            let items: Vec<String> = self
                .select
                .iter()
                .map(|item| match item {
                    SelectItem::Field(f) => select_column(dialect, q, f),
                    SelectItem::Raw(sql) => sql.clone(),
                })
                .collect();
            out.push_str(&items.join(" , "));
        }
        out.push_str(" FROM ");
        out.push_str(&dialect.table_name(q, mapping.catalog(), mapping.schema(), mapping.table()));
        self.criteria.render_where(&mut out);

        if !self.group_by.is_empty() {
            let cols: Vec<String> = self
                .group_by
                .iter()
                .map(|f| dialect.fmt_name(q, &f.column))
                .collect();
            out.push_str(" GROUP BY ");
            out.push_str(&cols.join(" , "));
        }
        if with_order && !self.order_by.is_empty() {
            let cols: Vec<String> = self
                .order_by
                .iter()
                .map(|item| {
                    let mut col = dialect.fmt_name(q, &item.field.column);
                    if let Some(order) = item.order {
                        col.push_str(order.as_sql());
                    }
                    if let Some(nulls) = item.nulls {
                        col.push_str(nulls.as_sql());
                    }
                    col
                })
                .collect();
            out.push_str(" ORDER BY ");
            out.push_str(&cols.join(" , "));
        }
        Ok(out)
    }
}

impl<R> Compare for QueryBuilder<R> {
    fn criteria(&mut self) -> &mut Criteria {
        &mut self.criteria
    }
}

/// 查询列：显式模板原样使用；被方言包装过的列补上别名。
fn select_column(dialect: &dyn Dialect, use_qualifier: bool, field: &FieldMapping) -> String {
    if let Some(t) = &field.select_template {
        return t.clone();
    }
    let column = dialect.fmt_name(use_qualifier, &field.column);
    match field.sql_type {
        Some(t) => {
            let read = dialect.read_column(t, &column);
            if read == column {
                column
            } else {
                format!("{read} AS {column}")
            }
        }
        None => column,
    }
}
