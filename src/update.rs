//! UpdateBuilder：构建 UPDATE 语句。
//!
//! 两道安全闸门：没有 WHERE 时需要 `allow_empty_where()`，
//! SET 中出现带值的主键时需要 `allow_update_key()`。

use crate::bound::BoundStatement;
use crate::criteria::{Compare, Criteria};
use crate::dialect::Dialect;
use crate::error::{Result, UsageError};
use crate::flavor::{Flavor, default_flavor};
use crate::mapping::{Entity, FieldMapping, FieldRef, RowAccess, TableMapping};
use crate::render::{SqlBuffer, ValueSlot, render_value};
use crate::value::SqlValue;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct UpdateBuilder<R = BTreeMap<String, SqlValue>> {
    criteria: Criteria,
    sets: Vec<(FieldMapping, SqlValue)>,
    allow_empty_where: bool,
    allow_update_key: bool,
    _row: PhantomData<fn() -> R>,
}

impl<R> Clone for UpdateBuilder<R> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            sets: self.sets.clone(),
            allow_empty_where: self.allow_empty_where,
            allow_update_key: self.allow_update_key,
            _row: PhantomData,
        }
    }
}

impl<R> fmt::Debug for UpdateBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateBuilder")
            .field("criteria", &self.criteria)
            .field("sets", &self.sets)
            .field("allow_empty_where", &self.allow_empty_where)
            .field("allow_update_key", &self.allow_update_key)
            .finish()
    }
}

impl<E: Entity> UpdateBuilder<E> {
    pub fn of() -> Self {
        Self::with_mapping(E::table_mapping())
    }
}

impl UpdateBuilder {
    pub fn for_map(mapping: TableMapping) -> Self {
        Self::with_mapping(mapping)
    }
}

impl<R: RowAccess> UpdateBuilder<R> {
    /// 样本中非 null 的可更新属性进入 SET。
    pub fn update_to_sample(&mut self, sample: &R) -> &mut Self {
        for property in self.candidates(sample) {
            match sample.value_of(&property) {
                Some(v) if !v.is_null() => {
                    self.update_to(property.as_str(), v);
                }
                _ => {}
            }
        }
        self
    }

    /// 所有可更新属性进入 SET，null 也写入。
    pub fn update_row(&mut self, row: &R) -> &mut Self {
        for property in self.candidates(row) {
            let value = row.value_of(&property).unwrap_or(SqlValue::Null);
            self.update_to(property.as_str(), value);
        }
        self
    }

    fn candidates(&self, row: &R) -> Vec<String> {
        let mapping = self.criteria.mapping();
        if mapping.is_map_mode() {
            row.properties()
        } else {
            mapping.fields().iter().map(|f| f.property.clone()).collect()
        }
    }
}

impl<R> UpdateBuilder<R> {
    fn with_mapping(mapping: TableMapping) -> Self {
        Self {
            criteria: Criteria::new(Arc::new(mapping), default_flavor().dialect()),
            sets: Vec::new(),
            allow_empty_where: false,
            allow_update_key: false,
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

    /// 允许没有 WHERE 的全表更新。
    pub fn allow_empty_where(&mut self) -> &mut Self {
        self.allow_empty_where = true;
        self
    }

    /// 允许 SET 主键列。
    pub fn allow_update_key(&mut self) -> &mut Self {
        self.allow_update_key = true;
        self
    }

    /// 设置单个列；同一属性再次设置时覆盖旧值，不可更新的列被忽略。
    pub fn update_to(&mut self, field: impl FieldRef, value: impl Into<SqlValue>) -> &mut Self {
        let value = value.into();
        let Some(field) = self.criteria.resolve(field.property()) else {
            return self;
        };
        if !field.update {
            tracing::trace!(property = %field.property, "column is not updatable, skipped");
            return self;
        }
        if let Some(slot) = self.sets.iter_mut().find(|(f, _)| f.property == field.property) {
            slot.1 = value;
            return self;
        }
        if self
            .sets
            .iter()
            .any(|(f, _)| f.column.eq_ignore_ascii_case(&field.column))
        {
            self.criteria.fail(UsageError::DuplicateColumn(field.column));
            return self;
        }
        self.sets.push((field, value));
        self
    }

    pub fn update_to_map(&mut self, values: &BTreeMap<String, SqlValue>) -> &mut Self {
        for (property, value) in values {
            self.update_to(property.as_str(), value.clone());
        }
        self
    }

    /// 清空已设置的列，条件保留。
    pub fn reset_update(&mut self) -> &mut Self {
        self.sets.clear();
        self
    }

    pub fn bound_sql(&self) -> Result<BoundStatement> {
        if let Some(err) = self.criteria.error() {
            return Err(err.clone().into());
        }
        if self.criteria.is_empty() {
            if !self.allow_empty_where {
                return Err(UsageError::EmptyWhere("update").into());
            }
            tracing::warn!(table = %self.criteria.mapping().table(), "updating without a WHERE clause");
        }

        let mut sets = Vec::with_capacity(self.sets.len());
        for (field, value) in &self.sets {
            if field.primary_key {
                // null 主键只是样本中未赋值，直接略过
                if value.is_null() {
                    continue;
                }
                if !self.allow_update_key {
                    return Err(UsageError::UpdateKey(field.property.clone()).into());
                }
                tracing::warn!(property = %field.property, "updating a primary key column");
            }
            sets.push((field, value));
        }
        if sets.is_empty() {
            return Err(UsageError::NothingToUpdate.into());
        }

        let dialect = self.criteria.dialect();
        let mapping = self.criteria.mapping();
        let q = mapping.use_delimited();
        let mut out = SqlBuffer::new();
        out.push_str("UPDATE ");
        out.push_str(&dialect.table_name(q, mapping.catalog(), mapping.schema(), mapping.table()));
        out.push_str(" SET ");
        for (i, (field, value)) in sets.into_iter().enumerate() {
            if i > 0 {
                out.push_str(" , ");
            }
            match &field.set_col_template {
                Some(t) => out.push_str(t),
                None => out.push_str(&dialect.fmt_name(q, &field.column)),
            }
            out.push_str(" = ");
            let slot = ValueSlot::for_field(field, field.set_value_template.as_deref());
            render_value(dialect, &slot, value.clone(), &mut out);
        }
        self.criteria.render_where(&mut out);

        let bound = out.into_bound();
        tracing::debug!(table = %mapping.table(), sql = %bound.sql(), args = bound.values().len(), "update compiled");
        Ok(bound)
    }
}

impl<R> Compare for UpdateBuilder<R> {
    fn criteria(&mut self) -> &mut Criteria {
        &mut self.criteria
    }
}
