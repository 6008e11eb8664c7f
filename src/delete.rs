//! DeleteBuilder：构建 DELETE 语句。

use crate::bound::BoundStatement;
use crate::criteria::{Compare, Criteria};
use crate::dialect::Dialect;
use crate::error::{Result, UsageError};
use crate::flavor::{Flavor, default_flavor};
use crate::mapping::{Entity, TableMapping};
use crate::render::SqlBuffer;
use crate::value::SqlValue;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 没有条件的删除默认被拒绝，需要先调用 `allow_empty_where()`。
pub struct DeleteBuilder<R = BTreeMap<String, SqlValue>> {
    criteria: Criteria,
    allow_empty_where: bool,
    _row: PhantomData<fn() -> R>,
}

impl<R> Clone for DeleteBuilder<R> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            allow_empty_where: self.allow_empty_where,
            _row: PhantomData,
        }
    }
}

impl<R> fmt::Debug for DeleteBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteBuilder")
            .field("criteria", &self.criteria)
            .field("allow_empty_where", &self.allow_empty_where)
            .finish()
    }
}

impl<E: Entity> DeleteBuilder<E> {
    pub fn of() -> Self {
        Self::with_mapping(E::table_mapping())
    }
}

impl DeleteBuilder {
    pub fn for_map(mapping: TableMapping) -> Self {
        Self::with_mapping(mapping)
    }
}

impl<R> DeleteBuilder<R> {
    fn with_mapping(mapping: TableMapping) -> Self {
        Self {
            criteria: Criteria::new(Arc::new(mapping), default_flavor().dialect()),
            allow_empty_where: false,
            _row: PhantomData,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.criteria.dialect().flavor()
    }

    pub fn set_flavor(&mut self, flavor: Flavor) -> Flavor {
        self.criteria.set_dialect(flavor.dialect()).flavor()
    }

    pub fn set_dialect(&mut self, dialect: Box<dyn Dialect>) -> &mut Self {
        self.criteria.set_dialect(dialect);
        self
    }

    pub fn allow_empty_where(&mut self) -> &mut Self {
        self.allow_empty_where = true;
        self
    }

    pub fn bound_sql(&self) -> Result<BoundStatement> {
        if let Some(err) = self.criteria.error() {
            return Err(err.clone().into());
        }
        if self.criteria.is_empty() {
            if !self.allow_empty_where {
                return Err(UsageError::EmptyWhere("delete").into());
            }
            tracing::warn!(table = %self.criteria.mapping().table(), "deleting without a WHERE clause");
        }

        let dialect = self.criteria.dialect();
        let mapping = self.criteria.mapping();
        let mut out = SqlBuffer::new();
        out.push_str("DELETE FROM ");
        out.push_str(&dialect.table_name(
            mapping.use_delimited(),
            mapping.catalog(),
            mapping.schema(),
            mapping.table(),
        ));
        self.criteria.render_where(&mut out);

        let bound = out.into_bound();
        tracing::debug!(table = %mapping.table(), sql = %bound.sql(), args = bound.values().len(), "delete compiled");
        Ok(bound)
    }
}

impl<R> Compare for DeleteBuilder<R> {
    fn criteria(&mut self) -> &mut Criteria {
        &mut self.criteria
    }
}
