//! InsertBuilder：按表映射构建 INSERT 语句，支持批量、重复键策略与主键生成。
//!
//! 一行数据得到普通语句；两行及以上得到批量语句，SQL 只渲染一次，
//! 每行一组参数。

use crate::arg::SqlType;
use crate::bound::BoundStatement;
use crate::dialect::{Dialect, DuplicateStrategy, InsertTarget};
use crate::error::{Result, UsageError};
use crate::flavor::{Flavor, default_flavor};
use crate::mapping::{Entity, FieldMapping, KeyPolicy, RowAccess, TableMapping};
use crate::render::{ValueSlot, bind_arg, value_term};
use crate::value::SqlValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 执行 select-key 语句取回插入后生成的主键。
pub trait KeyExecutor {
    fn fetch_key(&mut self, select_key: &str, field: &FieldMapping) -> Result<SqlValue, String>;
}

impl<F> KeyExecutor for F
where
    F: FnMut(&str, &FieldMapping) -> Result<SqlValue, String>,
{
    fn fetch_key(&mut self, select_key: &str, field: &FieldMapping) -> Result<SqlValue, String> {
        self(select_key, field)
    }
}

#[derive(Debug, Clone)]
pub struct InsertBuilder<R = BTreeMap<String, SqlValue>> {
    mapping: Arc<TableMapping>,
    dialect: Box<dyn Dialect>,
    rows: Vec<R>,
    strategy: DuplicateStrategy,
    error: Option<UsageError>,
}

impl<E: Entity> InsertBuilder<E> {
    pub fn of() -> Self {
        Self::with_mapping(E::table_mapping())
    }

    pub fn apply_entity(&mut self, rows: impl IntoIterator<Item = E>) -> &mut Self {
        self.push_rows(rows)
    }
}

impl InsertBuilder {
    pub fn for_map(mapping: TableMapping) -> Self {
        Self::with_mapping(mapping)
    }

    pub fn apply_map(&mut self, rows: impl IntoIterator<Item = BTreeMap<String, SqlValue>>) -> &mut Self {
        self.push_rows(rows)
    }
}

impl<R: RowAccess> InsertBuilder<R> {
    fn with_mapping(mapping: TableMapping) -> Self {
        Self {
            mapping: Arc::new(mapping),
            dialect: default_flavor().dialect(),
            rows: Vec::new(),
            strategy: DuplicateStrategy::Into,
            error: None,
        }
    }

    fn fail(&mut self, err: UsageError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// 追加行；`KeyPolicy::Before` 的主键在这里为空值生成。
    fn push_rows(&mut self, rows: impl IntoIterator<Item = R>) -> &mut Self {
        for mut row in rows {
            if let Err(err) = pre_generate_keys(&self.mapping, &mut row) {
                self.fail(err);
            }
            self.rows.push(row);
        }
        self
    }

    pub fn flavor(&self) -> Flavor {
        self.dialect.flavor()
    }

    pub fn set_flavor(&mut self, flavor: Flavor) -> Flavor {
        std::mem::replace(&mut self.dialect, flavor.dialect()).flavor()
    }

    pub fn set_dialect(&mut self, dialect: Box<dyn Dialect>) -> &mut Self {
        self.dialect = dialect;
        self
    }

    pub fn on_duplicate(&mut self, strategy: DuplicateStrategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    /// 参与插入的列：实体模式取可插入的声明字段，Map 模式取所有行键的并集。
    fn columns(&self) -> Result<Vec<FieldMapping>, UsageError> {
        let mut columns: Vec<FieldMapping> = Vec::new();
        if self.mapping.is_map_mode() {
            let mut seen = Vec::new();
            for row in &self.rows {
                for property in row.properties() {
                    if seen.contains(&property) {
                        continue;
                    }
                    let field = self.mapping.resolve(&property)?.into_owned();
                    seen.push(property);
                    if field.insert {
                        columns.push(field);
                    }
                }
            }
        } else {
            columns.extend(self.mapping.fields().iter().filter(|f| f.insert).cloned());
        }

        for (i, field) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|f| f.column.eq_ignore_ascii_case(&field.column))
            {
                return Err(UsageError::DuplicateColumn(field.column.clone()));
            }
        }
        Ok(columns)
    }

    pub fn bound_sql(&self) -> Result<BoundStatement> {
        if let Some(err) = &self.error {
            return Err(err.clone().into());
        }
        if self.rows.is_empty() {
            return Err(UsageError::NoInsertData.into());
        }
        let fields = self.columns()?;
        if fields.is_empty() {
            return Err(UsageError::NoInsertColumn.into());
        }

        let dialect = self.dialect.as_ref();
        let columns: Vec<String> = fields.iter().map(|f| f.column.clone()).collect();
        let value_terms: Vec<String> = fields
            .iter()
            .map(|f| {
                let slot = ValueSlot::for_field(f, f.insert_template.as_deref());
                value_term(dialect, &slot, f.sql_type.unwrap_or(SqlType::Other)).to_string()
            })
            .collect();
        let primary_keys: Vec<String> = self.mapping.primary_keys().map(|f| f.column.clone()).collect();
        let target = InsertTarget {
            use_qualifier: self.mapping.use_delimited(),
            catalog: self.mapping.catalog(),
            schema: self.mapping.schema(),
            table: self.mapping.table(),
            primary_keys: &primary_keys,
            columns: &columns,
            value_terms: &value_terms,
        };
        let sql = dialect.insert_sql(self.strategy, &target)?;

        let mut rows: Vec<_> = self
            .rows
            .iter()
            .map(|row| {
                fields
                    .iter()
                    .map(|f| {
                        let value = row.value_of(&f.property).unwrap_or(SqlValue::Null);
                        bind_arg(&ValueSlot::for_field(f, None), value)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        tracing::debug!(table = %self.mapping.table(), sql = %sql, rows = rows.len(), "insert compiled");
        if rows.len() == 1 {
            let args = rows.pop().unwrap_or_default();
            Ok(BoundStatement::new(sql, args))
        } else {
            Ok(BoundStatement::batch(sql, rows))
        }
    }

    /// 插入执行之后调用：为 `KeyPolicy::After` 的空主键取回生成值并写回行。
    ///
    /// 返回写回的值的个数。
    pub fn fill_generated_keys(&mut self, executor: &mut impl KeyExecutor) -> Result<usize> {
        let pending: Vec<(FieldMapping, String)> = self
            .mapping
            .fields()
            .iter()
            .filter_map(|f| match &f.key_policy {
                Some(KeyPolicy::After { select_key }) => Some((f.clone(), select_key.clone())),
                _ => None,
            })
            .collect();

        let mut filled = 0;
        for row in &mut self.rows {
            for (field, select_key) in &pending {
                if row.value_of(&field.property).is_some_and(|v| !v.is_null()) {
                    continue;
                }
                let value = executor
                    .fetch_key(select_key, field)
                    .map_err(|message| UsageError::KeyGeneration {
                        property: field.property.clone(),
                        message,
                    })?;
                if !row.write_back(&field.property, value) {
                    return Err(UsageError::KeyGeneration {
                        property: field.property.clone(),
                        message: "generated value does not fit the property".to_string(),
                    }
                    .into());
                }
                filled += 1;
            }
        }
        tracing::debug!(table = %self.mapping.table(), filled, "generated keys written back");
        Ok(filled)
    }
}

fn pre_generate_keys(mapping: &TableMapping, row: &mut impl RowAccess) -> Result<(), UsageError> {
    for field in mapping.fields() {
        let Some(KeyPolicy::Before(generate)) = &field.key_policy else {
            continue;
        };
        if row.value_of(&field.property).is_some_and(|v| !v.is_null()) {
            continue;
        }
        let key_error = |message: String| UsageError::KeyGeneration {
            property: field.property.clone(),
            message,
        };
        let value = generate(field).map_err(key_error)?;
        if !row.write_back(&field.property, value) {
            return Err(key_error("generated value does not fit the property".to_string()));
        }
    }
    Ok(())
}
