//! 语句注册表：加载期校验并保存语句定义、片段与宏，运行期按 id 求值。
//!
//! 注册是原子的：一批定义中任何一条校验失败，注册表保持原状。
//! 注册完成后只读，可在线程间共享（`Arc<Registry>`）。

use crate::arg::SqlType;
use crate::bound::BoundStatement;
use crate::dialect::Dialect;
use crate::error::{BindingError, DefinitionError, Result};
use crate::flavor::{Flavor, default_flavor};
use crate::node::{EvalEnv, Node, eval_nodes};
use crate::param::ParamContext;
use crate::render::SqlBuffer;
use crate::template::TextTemplate;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// 存储过程或其他语句。
    Execute,
}

/// select-key 在主语句之前还是之后执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyOrder {
    Before,
    #[default]
    After,
}

/// 取主键的附属语句。
#[derive(Debug, Clone, PartialEq)]
pub struct SelectKey {
    pub key_property: String,
    pub key_column: Option<String>,
    pub order: KeyOrder,
    pub result_type: Option<SqlType>,
    pub body: Vec<Node>,
}

impl SelectKey {
    pub fn new(key_property: impl Into<String>, order: KeyOrder, body: Vec<Node>) -> Self {
        Self {
            key_property: key_property.into(),
            key_column: None,
            order,
            result_type: None,
            body,
        }
    }

    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    pub fn result_type(mut self, sql_type: SqlType) -> Self {
        self.result_type = Some(sql_type);
        self
    }
}

/// 结果列 -> 属性 的映射声明，加载时校验可空性与类型兼容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMapping {
    pub property: String,
    pub column: String,
    pub property_type: SqlType,
    pub property_nullable: bool,
    pub column_type: Option<SqlType>,
    pub column_nullable: bool,
}

impl ResultMapping {
    pub fn new(property: impl Into<String>, column: impl Into<String>, property_type: SqlType) -> Self {
        Self {
            property: property.into(),
            column: column.into(),
            property_type,
            property_nullable: true,
            column_type: None,
            column_nullable: false,
        }
    }

    /// 属性不接受 null（如非 Option 的字段）。
    pub fn not_null(mut self) -> Self {
        self.property_nullable = false;
        self
    }

    pub fn column_type(mut self, sql_type: SqlType) -> Self {
        self.column_type = Some(sql_type);
        self
    }

    pub fn nullable_column(mut self) -> Self {
        self.column_nullable = true;
        self
    }
}

/// 一条已命名的语句定义。
#[derive(Debug, Clone, PartialEq)]
pub struct StatementDefinition {
    namespace: String,
    id: String,
    kind: StatementKind,
    body: Vec<Node>,
    result_type: Option<String>,
    result_mappings: Vec<ResultMapping>,
    timeout: Option<Duration>,
    fetch_size: Option<u32>,
    use_generated_keys: bool,
    key_property: Option<String>,
    key_column: Option<String>,
    select_key: Option<SelectKey>,
}

impl StatementDefinition {
    pub fn new(
        namespace: impl Into<String>,
        id: impl Into<String>,
        kind: StatementKind,
        body: Vec<Node>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            kind,
            body,
            result_type: None,
            result_mappings: Vec::new(),
            timeout: None,
            fetch_size: None,
            use_generated_keys: false,
            key_property: None,
            key_column: None,
            select_key: None,
        }
    }

    pub fn with_result_type(mut self, result_type: impl Into<String>) -> Self {
        self.result_type = Some(result_type.into());
        self
    }

    pub fn with_result_mapping(mut self, mapping: ResultMapping) -> Self {
        self.result_mappings.push(mapping);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    /// 由驱动回填自增主键。
    pub fn with_generated_keys(mut self, property: impl Into<String>, column: Option<String>) -> Self {
        self.use_generated_keys = true;
        self.key_property = Some(property.into());
        self.key_column = column;
        self
    }

    pub fn with_select_key(mut self, select_key: SelectKey) -> Self {
        self.select_key = Some(select_key);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `namespace.id`；命名空间为空时只有 id。
    pub fn qualified_id(&self) -> String {
        qualify(&self.namespace, &self.id)
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn body(&self) -> &[Node] {
        &self.body
    }

    pub fn result_type(&self) -> Option<&str> {
        self.result_type.as_deref()
    }

    pub fn result_mappings(&self) -> &[ResultMapping] {
        &self.result_mappings
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    pub fn use_generated_keys(&self) -> bool {
        self.use_generated_keys
    }

    pub fn key_property(&self) -> Option<&str> {
        self.key_property.as_deref()
    }

    pub fn key_column(&self) -> Option<&str> {
        self.key_column.as_deref()
    }

    pub fn select_key(&self) -> Option<&SelectKey> {
        self.select_key.as_ref()
    }

    /// 不经注册表求值（`include` / `macro` 不可用）。
    pub fn evaluate(&self, ctx: &ParamContext, dialect: &dyn Dialect) -> Result<BoundStatement> {
        evaluate_nodes(&self.body, &self.namespace, dialect, None, ctx)
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        for m in &self.result_mappings {
            if !m.property_nullable && m.column_nullable {
                return Err(DefinitionError::NullableConflict {
                    statement: self.qualified_id(),
                    property: m.property.clone(),
                    column: m.column.clone(),
                });
            }
            if let Some(column_type) = m.column_type {
                if !column_type.accepts(m.property_type) && !m.property_type.accepts(column_type) {
                    return Err(DefinitionError::IncompatibleType {
                        name: m.property.clone(),
                        declared: column_type,
                        actual: m.property_type,
                    });
                }
            }
        }
        Ok(())
    }
}

fn qualify(namespace: &str, id: &str) -> String {
    if namespace.is_empty() {
        id.to_string()
    } else {
        format!("{namespace}.{id}")
    }
}

fn evaluate_nodes(
    nodes: &[Node],
    namespace: &str,
    dialect: &dyn Dialect,
    registry: Option<&Registry>,
    ctx: &ParamContext,
) -> Result<BoundStatement> {
    let mut env = EvalEnv::new(dialect, registry, namespace);
    let mut out = SqlBuffer::new();
    eval_nodes(nodes, &mut env, ctx, &mut out)?;
    let (sql, args) = out.into_parts();
    Ok(BoundStatement::new(sql, args))
}

/// 语句、片段与宏的注册表。
#[derive(Clone)]
pub struct Registry {
    dialect: Box<dyn Dialect>,
    statements: HashMap<String, Arc<StatementDefinition>>,
    fragments: HashMap<String, Vec<Node>>,
    macros: HashMap<String, TextTemplate>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.statements.keys().collect();
        ids.sort();
        f.debug_struct("Registry")
            .field("flavor", &self.dialect.flavor())
            .field("statements", &ids)
            .field("fragments", &self.fragments.len())
            .field("macros", &self.macros.len())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// 使用当前默认 flavor 的方言。
    pub fn new() -> Self {
        Self::with_dialect(default_flavor().dialect())
    }

    pub fn for_flavor(flavor: Flavor) -> Self {
        Self::with_dialect(flavor.dialect())
    }

    pub fn with_dialect(dialect: Box<dyn Dialect>) -> Self {
        Self {
            dialect,
            statements: HashMap::new(),
            fragments: HashMap::new(),
            macros: HashMap::new(),
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn register(&mut self, definition: StatementDefinition) -> Result<(), DefinitionError> {
        self.register_all([definition])
    }

    /// 原子注册一批定义：先整体校验，全部通过后才写入。
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = StatementDefinition>,
    ) -> Result<(), DefinitionError> {
        let definitions: Vec<_> = definitions.into_iter().collect();
        let mut seen = HashSet::new();
        for def in &definitions {
            let id = def.qualified_id();
            if self.statements.contains_key(&id) || !seen.insert(id.clone()) {
                return Err(DefinitionError::DuplicateStatement(id));
            }
            def.validate()?;
        }
        for def in definitions {
            tracing::debug!(id = %def.qualified_id(), kind = ?def.kind(), "statement registered");
            self.statements.insert(def.qualified_id(), Arc::new(def));
        }
        Ok(())
    }

    /// 可被 `include` 引用的片段。
    pub fn register_fragment(
        &mut self,
        namespace: &str,
        id: &str,
        nodes: Vec<Node>,
    ) -> Result<(), DefinitionError> {
        let key = qualify(namespace, id);
        if self.fragments.contains_key(&key) {
            return Err(DefinitionError::DuplicateFragment(key));
        }
        self.fragments.insert(key, nodes);
        Ok(())
    }

    /// 可被 `@{macro, name}` 引用的文本宏。
    pub fn register_macro(&mut self, name: &str, text: &str) -> Result<(), DefinitionError> {
        if self.macros.contains_key(name) {
            return Err(DefinitionError::DuplicateMacro(name.to_string()));
        }
        let template = TextTemplate::parse(text)?;
        self.macros.insert(name.to_string(), template);
        Ok(())
    }

    pub fn statement(&self, id: &str) -> Option<Arc<StatementDefinition>> {
        self.statements.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.statements.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub(crate) fn fragment(&self, qualified: &str) -> Option<&[Node]> {
        self.fragments.get(qualified).map(Vec::as_slice)
    }

    pub(crate) fn macro_template(&self, name: &str) -> Option<&TextTemplate> {
        self.macros.get(name)
    }

    /// 按 id 求值，得到 SQL 与有序参数。
    pub fn evaluate(&self, id: &str, ctx: &ParamContext) -> Result<BoundStatement> {
        let def = self
            .statements
            .get(id)
            .ok_or_else(|| BindingError::UnknownStatement(id.to_string()))?;
        let bound = evaluate_nodes(&def.body, &def.namespace, self.dialect(), Some(self), ctx)?;
        tracing::debug!(id, sql = %bound.sql(), args = bound.values().len(), "statement evaluated");
        Ok(bound)
    }

    /// 求值语句附带的 select-key；没有时返回 `None`。
    pub fn evaluate_select_key(
        &self,
        id: &str,
        ctx: &ParamContext,
    ) -> Result<Option<(KeyOrder, BoundStatement)>> {
        let def = self
            .statements
            .get(id)
            .ok_or_else(|| BindingError::UnknownStatement(id.to_string()))?;
        let Some(key) = &def.select_key else {
            return Ok(None);
        };
        let bound = evaluate_nodes(&key.body, &def.namespace, self.dialect(), Some(self), ctx)?;
        Ok(Some((key.order, bound)))
    }
}
