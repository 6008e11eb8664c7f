//! halo-sql-compiler：动态 SQL 模板引擎与链式条件构造器。
//!
//! 两条入口最终都产出 [`BoundStatement`]（SQL 文本 + 有序参数）：
//! - [`Registry`] 注册模板语句，按参数上下文求值；
//! - [`QueryBuilder`]、[`UpdateBuilder`]、[`DeleteBuilder`]、[`InsertBuilder`]
//!   按表映射链式构造条件。
//!
//! 后端差异（分页、重复键、标识符引号、几何类型）由 [`Dialect`] 提供。

pub mod arg;
pub mod bound;
pub mod criteria;
pub mod delete;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod field_mapper;
pub mod flavor;
pub mod insert;
#[cfg(test)]
mod insert_tests;
mod macros;
pub mod mapping;
pub mod node;
#[cfg(test)]
mod node_tests;
pub mod page;
pub mod param;
pub mod registry;
#[cfg(test)]
mod registry_tests;
pub mod render;
pub mod select;
mod sql_text;
mod string_builder;
pub mod template;
pub mod update;
#[cfg(test)]
mod update_delete_tests;
pub mod value;

pub use crate::arg::{SqlArg, SqlMode, SqlType};
pub use crate::bound::{BoundArgs, BoundStatement};
pub use crate::criteria::{CompareOp, Compare, Connective, Criteria};
pub use crate::delete::DeleteBuilder;
pub use crate::dialect::{
    Dialect, DuplicateStrategy, InsertTarget, LikeMode, MySqlDialect, OracleDialect,
    PlaceholderStyle, PostgreSqlDialect, SqlServerDialect, SqliteDialect,
};
pub use crate::error::{BindingError, DefinitionError, Error, Result, UsageError};
pub use crate::expr::Expr;
pub use crate::field_mapper::{
    DefaultFieldMapperGuard, FieldMapperFunc, default_field_mapper, identity_mapper,
    set_default_field_mapper, set_default_field_mapper_scoped, snake_case_mapper,
};
pub use crate::flavor::{
    DefaultFlavorGuard, Flavor, ParseFlavorError, default_flavor, set_default_flavor,
    set_default_flavor_scoped,
};
pub use crate::insert::{InsertBuilder, KeyExecutor};
pub use crate::mapping::{
    Entity, Field, FieldMapping, FieldRef, FromSqlValue, KeyGeneratorFunc, KeyPolicy, RowAccess,
    TableMapping,
};
pub use crate::node::{Foreach, Node, Trim};
pub use crate::page::{Page, PageInfo};
pub use crate::param::{Lookup, ParamContext, ParamValue, SINGLE_PARAMETER};
pub use crate::registry::{
    KeyOrder, Registry, ResultMapping, SelectKey, StatementDefinition, StatementKind,
};
pub use crate::render::{SqlBuffer, ValueSlot};
pub use crate::select::{NullsOrder, QueryBuilder, SortOrder};
pub use crate::template::TextTemplate;
pub use crate::update::UpdateBuilder;
pub use crate::value::SqlValue;

/// 推荐的便捷命名空间：允许 `use halo_space::sqlcompiler::{...}` 形式导入。
pub mod sqlcompiler {
    pub use crate::*;
}

/// 兼容旧用法的便捷命名空间：仍可 `use halo_space::sqlx::{...}` 导入。
pub mod sqlx {
    pub use crate::*;
}
