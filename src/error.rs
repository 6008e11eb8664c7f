//! 错误分类：加载期（定义）、求值期（绑定）、构造期（用法/安全闸门）。

use crate::arg::SqlType;
use crate::dialect::DuplicateStrategy;
use crate::flavor::Flavor;

/// 加载期错误：失败即整体失败，不做部分注册。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("statement `{0}` is already registered")]
    DuplicateStatement(String),
    #[error("fragment `{0}` is already registered")]
    DuplicateFragment(String),
    #[error("macro `{0}` is already registered")]
    DuplicateMacro(String),
    #[error(
        "property `{property}` of `{statement}` is not nullable but column `{column}` may be null"
    )]
    NullableConflict {
        statement: String,
        property: String,
        column: String,
    },
    #[error("`{name}` declares {declared} but is mapped from {actual}")]
    IncompatibleType {
        name: String,
        declared: SqlType,
        actual: SqlType,
    },
    #[error("template syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("invalid expression `{expr}`: {message}")]
    Expression { expr: String, message: String },
}

/// 求值期错误：只中断当前调用，不影响语句定义本身。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("parameter `{0}` is not present in the context")]
    Unresolved(String),
    #[error("parameter `{0}` is a collection and cannot be bound to a single placeholder")]
    NotScalar(String),
    #[error("`{0}` does not evaluate to a list or map")]
    NotIterable(String),
    #[error("fragment `{0}` is not registered")]
    UnknownFragment(String),
    #[error("macro `{0}` is not registered")]
    UnknownMacro(String),
    #[error("statement `{0}` is not registered")]
    UnknownStatement(String),
    #[error("fragment `{0}` includes itself")]
    RecursiveInclude(String),
    #[error("expression `{expr}` failed: {message}")]
    Expression { expr: String, message: String },
    #[error("parameter object cannot be converted: {0}")]
    Serialize(String),
}

/// 构造期错误：条件构造器的状态机与安全闸门。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("conditions must be added before group by / order by")]
    ConditionLocked,
    #[error("group by must be added before order by")]
    GroupByLocked,
    #[error("refusing to {0} every row without a WHERE clause, call allow_empty_where() first")]
    EmptyWhere(&'static str),
    #[error("there is nothing to update")]
    NothingToUpdate,
    #[error("primary key `{0}` can only be updated after allow_update_key()")]
    UpdateKey(String),
    #[error("no such property `{0}`")]
    NoSuchProperty(String),
    #[error("more than one property maps to column `{0}`")]
    DuplicateColumn(String),
    #[error("there is no data to insert")]
    NoInsertData,
    #[error("no column is writable by INSERT")]
    NoInsertColumn,
    #[error("{flavor} cannot render a {strategy} insert for this table")]
    UnsupportedStrategy {
        flavor: Flavor,
        strategy: DuplicateStrategy,
    },
    #[error("key generation for `{property}` failed: {message}")]
    KeyGeneration { property: String, message: String },
    #[error("IN list for `{0}` is empty")]
    EmptyInList(String),
    #[error("fragment `{sql}` has {placeholders} placeholders but {args} args")]
    ApplyArgs {
        sql: String,
        placeholders: usize,
        args: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Usage(#[from] UsageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
