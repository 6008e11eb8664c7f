//! 方言：分页、重复键插入、标识符引号、LIKE 拼接与几何类型包装。
//!
//! 构造器在创建时注入一个 `Box<dyn Dialect>`，编译阶段只通过 trait 取规则，
//! 不在构造器内部按后端分支。

use crate::arg::{SqlArg, SqlType};
use crate::error::UsageError;
use crate::flavor::Flavor;
use crate::sql_text::has_top_level_order_by;
use crate::string_builder::StringBuilder;
use std::fmt;

/// SQL 占位符风格。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`（MySQL/SQLite）。
    QuestionMark,
    /// `$1, $2, ...`（PostgreSQL）。
    DollarNumbered,
    /// `@p1, @p2, ...`（SQL Server）。
    AtNumbered,
    /// `:1, :2, ...`（Oracle）。
    ColonNumbered,
}

impl PlaceholderStyle {
    pub(crate) fn write_placeholder(self, index_1_based: usize, out: &mut String) {
        match self {
            Self::QuestionMark => out.push('?'),
            Self::DollarNumbered => {
                out.push('$');
                out.push_str(&index_1_based.to_string());
            }
            Self::AtNumbered => {
                out.push_str("@p");
                out.push_str(&index_1_based.to_string());
            }
            Self::ColonNumbered => {
                out.push(':');
                out.push_str(&index_1_based.to_string());
            }
        }
    }
}

/// LIKE 匹配方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LikeMode {
    /// `%v%`
    Contains,
    /// `v%`
    StartsWith,
    /// `%v`
    EndsWith,
}

/// 插入时遇到重复键的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DuplicateStrategy {
    /// 普通插入，冲突时由数据库报错。
    #[default]
    Into,
    /// 冲突时忽略该行。
    Ignore,
    /// 冲突时用新值覆盖。
    Update,
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Into => "INTO",
            Self::Ignore => "IGNORE",
            Self::Update => "UPDATE",
        })
    }
}

/// 生成 INSERT 语句所需的表与列信息，`value_terms` 与 `columns` 一一对应。
#[derive(Debug, Clone, Copy)]
pub struct InsertTarget<'a> {
    pub use_qualifier: bool,
    pub catalog: Option<&'a str>,
    pub schema: Option<&'a str>,
    pub table: &'a str,
    pub primary_keys: &'a [String],
    pub columns: &'a [String],
    pub value_terms: &'a [String],
}

const COMMON_KEYWORDS: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "column", "delete", "desc", "distinct",
    "from", "group", "having", "in", "index", "insert", "into", "is", "join", "key", "like",
    "limit", "not", "null", "or", "order", "select", "set", "table", "to", "union", "update",
    "user", "values", "where",
];

/// 后端相关的渲染规则。
pub trait Dialect: dyn_clone::DynClone + fmt::Debug + Send + Sync {
    fn flavor(&self) -> Flavor;

    fn keywords(&self) -> &'static [&'static str] {
        COMMON_KEYWORDS
    }

    /// 需要时为标识符加引号：表要求定界符，或名字是保留字。
    fn fmt_name(&self, use_qualifier: bool, name: &str) -> String {
        let lower = name.to_ascii_lowercase();
        if use_qualifier || self.keywords().contains(&lower.as_str()) {
            self.flavor().quote(name)
        } else {
            name.to_string()
        }
    }

    fn table_name(
        &self,
        use_qualifier: bool,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: &str,
    ) -> String {
        let mut parts = Vec::with_capacity(3);
        for part in [catalog, schema].into_iter().flatten() {
            if !part.is_empty() {
                parts.push(self.fmt_name(use_qualifier, part));
            }
        }
        parts.push(self.fmt_name(use_qualifier, table));
        parts.join(".")
    }

    /// LIKE 右侧的值表达式，内含一个 `?`。
    fn like_term(&self, mode: LikeMode) -> &'static str {
        match mode {
            LikeMode::Contains => "'%' || ? || '%'",
            LikeMode::StartsWith => "? || '%'",
            LikeMode::EndsWith => "'%' || ?",
        }
    }

    /// 为查询追加分页，返回新的 SQL 与参数。
    fn page_sql(
        &self,
        sql: String,
        args: Vec<SqlArg>,
        start: i64,
        limit: i64,
    ) -> (String, Vec<SqlArg>);

    fn count_sql(&self, sql: &str) -> String {
        format!("SELECT COUNT(*) FROM ({sql}) TEMP_T")
    }

    fn supports(&self, strategy: DuplicateStrategy, primary_keys: &[String]) -> bool;

    /// 只在 `supports` 为真时调用。
    fn render_insert(&self, strategy: DuplicateStrategy, target: &InsertTarget<'_>) -> String;

    fn insert_sql(
        &self,
        strategy: DuplicateStrategy,
        target: &InsertTarget<'_>,
    ) -> Result<String, UsageError> {
        if !self.supports(strategy, target.primary_keys) {
            return Err(UsageError::UnsupportedStrategy {
                flavor: self.flavor(),
                strategy,
            });
        }
        Ok(self.render_insert(strategy, target))
    }

    /// 写入时的值包装（如几何类型），`None` 表示直接使用 `?`。
    fn write_term(&self, _sql_type: SqlType) -> Option<&'static str> {
        None
    }

    /// SELECT 列表中的读取包装；WHERE 中的列保持原样。
    fn read_column(&self, _sql_type: SqlType, column: &str) -> String {
        column.to_string()
    }
}

dyn_clone::clone_trait_object!(Dialect);

fn limit_offset(
    mut sql: String,
    mut args: Vec<SqlArg>,
    start: i64,
    limit: i64,
) -> (String, Vec<SqlArg>) {
    if limit > 0 {
        sql.push_str(" LIMIT ?");
        args.push(SqlArg::new(limit));
    }
    if start > 0 {
        sql.push_str(" OFFSET ?");
        args.push(SqlArg::new(start));
    }
    (sql, args)
}

fn insert_values<D: Dialect + ?Sized>(
    dialect: &D,
    head: &str,
    target: &InsertTarget<'_>,
    tail: &str,
) -> String {
    let q = target.use_qualifier;
    let names = target.columns.iter().map(|c| dialect.fmt_name(q, c));
    let mut buf = StringBuilder::new();
    buf.push(head)
        .push_spaced(&dialect.table_name(q, target.catalog, target.schema, target.table))
        .push(" (")
        .push_joined(names, ", ")
        .push(") VALUES (")
        .push_joined(target.value_terms, ", ")
        .push(")")
        .push(tail);
    buf.finish()
}


#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn flavor(&self) -> Flavor {
        Flavor::MySQL
    }

    fn like_term(&self, mode: LikeMode) -> &'static str {
        match mode {
            LikeMode::Contains => "CONCAT('%', ? ,'%')",
            LikeMode::StartsWith => "CONCAT( ? ,'%')",
            LikeMode::EndsWith => "CONCAT('%', ? )",
        }
    }

    fn page_sql(
        &self,
        mut sql: String,
        mut args: Vec<SqlArg>,
        start: i64,
        limit: i64,
    ) -> (String, Vec<SqlArg>) {
        if start <= 0 {
            sql.push_str(" LIMIT ?");
            args.push(SqlArg::new(limit));
        } else {
            sql.push_str(" LIMIT ?, ?");
            args.push(SqlArg::new(start));
            args.push(SqlArg::new(limit));
        }
        (sql, args)
    }

    fn supports(&self, _strategy: DuplicateStrategy, _primary_keys: &[String]) -> bool {
        true
    }

    fn render_insert(&self, strategy: DuplicateStrategy, target: &InsertTarget<'_>) -> String {
        match strategy {
            DuplicateStrategy::Into => insert_values(self, "INSERT INTO", target, ""),
            DuplicateStrategy::Ignore => insert_values(self, "INSERT IGNORE INTO", target, ""),
            DuplicateStrategy::Update => {
                let sets: Vec<String> = target
                    .columns
                    .iter()
                    .map(|c| {
                        let name = self.fmt_name(target.use_qualifier, c);
                        format!("{name} = VALUES({name})")
                    })
                    .collect();
                let tail = format!(" ON DUPLICATE KEY UPDATE {}", sets.join(", "));
                insert_values(self, "INSERT INTO", target, &tail)
            }
        }
    }

    fn write_term(&self, sql_type: SqlType) -> Option<&'static str> {
        (sql_type == SqlType::Geometry).then_some("GeomFromText(?)")
    }

    fn read_column(&self, sql_type: SqlType, column: &str) -> String {
        match sql_type {
            SqlType::Geometry => format!("AsText({column})"),
            _ => column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgreSqlDialect;

impl Dialect for PostgreSqlDialect {
    fn flavor(&self) -> Flavor {
        Flavor::PostgreSQL
    }

    fn page_sql(
        &self,
        sql: String,
        args: Vec<SqlArg>,
        start: i64,
        limit: i64,
    ) -> (String, Vec<SqlArg>) {
        limit_offset(sql, args, start, limit)
    }

    fn supports(&self, strategy: DuplicateStrategy, primary_keys: &[String]) -> bool {
        strategy != DuplicateStrategy::Update || !primary_keys.is_empty()
    }

    fn render_insert(&self, strategy: DuplicateStrategy, target: &InsertTarget<'_>) -> String {
        let q = target.use_qualifier;
        match strategy {
            DuplicateStrategy::Into => insert_values(self, "INSERT INTO", target, ""),
            DuplicateStrategy::Ignore => {
                insert_values(self, "INSERT INTO", target, " ON CONFLICT DO NOTHING")
            }
            DuplicateStrategy::Update => {
                let keys: Vec<String> =
                    target.primary_keys.iter().map(|k| self.fmt_name(q, k)).collect();
                let names: Vec<String> =
                    target.columns.iter().map(|c| self.fmt_name(q, c)).collect();
                let excluded: Vec<String> =
                    names.iter().map(|n| format!("EXCLUDED.{n}")).collect();
                let tail = format!(
                    " ON CONFLICT ({}) DO UPDATE SET ({}) = ({})",
                    keys.join(", "),
                    names.join(", "),
                    excluded.join(", ")
                );
                insert_values(self, "INSERT INTO", target, &tail)
            }
        }
    }

    fn write_term(&self, sql_type: SqlType) -> Option<&'static str> {
        (sql_type == SqlType::Geometry).then_some("ST_GeomFromText(?)")
    }

    fn read_column(&self, sql_type: SqlType, column: &str) -> String {
        match sql_type {
            SqlType::Geometry => format!("ST_AsText({column})"),
            _ => column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn flavor(&self) -> Flavor {
        Flavor::SQLite
    }

    fn page_sql(
        &self,
        sql: String,
        args: Vec<SqlArg>,
        start: i64,
        limit: i64,
    ) -> (String, Vec<SqlArg>) {
        limit_offset(sql, args, start, limit)
    }

    fn supports(&self, _strategy: DuplicateStrategy, _primary_keys: &[String]) -> bool {
        true
    }

    fn render_insert(&self, strategy: DuplicateStrategy, target: &InsertTarget<'_>) -> String {
        let head = match strategy {
            DuplicateStrategy::Into => "INSERT INTO",
            DuplicateStrategy::Ignore => "INSERT OR IGNORE INTO",
            DuplicateStrategy::Update => "INSERT OR REPLACE INTO",
        };
        insert_values(self, head, target, "")
    }

    fn write_term(&self, sql_type: SqlType) -> Option<&'static str> {
        (sql_type == SqlType::Geometry).then_some("GeomFromText(?)")
    }

    fn read_column(&self, sql_type: SqlType, column: &str) -> String {
        match sql_type {
            SqlType::Geometry => format!("AsText({column})"),
            _ => column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn flavor(&self) -> Flavor {
        Flavor::SQLServer
    }

    fn like_term(&self, mode: LikeMode) -> &'static str {
        match mode {
            LikeMode::Contains => "'%' + ? + '%'",
            LikeMode::StartsWith => "? + '%'",
            LikeMode::EndsWith => "'%' + ?",
        }
    }

    fn page_sql(
        &self,
        mut sql: String,
        mut args: Vec<SqlArg>,
        start: i64,
        limit: i64,
    ) -> (String, Vec<SqlArg>) {
        // OFFSET/FETCH 必须跟在 ORDER BY 之后
        if !has_top_level_order_by(&sql) {
            sql.push_str(" ORDER BY 1");
        }
        sql.push_str(" OFFSET ? ROWS FETCH NEXT ? ROWS ONLY");
        args.push(SqlArg::new(start.max(0)));
        args.push(SqlArg::new(limit));
        (sql, args)
    }

    fn supports(&self, strategy: DuplicateStrategy, _primary_keys: &[String]) -> bool {
        strategy == DuplicateStrategy::Into
    }

    fn render_insert(&self, _strategy: DuplicateStrategy, target: &InsertTarget<'_>) -> String {
        insert_values(self, "INSERT INTO", target, "")
    }

    fn write_term(&self, sql_type: SqlType) -> Option<&'static str> {
        (sql_type == SqlType::Geometry).then_some("geometry::STGeomFromText(?, 0)")
    }

    fn read_column(&self, sql_type: SqlType, column: &str) -> String {
        match sql_type {
            SqlType::Geometry => format!("{column}.STAsText()"),
            _ => column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl OracleDialect {
    fn merge_head(&self, target: &InsertTarget<'_>) -> String {
        let q = target.use_qualifier;
        let selected = target
            .columns
            .iter()
            .zip(target.value_terms)
            .map(|(c, term)| format!("{term} {}", self.fmt_name(q, c)));
        let on = target.primary_keys.iter().map(|k| {
            let k = self.fmt_name(q, k);
            format!("TMP.{k} = SRC.{k}")
        });
        let mut buf = StringBuilder::new();
        buf.push("MERGE INTO ")
            .push(&self.table_name(q, target.catalog, target.schema, target.table))
            .push(" TMP USING (SELECT ")
            .push_joined(selected, ", ")
            .push(" FROM dual) SRC ON (")
            .push_joined(on, " AND ")
            .push(") ");
        buf.finish()
    }

    /// 全部列都是主键时没有可更新的列，省略 WHEN MATCHED。
    fn merge_when_matched(&self, target: &InsertTarget<'_>) -> String {
        let q = target.use_qualifier;
        let sets: Vec<String> = target
            .columns
            .iter()
            .filter(|c| !target.primary_keys.contains(*c))
            .map(|c| {
                let c = self.fmt_name(q, c);
                format!("{c} = SRC.{c}")
            })
            .collect();
        if sets.is_empty() {
            return String::new();
        }
        format!("WHEN MATCHED THEN UPDATE SET {} ", sets.join(", "))
    }

    fn merge_when_not_matched(&self, target: &InsertTarget<'_>) -> String {
        let q = target.use_qualifier;
        let names: Vec<String> = target.columns.iter().map(|c| self.fmt_name(q, c)).collect();
        let src: Vec<String> = names.iter().map(|n| format!("SRC.{n}")).collect();
        format!(
            "WHEN NOT MATCHED THEN INSERT ({}) VALUES ( {})",
            names.join(", "),
            src.join(", ")
        )
    }
}

impl Dialect for OracleDialect {
    fn flavor(&self) -> Flavor {
        Flavor::Oracle
    }

    fn like_term(&self, mode: LikeMode) -> &'static str {
        match mode {
            LikeMode::Contains => "CONCAT(CONCAT('%', ? ) ,'%')",
            LikeMode::StartsWith => "CONCAT( ? ,'%')",
            LikeMode::EndsWith => "CONCAT('%', ? )",
        }
    }

    fn page_sql(
        &self,
        sql: String,
        mut args: Vec<SqlArg>,
        start: i64,
        limit: i64,
    ) -> (String, Vec<SqlArg>) {
        if start <= 0 {
            args.push(SqlArg::new(limit));
            return (format!("SELECT * FROM ( {sql} ) WHERE ROWNUM <= ?"), args);
        }
        args.push(SqlArg::new(start.saturating_add(limit)));
        args.push(SqlArg::new(start));
        let sql = format!(
            "SELECT * FROM ( SELECT TMP.*, ROWNUM ROW_ID FROM ( {sql} ) TMP WHERE ROWNUM <= ? ) WHERE ROW_ID > ?"
        );
        (sql, args)
    }

    fn supports(&self, strategy: DuplicateStrategy, primary_keys: &[String]) -> bool {
        strategy == DuplicateStrategy::Into || !primary_keys.is_empty()
    }

    fn render_insert(&self, strategy: DuplicateStrategy, target: &InsertTarget<'_>) -> String {
        match strategy {
            DuplicateStrategy::Into => insert_values(self, "INSERT INTO", target, ""),
            DuplicateStrategy::Ignore => {
                self.merge_head(target) + &self.merge_when_not_matched(target)
            }
            DuplicateStrategy::Update => {
                self.merge_head(target)
                    + &self.merge_when_matched(target)
                    + &self.merge_when_not_matched(target)
            }
        }
    }

    fn write_term(&self, sql_type: SqlType) -> Option<&'static str> {
        (sql_type == SqlType::Geometry).then_some("SDO_UTIL.FROM_WKTGEOMETRY(?)")
    }

    fn read_column(&self, sql_type: SqlType, column: &str) -> String {
        match sql_type {
            SqlType::Geometry => format!("SDO_UTIL.TO_WKTGEOMETRY({column})"),
            _ => column.to_string(),
        }
    }
}
