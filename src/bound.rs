//! BoundStatement：模板引擎与条件构造器共同的输出。

use crate::arg::SqlArg;
use crate::dialect::PlaceholderStyle;
use crate::sql_text::skip_literal;
use crate::value::SqlValue;
use std::fmt;

/// 参数列表：单条语句是平铺列表，批量插入是每行一组。
#[derive(Debug, Clone, PartialEq)]
pub enum BoundArgs {
    Flat(Vec<SqlArg>),
    Batch(Vec<Vec<SqlArg>>),
}

/// SQL 文本 + 与 `?` 从左到右一一对应的参数。
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    sql: String,
    args: BoundArgs,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>, args: Vec<SqlArg>) -> Self {
        Self {
            sql: sql.into(),
            args: BoundArgs::Flat(args),
        }
    }

    pub fn batch(sql: impl Into<String>, rows: Vec<Vec<SqlArg>>) -> Self {
        Self {
            sql: sql.into(),
            args: BoundArgs::Batch(rows),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &BoundArgs {
        &self.args
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.args, BoundArgs::Batch(_))
    }

    /// 平铺参数；批量语句返回 `None`。
    pub fn flat_args(&self) -> Option<&[SqlArg]> {
        match &self.args {
            BoundArgs::Flat(args) => Some(args),
            BoundArgs::Batch(_) => None,
        }
    }

    /// 参数值；批量语句按行展开。
    pub fn values(&self) -> Vec<SqlValue> {
        match &self.args {
            BoundArgs::Flat(args) => args.iter().map(|a| a.value.clone()).collect(),
            BoundArgs::Batch(rows) => rows
                .iter()
                .flat_map(|row| row.iter().map(|a| a.value.clone()))
                .collect(),
        }
    }

    /// 按行取参数值；平铺语句视为一行。
    pub fn batch_values(&self) -> Vec<Vec<SqlValue>> {
        match &self.args {
            BoundArgs::Flat(args) => vec![args.iter().map(|a| a.value.clone()).collect()],
            BoundArgs::Batch(rows) => rows
                .iter()
                .map(|row| row.iter().map(|a| a.value.clone()).collect())
                .collect(),
        }
    }

    pub fn into_parts(self) -> (String, BoundArgs) {
        (self.sql, self.args)
    }

    /// 把 `?` 改写为指定风格的占位符，字面量与注释中的 `?` 保持不变。
    pub fn with_placeholders(&self, style: PlaceholderStyle) -> String {
        if style == PlaceholderStyle::QuestionMark {
            return self.sql.clone();
        }
        let sql = self.sql.as_str();
        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        let mut i = 0;
        while i < sql.len() {
            if let Some(end) = skip_literal(sql, i) {
                out.push_str(&sql[i..end]);
                i = end;
                continue;
            }
            let Some(c) = sql[i..].chars().next() else {
                break;
            };
            if c == '?' {
                index += 1;
                style.write_placeholder(index, &mut out);
            } else {
                out.push(c);
            }
            i += c.len_utf8();
        }
        out
    }
}

impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
