//! 文本模板：一段 SQL 文本里的参数引用与 `@{...}` 规则。
//!
//! 支持的写法：
//! - `?`：位置参数，按出现顺序对应 `arg0`, `arg1`, ...；被引用的片段与宏接着编号
//! - `:name` / `&name`：命名参数，可带路径，如 `:user.name`、`:ids[0]`
//! - `#{expr, jdbcType=INTEGER, mode=OUT, typeHandler=...}`：带声明的参数
//! - `${expr}`：原样拼接，不做转义
//! - `@{rule, ...}`：`if` `text` `in` `ifin` `and` `or` `ifand` `ifor` `set` `ifset` `macro`
//!
//! 引号内的文本与注释原样保留，不做解析；`::` 视为类型转换。

use crate::arg::{SqlMode, SqlType};
use crate::bound::BoundStatement;
use crate::dialect::Dialect;
use crate::error::{BindingError, DefinitionError, Result};
use crate::expr::Expr;
use crate::node::EvalEnv;
use crate::param::{Lookup, ParamContext, ParamValue};
use crate::render::{SqlBuffer, ValueSlot, render_value};
use crate::sql_text::skip_literal;
use crate::value::SqlValue;

#[derive(Debug, Clone, PartialEq)]
struct BoundParam {
    expr: Expr,
    sql_type: Option<SqlType>,
    mode: SqlMode,
    type_handler: Option<String>,
}

/// `and` / `or` / `set` 规则的连接方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joiner {
    And,
    Or,
    Set,
}

impl Joiner {
    fn keyword(self) -> &'static str {
        match self {
            Self::And | Self::Or => "where",
            Self::Set => "set",
        }
    }

    /// 根据已生成的文本决定前导词：还没有关键字时补关键字，
    /// 关键字刚写完时什么都不加，否则补连接词。
    fn lead(self, prev: &str) -> &'static str {
        let prev = prev.trim_end().to_ascii_lowercase();
        let kw = self.keyword();
        match find_keyword(&prev, kw) {
            None => match self {
                Self::And | Self::Or => "where ",
                Self::Set => "set ",
            },
            Some(pos) if pos + kw.len() == prev.len() => "",
            Some(_) => match self {
                Self::And => "and ",
                Self::Or => "or ",
                Self::Set => ", ",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    If {
        test: Expr,
        body: TextTemplate,
    },
    Text(String),
    In {
        test: Option<Expr>,
        items: Expr,
    },
    Join {
        joiner: Joiner,
        test: Option<Expr>,
        body: TextTemplate,
    },
    Macro(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Positional,
    Named(Expr),
    Bound(BoundParam),
    Raw(Expr),
    Rule(Rule),
}

/// 解析后的文本模板。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextTemplate {
    segments: Vec<Segment>,
}

impl TextTemplate {
    pub fn parse(src: &str) -> Result<Self, DefinitionError> {
        parse_at(src, 0)
    }

    /// 单独求值一段文本（不支持 include / macro 以外的注册表功能）。
    pub fn evaluate(&self, ctx: &ParamContext, dialect: &dyn Dialect) -> Result<BoundStatement> {
        let mut env = EvalEnv::new(dialect, None, "");
        let mut out = SqlBuffer::new();
        self.render(&mut env, ctx, &mut out)?;
        Ok(out.into_bound())
    }

    /// 文本中 `?` 的个数，含条件规则与宏展开后的部分。
    pub(crate) fn positional_span(&self, env: &EvalEnv<'_>) -> Result<usize> {
        let mut span = 0;
        for seg in &self.segments {
            match seg {
                Segment::Positional => span += 1,
                Segment::Rule(rule) => span += rule.positional_span(env)?,
                _ => {}
            }
        }
        Ok(span)
    }

    pub(crate) fn render(
        &self,
        env: &mut EvalEnv<'_>,
        scope: &dyn Lookup,
        out: &mut SqlBuffer,
    ) -> Result<()> {
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Positional => {
                    let name = format!("arg{}", env.next_positional());
                    let value = scalar(&name, scope.lookup(&name).cloned())?;
                    render_value(env.dialect(), &ValueSlot::named(&name), value, out);
                }
                Segment::Named(expr) => {
                    let value = scalar(expr.source(), expr.eval(scope)?)?;
                    render_value(env.dialect(), &ValueSlot::named(expr.source()), value, out);
                }
                Segment::Bound(p) => {
                    let value = scalar(p.expr.source(), p.expr.eval(scope)?)?;
                    let slot = ValueSlot {
                        name: Some(p.expr.source()),
                        sql_type: p.sql_type,
                        mode: p.mode,
                        type_handler: p.type_handler.as_deref(),
                        template: None,
                    };
                    render_value(env.dialect(), &slot, value, out);
                }
                Segment::Raw(expr) => {
                    let value = scalar(expr.source(), expr.eval(scope)?)?;
                    out.push_str(&value.to_string());
                }
                Segment::Rule(rule) => {
                    // 跳过的规则也占用其中 `?` 的序号
                    let start = env.positional();
                    let span = rule.positional_span(env)?;
                    rule.render(env, scope, out)?;
                    env.set_positional(start + span);
                }
            }
        }
        Ok(())
    }

    /// 正文直接引用的参数都存在且非 null。没有任何引用时为 `false`。
    fn references_bound(&self, env: &EvalEnv<'_>, scope: &dyn Lookup) -> Result<bool> {
        let mut any = false;
        let mut position = env.positional();
        for seg in &self.segments {
            let value = match seg {
                Segment::Positional => {
                    position += 1;
                    scope.lookup(&format!("arg{}", position - 1)).cloned()
                }
                Segment::Named(expr) | Segment::Raw(expr) => expr.eval(scope)?,
                Segment::Bound(p) => p.expr.eval(scope)?,
                Segment::Rule(Rule::In { test: None, items }) => items.eval(scope)?,
                Segment::Rule(rule) => {
                    position += rule.positional_span(env)?;
                    continue;
                }
                _ => continue,
            };
            match value {
                Some(v) if !v.is_null() => any = true,
                _ => return Ok(false),
            }
        }
        Ok(any)
    }
}

impl Rule {
    fn positional_span(&self, env: &EvalEnv<'_>) -> Result<usize> {
        match self {
            Self::If { body, .. } | Self::Join { body, .. } => body.positional_span(env),
            Self::Macro(name) => env.macro_template(name)?.positional_span(env),
            Self::Text(_) | Self::In { .. } => Ok(0),
        }
    }

    fn render(&self, env: &mut EvalEnv<'_>, scope: &dyn Lookup, out: &mut SqlBuffer) -> Result<()> {
        match self {
            Self::If { test, body } => {
                if test.test(scope)? {
                    body.render(env, scope, out)?;
                }
            }
            Self::Text(s) => out.push_str(s),
            Self::In { test, items } => {
                if let Some(test) = test {
                    if !test.test(scope)? {
                        return Ok(());
                    }
                }
                let name = items.source();
                let values: Vec<ParamValue> = match items.eval(scope)? {
                    None => return Err(BindingError::Unresolved(name.to_string()).into()),
                    Some(ParamValue::List(list)) => list,
                    Some(ParamValue::Map(map)) => map.into_values().collect(),
                    Some(v @ ParamValue::Value(_)) => vec![v],
                };
                // 空列表写成 (NULL)：语法合法且不匹配任何行
                if values.is_empty() {
                    out.push_str("(NULL)");
                    return Ok(());
                }
                out.push_str("(");
                for (i, item) in values.into_iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let value = scalar(name, Some(item))?;
                    render_value(env.dialect(), &ValueSlot::named(name), value, out);
                }
                out.push_str(")");
            }
            Self::Join { joiner, test, body } => {
                let active = match test {
                    Some(test) => test.test(scope)?,
                    None => body.references_bound(env, scope)?,
                };
                if !active {
                    tracing::trace!(joiner = ?joiner, "join rule skipped");
                    return Ok(());
                }
                let lead = joiner.lead(out.sql());
                if !lead.is_empty() {
                    out.separate();
                    out.push_str(lead);
                }
                body.render(env, scope, out)?;
            }
            Self::Macro(name) => {
                let template = env.macro_template(name)?;
                template.render(env, scope, out)?;
            }
        }
        Ok(())
    }
}

fn scalar(name: &str, value: Option<ParamValue>) -> Result<SqlValue, BindingError> {
    match value {
        None => Err(BindingError::Unresolved(name.to_string())),
        Some(ParamValue::Value(v)) => Ok(v),
        Some(_) => Err(BindingError::NotScalar(name.to_string())),
    }
}

fn syntax(offset: usize, message: impl Into<String>) -> DefinitionError {
    DefinitionError::Syntax {
        offset,
        message: message.into(),
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

fn parse_at(src: &str, base: usize) -> Result<TextTemplate, DefinitionError> {
    let bytes = src.as_bytes();
    let mut segments = Vec::new();
    let mut lit = String::new();
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_literal(src, i) {
            lit.push_str(&src[i..end]);
            i = end;
            continue;
        }
        let c = bytes[i];
        let peek = bytes.get(i + 1).copied();
        match (c, peek) {
            (b'?', _) => {
                flush(&mut lit, &mut segments);
                segments.push(Segment::Positional);
                i += 1;
            }
            (b':', Some(b':')) => {
                lit.push_str("::");
                i += 2;
            }
            (b':' | b'&', Some(p)) if is_ident_start(p) => {
                let end = path_end(bytes, i + 1);
                flush(&mut lit, &mut segments);
                segments.push(Segment::Named(Expr::parse(&src[i + 1..end])?));
                i = end;
            }
            (b'#' | b'$' | b'@', Some(b'{')) => {
                let close =
                    matching_brace(src, i + 1).ok_or_else(|| syntax(base + i, "unclosed `{`"))?;
                let inner = &src[i + 2..close];
                let inner_base = base + i + 2;
                flush(&mut lit, &mut segments);
                let seg = match c {
                    b'#' => Segment::Bound(parse_bound(inner, inner_base)?),
                    b'$' => Segment::Raw(Expr::parse(inner.trim())?),
                    _ => Segment::Rule(parse_rule(inner, inner_base)?),
                };
                segments.push(seg);
                i = close + 1;
            }
            _ => {
                let Some(ch) = src[i..].chars().next() else {
                    break;
                };
                lit.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    flush(&mut lit, &mut segments);
    Ok(TextTemplate { segments })
}

fn flush(lit: &mut String, segments: &mut Vec<Segment>) {
    if !lit.is_empty() {
        segments.push(Segment::Literal(std::mem::take(lit)));
    }
}

/// `:name` 之后的路径：`a.b`、`a[0]`、`a['k'].c`。
fn path_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    loop {
        while i < bytes.len() && is_ident_char(bytes[i]) {
            i += 1;
        }
        match bytes.get(i) {
            Some(b'.') if bytes.get(i + 1).is_some_and(|&c| is_ident_start(c)) => i += 1,
            Some(b'[') => match bytes[i..].iter().position(|&c| c == b']') {
                Some(n) => i += n + 1,
                None => return i,
            },
            _ => return i,
        }
    }
}

/// `open` 处为 `{`，返回与之匹配的 `}` 的位置。
fn matching_brace(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if let Some(end) = skip_literal(src, i) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// 按顶层逗号切分，最多 `max` 段（最后一段保留剩余文本）。
fn split_args(s: &str, max: usize) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() && parts.len() + 1 < max {
        if let Some(end) = skip_literal(s, i) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

fn offset_in(outer: &str, part: &str) -> usize {
    part.as_ptr() as usize - outer.as_ptr() as usize
}

fn parse_bound(inner: &str, base: usize) -> Result<BoundParam, DefinitionError> {
    let parts = split_args(inner, usize::MAX);
    let mut param = BoundParam {
        expr: Expr::parse(parts[0].trim())?,
        sql_type: None,
        mode: SqlMode::In,
        type_handler: None,
    };
    for part in &parts[1..] {
        let offset = base + offset_in(inner, part);
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| syntax(offset, format!("expected `key=value`, found `{}`", part.trim())))?;
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "jdbctype" | "sqltype" => {
                let t = SqlType::from_name(value)
                    .ok_or_else(|| syntax(offset, format!("unknown sql type `{value}`")))?;
                param.sql_type = Some(t);
            }
            "mode" => {
                param.mode = SqlMode::from_name(value)
                    .ok_or_else(|| syntax(offset, format!("unknown parameter mode `{value}`")))?;
            }
            "typehandler" => param.type_handler = Some(value.to_string()),
            // javaType 等属性不影响绑定
            _ => {}
        }
    }
    Ok(param)
}

/// `@{in, :ids}` 中的集合引用，前缀 `:`/`&` 与 `#{}` 包装都可省略。
fn parse_items(s: &str) -> Result<Expr, DefinitionError> {
    let s = s.trim();
    let s = s
        .strip_prefix("#{")
        .and_then(|rest| rest.strip_suffix('}'))
        .or_else(|| s.strip_prefix(':'))
        .or_else(|| s.strip_prefix('&'))
        .unwrap_or(s);
    Expr::parse(s.trim())
}

fn parse_rule(inner: &str, base: usize) -> Result<Rule, DefinitionError> {
    let head = split_args(inner, 2);
    let name = head[0].trim().to_ascii_lowercase();
    let rest = head.get(1).copied();

    let rule = match name.as_str() {
        "if" => {
            let (test, at, body) = test_and_body(&name, inner, base, rest)?;
            Rule::If {
                test,
                body: parse_at(body, at)?,
            }
        }
        "text" => Rule::Text(rest.unwrap_or("").to_string()),
        "in" => Rule::In {
            test: None,
            items: parse_items(rest.unwrap_or(""))?,
        },
        "ifin" => {
            let (test, _, items) = test_and_body(&name, inner, base, rest)?;
            Rule::In {
                test: Some(test),
                items: parse_items(items)?,
            }
        }
        "and" | "or" | "set" => {
            let body = rest.unwrap_or("");
            let at = if body.is_empty() { base } else { base + offset_in(inner, body) };
            Rule::Join {
                joiner: joiner_of(&name),
                test: None,
                body: parse_at(body, at)?,
            }
        }
        "ifand" | "ifor" | "ifset" => {
            let (test, at, body) = test_and_body(&name, inner, base, rest)?;
            Rule::Join {
                joiner: joiner_of(&name[2..]),
                test: Some(test),
                body: parse_at(body, at)?,
            }
        }
        "macro" => {
            let target = rest.unwrap_or("").trim();
            if target.is_empty() {
                return Err(syntax(base, "rule `macro` expects a name"));
            }
            Rule::Macro(target.to_string())
        }
        other => return Err(syntax(base, format!("unknown rule `{other}`"))),
    };
    Ok(rule)
}

/// `test, body` 两段式参数。
fn test_and_body<'a>(
    name: &str,
    inner: &'a str,
    base: usize,
    rest: Option<&'a str>,
) -> Result<(Expr, usize, &'a str), DefinitionError> {
    let parts = split_args(rest.unwrap_or(""), 2);
    if parts.len() < 2 {
        return Err(syntax(base, format!("rule `{name}` expects a test and a body")));
    }
    let body = parts[1];
    Ok((Expr::parse(parts[0].trim())?, base + offset_in(inner, body), body))
}

fn joiner_of(name: &str) -> Joiner {
    match name {
        "or" => Joiner::Or,
        "set" => Joiner::Set,
        _ => Joiner::And,
    }
}

/// 最后一次以完整单词出现的位置。
fn find_keyword(hay: &str, kw: &str) -> Option<usize> {
    let bytes = hay.as_bytes();
    let mut end = hay.len();
    while let Some(pos) = hay[..end].rfind(kw) {
        let before = pos.checked_sub(1).map(|p| bytes[p]);
        let after = bytes.get(pos + kw.len()).copied();
        if !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char) {
            return Some(pos);
        }
        end = pos;
    }
    None
}
