//! 语句体的节点树：文本、条件、分支、循环、片段引用、局部绑定与裁剪。
//!
//! 节点树在加载时构建，之后只读；每次求值使用独立的作用域与输出缓冲。

use crate::dialect::Dialect;
use crate::error::{BindingError, DefinitionError, Result};
use crate::expr::Expr;
use crate::param::{Lookup, ParamValue, Scope};
use crate::registry::Registry;
use crate::render::SqlBuffer;
use crate::template::TextTemplate;
use crate::value::SqlValue;

/// 一次求值的环境：方言、可选的注册表、include 栈与下一个位置参数的序号。
pub(crate) struct EvalEnv<'r> {
    dialect: &'r dyn Dialect,
    registry: Option<&'r Registry>,
    namespace: &'r str,
    includes: Vec<String>,
    positional: usize,
}

impl<'r> EvalEnv<'r> {
    pub(crate) fn new(dialect: &'r dyn Dialect, registry: Option<&'r Registry>, namespace: &'r str) -> Self {
        Self {
            dialect,
            registry,
            namespace,
            includes: Vec::new(),
            positional: 0,
        }
    }

    pub(crate) fn dialect(&self) -> &'r dyn Dialect {
        self.dialect
    }

    pub(crate) fn positional(&self) -> usize {
        self.positional
    }

    pub(crate) fn set_positional(&mut self, positional: usize) {
        self.positional = positional;
    }

    pub(crate) fn next_positional(&mut self) -> usize {
        self.positional += 1;
        self.positional - 1
    }

    pub(crate) fn macro_template(&self, name: &str) -> Result<&'r TextTemplate, BindingError> {
        self.registry
            .and_then(|r| r.macro_template(name))
            .ok_or_else(|| BindingError::UnknownMacro(name.to_string()))
    }

    /// 不带命名空间的引用按当前命名空间补全。
    fn qualify(&self, refid: &str) -> String {
        if refid.contains('.') || self.namespace.is_empty() {
            refid.to_string()
        } else {
            format!("{}.{}", self.namespace, refid)
        }
    }

    fn fragment(&self, qualified: &str) -> Result<&'r [Node], BindingError> {
        self.registry
            .and_then(|r| r.fragment(qualified))
            .ok_or_else(|| BindingError::UnknownFragment(qualified.to_string()))
    }

    /// 进入一个片段；已在 include 栈上时报错。
    fn enter(&mut self, refid: &str) -> Result<&'r [Node], BindingError> {
        let qualified = self.qualify(refid);
        if self.includes.contains(&qualified) {
            return Err(BindingError::RecursiveInclude(qualified));
        }
        let nodes = self.fragment(&qualified)?;
        self.includes.push(qualified);
        Ok(nodes)
    }
}

/// 裁剪规则：去掉多余的前/后连接词，再加上前/后缀。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trim {
    pub prefix: String,
    pub suffix: String,
    pub prefix_overrides: Vec<String>,
    pub suffix_overrides: Vec<String>,
}

impl Trim {
    pub fn new() -> Self {
        Self::default()
    }

    /// `WHERE`：去掉开头或结尾多出来的 `AND` / `OR`。
    pub fn where_clause() -> Self {
        Self {
            prefix: "WHERE".into(),
            prefix_overrides: vec!["AND".into(), "OR".into()],
            suffix_overrides: vec!["AND".into(), "OR".into()],
            ..Self::default()
        }
    }

    /// `SET`：去掉多出来的逗号。
    pub fn set_clause() -> Self {
        Self {
            prefix: "SET".into(),
            prefix_overrides: vec![",".into()],
            suffix_overrides: vec![",".into()],
            ..Self::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn prefix_overrides<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.prefix_overrides = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn suffix_overrides<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.suffix_overrides = items.into_iter().map(Into::into).collect();
        self
    }

    /// 裁剪后的正文；全部被裁掉时返回 `None`。
    fn apply<'a>(&self, body: &'a str) -> Option<&'a str> {
        let mut body = body.trim();
        if let Some(rest) = self
            .prefix_overrides
            .iter()
            .find_map(|o| strip_leading(body, o))
        {
            body = rest.trim_start();
        }
        if let Some(rest) = self
            .suffix_overrides
            .iter()
            .find_map(|o| strip_trailing(body, o))
        {
            body = rest.trim_end();
        }
        (!body.is_empty()).then_some(body)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// 大小写不敏感地去掉一个前导词；单词型的词要求后面是边界。
fn strip_leading<'a>(body: &'a str, word: &str) -> Option<&'a str> {
    let head = body.get(..word.len())?;
    if !head.eq_ignore_ascii_case(word) {
        return None;
    }
    let rest = &body[word.len()..];
    let wordy = word.chars().next_back().is_some_and(is_word_char);
    if wordy && rest.chars().next().is_some_and(is_word_char) {
        return None;
    }
    Some(rest)
}

fn strip_trailing<'a>(body: &'a str, word: &str) -> Option<&'a str> {
    let split = body.len().checked_sub(word.len())?;
    let tail = body.get(split..)?;
    if !tail.eq_ignore_ascii_case(word) {
        return None;
    }
    let rest = &body[..split];
    let wordy = word.chars().next().is_some_and(is_word_char);
    if wordy && rest.chars().next_back().is_some_and(is_word_char) {
        return None;
    }
    Some(rest)
}

/// 循环节点。
#[derive(Debug, Clone, PartialEq)]
pub struct Foreach {
    collection: Expr,
    item: Option<String>,
    index: Option<String>,
    open: String,
    close: String,
    separator: String,
    children: Vec<Node>,
}

impl Foreach {
    pub fn new(collection: &str) -> Result<Self, DefinitionError> {
        Ok(Self {
            collection: Expr::parse(collection)?,
            item: None,
            index: None,
            open: String::new(),
            close: String::new(),
            separator: String::new(),
            children: Vec::new(),
        })
    }

    pub fn item(mut self, name: impl Into<String>) -> Self {
        self.item = Some(name.into());
        self
    }

    /// 列表时绑定下标，Map 时绑定键。
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    pub fn open(mut self, open: impl Into<String>) -> Self {
        self.open = open.into();
        self
    }

    pub fn close(mut self, close: impl Into<String>) -> Self {
        self.close = close.into();
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    fn eval(&self, env: &mut EvalEnv<'_>, scope: &dyn Lookup, out: &mut SqlBuffer) -> Result<()> {
        let entries: Vec<(ParamValue, ParamValue)> = match self.collection.eval(scope)? {
            None => {
                tracing::trace!(collection = %self.collection.source(), "foreach collection is absent");
                return Ok(());
            }
            Some(ParamValue::Value(SqlValue::Null)) => return Ok(()),
            Some(ParamValue::List(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (ParamValue::value(i as i64), v))
                .collect(),
            Some(ParamValue::Map(map)) => map
                .into_iter()
                .map(|(k, v)| (ParamValue::value(k), v))
                .collect(),
            Some(ParamValue::Value(_)) => {
                return Err(BindingError::NotIterable(self.collection.source().to_string()).into());
            }
        };

        let start = env.positional();
        let mut parts = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let mut local = Scope::new(scope);
            if let Some(item) = &self.item {
                local.set(item.clone(), value);
            }
            if let Some(index) = &self.index {
                local.set(index.clone(), key);
            }
            // 每次迭代使用同一组序号
            env.set_positional(start);
            let mut part = SqlBuffer::new();
            eval_nodes(&self.children, env, &local, &mut part)?;
            if !part.sql().trim().is_empty() {
                parts.push(part);
            }
        }
        if parts.is_empty() {
            tracing::trace!(collection = %self.collection.source(), "foreach produced no output");
            return Ok(());
        }

        out.push_str(&self.open);
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.push_str(&self.separator);
            }
            out.append(part);
        }
        out.push_str(&self.close);
        Ok(())
    }
}

impl From<Foreach> for Node {
    fn from(f: Foreach) -> Self {
        Node::Foreach(f)
    }
}

/// 语句体节点。
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextTemplate),
    If {
        test: Expr,
        children: Vec<Node>,
    },
    Choose {
        whens: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach(Foreach),
    Include(String),
    Bind {
        name: String,
        value: Expr,
    },
    Trim(Trim, Vec<Node>),
    Macro(String),
}

impl Node {
    pub fn text(src: &str) -> Result<Self, DefinitionError> {
        Ok(Self::Text(TextTemplate::parse(src)?))
    }

    pub fn if_(test: &str, children: Vec<Node>) -> Result<Self, DefinitionError> {
        Ok(Self::If {
            test: Expr::parse(test)?,
            children,
        })
    }

    pub fn choose(
        whens: Vec<(&str, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    ) -> Result<Self, DefinitionError> {
        let whens = whens
            .into_iter()
            .map(|(test, children)| Ok((Expr::parse(test)?, children)))
            .collect::<Result<Vec<_>, DefinitionError>>()?;
        Ok(Self::Choose { whens, otherwise })
    }

    pub fn include(refid: impl Into<String>) -> Self {
        Self::Include(refid.into())
    }

    pub fn bind(name: impl Into<String>, value: &str) -> Result<Self, DefinitionError> {
        Ok(Self::Bind {
            name: name.into(),
            value: Expr::parse(value)?,
        })
    }

    pub fn where_(children: Vec<Node>) -> Self {
        Self::Trim(Trim::where_clause(), children)
    }

    pub fn set(children: Vec<Node>) -> Self {
        Self::Trim(Trim::set_clause(), children)
    }

    pub fn trim(trim: Trim, children: Vec<Node>) -> Self {
        Self::Trim(trim, children)
    }

    pub fn macro_ref(name: impl Into<String>) -> Self {
        Self::Macro(name.into())
    }

    /// 节点中 `?` 的个数，按 include 与宏展开后计算，与分支是否成立无关。
    fn positional_span(&self, env: &mut EvalEnv<'_>) -> Result<usize> {
        match self {
            Self::Text(t) => t.positional_span(env),
            Self::If { children, .. } | Self::Trim(_, children) => span_of(children, env),
            Self::Foreach(f) => span_of(&f.children, env),
            Self::Choose { whens, otherwise } => {
                let mut span = 0;
                for (_, children) in whens {
                    span += span_of(children, env)?;
                }
                if let Some(children) = otherwise {
                    span += span_of(children, env)?;
                }
                Ok(span)
            }
            Self::Include(refid) => {
                let nodes = env.enter(refid)?;
                let span = span_of(nodes, env);
                env.includes.pop();
                span
            }
            Self::Macro(name) => env.macro_template(name)?.positional_span(env),
            Self::Bind { .. } => Ok(0),
        }
    }

    fn eval(&self, env: &mut EvalEnv<'_>, scope: &dyn Lookup, out: &mut SqlBuffer) -> Result<()> {
        match self {
            Self::Text(t) => t.render(env, scope, out),
            Self::If { test, children } => {
                if test.test(scope)? {
                    eval_nodes(children, env, scope, out)?;
                }
                Ok(())
            }
            Self::Choose { whens, otherwise } => {
                let start = env.positional();
                let mut skipped = 0;
                for (test, children) in whens {
                    if test.test(scope)? {
                        env.set_positional(start + skipped);
                        return eval_nodes(children, env, scope, out);
                    }
                    skipped += span_of(children, env)?;
                }
                match otherwise {
                    Some(children) => {
                        env.set_positional(start + skipped);
                        eval_nodes(children, env, scope, out)
                    }
                    None => {
                        tracing::trace!("no choose branch matched");
                        Ok(())
                    }
                }
            }
            Self::Foreach(f) => f.eval(env, scope, out),
            Self::Include(refid) => {
                let nodes = env.enter(refid)?;
                let result = eval_nodes(nodes, env, scope, out);
                env.includes.pop();
                result
            }
            // 在 eval_nodes 中处理
            Self::Bind { .. } => Ok(()),
            Self::Trim(trim, children) => {
                let mut part = SqlBuffer::new();
                eval_nodes(children, env, scope, &mut part)?;
                let (sql, args) = part.into_parts();
                let Some(body) = trim.apply(&sql) else {
                    return Ok(());
                };
                out.separate();
                if !trim.prefix.is_empty() {
                    out.push_str(&trim.prefix);
                    out.push_str(" ");
                }
                out.push_fragment(body, args);
                if !trim.suffix.is_empty() {
                    out.push_str(" ");
                    out.push_str(&trim.suffix);
                }
                Ok(())
            }
            Self::Macro(name) => {
                let template = env.macro_template(name)?;
                template.render(env, scope, out)
            }
        }
    }
}

fn span_of(nodes: &[Node], env: &mut EvalEnv<'_>) -> Result<usize> {
    let mut span = 0;
    for node in nodes {
        span += node.positional_span(env)?;
    }
    Ok(span)
}

/// 依次求值兄弟节点；`bind` 只对其后的兄弟节点可见。
pub(crate) fn eval_nodes(
    nodes: &[Node],
    env: &mut EvalEnv<'_>,
    parent: &dyn Lookup,
    out: &mut SqlBuffer,
) -> Result<()> {
    let mut scope = Scope::new(parent);
    for node in nodes {
        match node {
            Node::Bind { name, value } => {
                let v = value.eval(&scope)?.unwrap_or_else(ParamValue::null);
                scope.set(name.clone(), v);
            }
            other => {
                // 未展开的分支同样占用序号，后面的 `?` 位置不变
                let start = env.positional();
                let span = other.positional_span(env)?;
                other.eval(env, &scope, out)?;
                env.set_positional(start + span);
            }
        }
    }
    Ok(())
}
