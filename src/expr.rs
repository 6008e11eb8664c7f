//! 表达式：`if`/`when` 的测试条件、`#{}` 取值、`bind` 与 `foreach` 的集合。
//!
//! 语法是 OGNL 的常用子集：
//! - 属性路径 `a.b['k'][0]`，字面量（数字、字符串、`true`/`false`/`null`）；
//! - `! not -`、`* / %`、`+ -`、`< <= > >= lt lte gt gte`、`== != eq neq`、`&& and`、`|| or`；
//! - 方法 `size()` `length()` `isEmpty()` `trim()`。
//!
//! 不存在的名字求值为“缺失”（`None`），在测试位置上视为假。

use crate::error::{BindingError, DefinitionError};
use crate::param::{Lookup, ParamValue};
use crate::value::SqlValue;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Size,
    IsEmpty,
    Trim,
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Literal(ParamValue),
    Ident(String),
    Member(Box<Ast>, String),
    Index(Box<Ast>, Box<Ast>),
    Call(Box<Ast>, Method),
    Not(Box<Ast>),
    Neg(Box<Ast>),
    Binary(Box<Ast>, BinOp, Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

/// 解析后的表达式，可在多次调用间共享。
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    ast: Ast,
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self, DefinitionError> {
        let tokens = tokenize(source)?;
        let mut p = Parser {
            source,
            tokens,
            pos: 0,
        };
        let ast = p.parse_or()?;
        if p.pos < p.tokens.len() {
            return Err(p.error("unexpected trailing input"));
        }
        Ok(Self {
            source: source.trim().to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 求值；`Ok(None)` 表示引用的名字不存在。
    pub fn eval(&self, scope: &dyn Lookup) -> Result<Option<ParamValue>, BindingError> {
        eval(&self.ast, scope).map_err(|message| BindingError::Expression {
            expr: self.source.clone(),
            message,
        })
    }

    /// 在测试位置求值：缺失与 null 都为假。
    pub fn test(&self, scope: &dyn Lookup) -> Result<bool, BindingError> {
        Ok(truthy(self.eval(scope)?.as_ref()))
    }
}

/// OGNL 真值：缺失/null 为假，数字非零为真，其余非空值为真。
pub(crate) fn truthy(v: Option<&ParamValue>) -> bool {
    match v {
        None => false,
        Some(ParamValue::Value(v)) => match v {
            SqlValue::Null => false,
            SqlValue::Bool(b) => *b,
            SqlValue::I64(n) => *n != 0,
            SqlValue::U64(n) => *n != 0,
            SqlValue::F64(n) => *n != 0.0,
            _ => true,
        },
        Some(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(SqlValue),
    Str(String),
    Ident(String),
    Sym(&'static str),
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "*", "/", "%", "(", ")", "[",
    "]", ".",
];

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, DefinitionError> {
    let err = |offset: usize, message: &str| DefinitionError::Expression {
        expr: src.to_string(),
        message: format!("{message} at offset {offset}"),
    };
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if c.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                // `1.size()` 之类的写法不支持，`.` 后必须是数字
                if bytes[i] == b'.' && !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    break;
                }
                i += 1;
            }
            let text = &src[start..i];
            let num = if text.contains('.') {
                text.parse::<f64>().map(SqlValue::F64).ok()
            } else {
                text.parse::<i64>().map(SqlValue::I64).ok()
            };
            let num = num.ok_or_else(|| err(start, "invalid number"))?;
            out.push((start, Token::Num(num)));
            continue;
        }
        if c == b'\'' || c == b'"' {
            i += 1;
            let mut s = String::new();
            loop {
                let Some(ch) = src[i..].chars().next() else {
                    return Err(err(start, "unterminated string"));
                };
                i += ch.len_utf8();
                if ch as u32 == c as u32 {
                    break;
                }
                if ch == '\\' {
                    let Some(esc) = src[i..].chars().next() else {
                        return Err(err(start, "unterminated string"));
                    };
                    i += esc.len_utf8();
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                } else {
                    s.push(ch);
                }
            }
            out.push((start, Token::Str(s)));
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
            {
                i += 1;
            }
            out.push((start, Token::Ident(src[start..i].to_string())));
            continue;
        }
        match SYMBOLS.iter().find(|s| src[i..].starts_with(**s)) {
            Some(sym) => {
                i += sym.len();
                out.push((start, Token::Sym(*sym)));
            }
            None => return Err(err(start, "unexpected character")),
        }
    }
    Ok(out)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> DefinitionError {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.source.len(), |(o, _)| *o);
        DefinitionError::Expression {
            expr: self.source.to_string(),
            message: format!("{message} at offset {offset}"),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == word) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), DefinitionError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{sym}`")))
        }
    }

    fn parse_or(&mut self) -> Result<Ast, DefinitionError> {
        let mut left = self.parse_and()?;
        while self.eat_sym("||") || self.eat_word("or") {
            let right = self.parse_and()?;
            left = Ast::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Ast, DefinitionError> {
        let mut left = self.parse_equality()?;
        while self.eat_sym("&&") || self.eat_word("and") {
            let right = self.parse_equality()?;
            left = Ast::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Ast, DefinitionError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = if self.eat_sym("==") || self.eat_word("eq") {
                BinOp::Eq
            } else if self.eat_sym("!=") || self.eat_word("neq") {
                BinOp::Ne
            } else {
                return Ok(left);
            };
            let right = self.parse_relational()?;
            left = Ast::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Ast, DefinitionError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat_sym("<=") || self.eat_word("lte") {
                BinOp::Le
            } else if self.eat_sym(">=") || self.eat_word("gte") {
                BinOp::Ge
            } else if self.eat_sym("<") || self.eat_word("lt") {
                BinOp::Lt
            } else if self.eat_sym(">") || self.eat_word("gt") {
                BinOp::Gt
            } else {
                return Ok(left);
            };
            let right = self.parse_additive()?;
            left = Ast::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Ast, DefinitionError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_sym("+") {
                BinOp::Add
            } else if self.eat_sym("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = Ast::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Ast, DefinitionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_sym("*") {
                BinOp::Mul
            } else if self.eat_sym("/") {
                BinOp::Div
            } else if self.eat_sym("%") {
                BinOp::Rem
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Ast::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Ast, DefinitionError> {
        if self.eat_sym("!") || self.eat_word("not") {
            return Ok(Ast::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat_sym("-") {
            return Ok(Ast::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Ast, DefinitionError> {
        let mut node = self.parse_primary()?;
        loop {
            if self.eat_sym(".") {
                let Some(Token::Ident(name)) = self.peek().cloned() else {
                    return Err(self.error("expected a property name"));
                };
                self.pos += 1;
                if self.eat_sym("(") {
                    self.expect_sym(")")?;
                    let method = match name.as_str() {
                        "size" | "length" => Method::Size,
                        "isEmpty" => Method::IsEmpty,
                        "trim" => Method::Trim,
                        _ => return Err(self.error(&format!("unsupported method `{name}`"))),
                    };
                    node = Ast::Call(Box::new(node), method);
                } else {
                    node = Ast::Member(Box::new(node), name);
                }
            } else if self.eat_sym("[") {
                let index = self.parse_or()?;
                self.expect_sym("]")?;
                node = Ast::Index(Box::new(node), Box::new(index));
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Ast, DefinitionError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Num(n) => Ok(Ast::Literal(ParamValue::Value(n))),
            Token::Str(s) => Ok(Ast::Literal(ParamValue::value(s))),
            Token::Ident(word) => Ok(match word.as_str() {
                "true" => Ast::Literal(ParamValue::value(true)),
                "false" => Ast::Literal(ParamValue::value(false)),
                "null" => Ast::Literal(ParamValue::null()),
                _ => Ast::Ident(word),
            }),
            Token::Sym("(") => {
                let inner = self.parse_or()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Token::Sym(_) => {
                self.pos -= 1;
                Err(self.error("unexpected symbol"))
            }
        }
    }
}

type EvalResult = Result<Option<ParamValue>, String>;

fn eval(ast: &Ast, scope: &dyn Lookup) -> EvalResult {
    match ast {
        Ast::Literal(v) => Ok(Some(v.clone())),
        Ast::Ident(name) => Ok(scope.lookup(name).cloned()),
        Ast::Member(inner, key) => Ok(eval(inner, scope)?.and_then(|v| v.member(key).cloned())),
        Ast::Index(inner, index) => {
            let base = eval(inner, scope)?;
            let Some(key) = eval(index, scope)? else {
                return Ok(None);
            };
            Ok(base.and_then(|v| v.index(&key).cloned()))
        }
        Ast::Call(inner, method) => Ok(call(eval(inner, scope)?, *method)),
        Ast::Not(inner) => Ok(Some(ParamValue::value(!truthy(
            eval(inner, scope)?.as_ref(),
        )))),
        Ast::Neg(inner) => match eval(inner, scope)? {
            Some(ParamValue::Value(v)) if v.is_numeric() => {
                arith(BinOp::Sub, &SqlValue::I64(0), &v).map(|v| Some(ParamValue::Value(v)))
            }
            Some(ParamValue::Value(SqlValue::Null)) | None => Ok(None),
            Some(_) => Err("cannot negate a non-numeric value".to_string()),
        },
        Ast::And(a, b) => {
            let v = truthy(eval(a, scope)?.as_ref()) && truthy(eval(b, scope)?.as_ref());
            Ok(Some(ParamValue::value(v)))
        }
        Ast::Or(a, b) => {
            let v = truthy(eval(a, scope)?.as_ref()) || truthy(eval(b, scope)?.as_ref());
            Ok(Some(ParamValue::value(v)))
        }
        Ast::Binary(a, op, b) => {
            let left = eval(a, scope)?;
            let right = eval(b, scope)?;
            binary(*op, left, right)
        }
    }
}

fn call(v: Option<ParamValue>, method: Method) -> Option<ParamValue> {
    let size = |v: &ParamValue| match v {
        ParamValue::List(items) => Some(items.len()),
        ParamValue::Map(m) => Some(m.len()),
        ParamValue::Value(SqlValue::String(s)) => Some(s.chars().count()),
        ParamValue::Value(SqlValue::Bytes(b)) => Some(b.len()),
        ParamValue::Value(_) => None,
    };
    match method {
        Method::Size => {
            let n = size(v.as_ref()?)?;
            Some(ParamValue::value(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        Method::IsEmpty => {
            let empty = match v.as_ref() {
                None => true,
                Some(p) if p.is_null() => true,
                Some(p) => size(p) == Some(0),
            };
            Some(ParamValue::value(empty))
        }
        Method::Trim => match v? {
            ParamValue::Value(SqlValue::String(s)) => Some(ParamValue::value(s.trim().to_string())),
            other => Some(other),
        },
    }
}

fn binary(op: BinOp, left: Option<ParamValue>, right: Option<ParamValue>) -> EvalResult {
    let null = ParamValue::null();
    let l = left.as_ref().unwrap_or(&null);
    let r = right.as_ref().unwrap_or(&null);
    match op {
        BinOp::Eq => Ok(Some(ParamValue::value(equals(l, r)))),
        BinOp::Ne => Ok(Some(ParamValue::value(!equals(l, r)))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = compare(l, r);
            let v = match op {
                BinOp::Lt => ord == Some(Ordering::Less),
                BinOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                BinOp::Gt => ord == Some(Ordering::Greater),
                _ => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
            };
            Ok(Some(ParamValue::value(v)))
        }
        _ => {
            let (ParamValue::Value(a), ParamValue::Value(b)) = (l, r) else {
                return Err("arithmetic on a collection".to_string());
            };
            if a.is_null() || b.is_null() {
                return Ok(None);
            }
            if op == BinOp::Add && !(a.is_numeric() && b.is_numeric()) {
                return Ok(Some(ParamValue::value(format!("{a}{b}"))));
            }
            arith(op, a, b).map(|v| Some(ParamValue::Value(v)))
        }
    }
}

fn arith(op: BinOp, a: &SqlValue, b: &SqlValue) -> Result<SqlValue, String> {
    let ints = match (a, b) {
        (SqlValue::F64(_), _) | (_, SqlValue::F64(_)) => None,
        _ => a.as_i64().zip(b.as_i64()),
    };
    if let Some((x, y)) = ints {
        let r = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div | BinOp::Rem if y == 0 => return Err("division by zero".to_string()),
            BinOp::Div => x.checked_div(y),
            BinOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(r) = r {
            return Ok(SqlValue::I64(r));
        }
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(format!("cannot apply arithmetic to `{a}` and `{b}`"));
    };
    let r = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div | BinOp::Rem if y == 0.0 => return Err("division by zero".to_string()),
        BinOp::Div => x / y,
        BinOp::Rem => x % y,
        _ => return Err("not an arithmetic operator".to_string()),
    };
    Ok(SqlValue::F64(r))
}

fn equals(l: &ParamValue, r: &ParamValue) -> bool {
    match (l, r) {
        (ParamValue::Value(a), ParamValue::Value(b)) => {
            if a.is_null() || b.is_null() {
                return a.is_null() && b.is_null();
            }
            match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) if a.is_numeric() && b.is_numeric() => x == y,
                _ if a.is_numeric() || b.is_numeric() => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                },
                _ => a == b,
            }
        }
        _ => l == r,
    }
}

fn compare(l: &ParamValue, r: &ParamValue) -> Option<Ordering> {
    let (ParamValue::Value(a), ParamValue::Value(b)) = (l, r) else {
        return None;
    };
    if a.is_null() || b.is_null() {
        return None;
    }
    if a.is_numeric() || b.is_numeric() {
        return a.as_f64()?.partial_cmp(&b.as_f64()?);
    }
    match (a, b) {
        (SqlValue::String(x), SqlValue::String(y)) => Some(x.cmp(y)),
        (SqlValue::Bool(x), SqlValue::Bool(y)) => Some(x.cmp(y)),
        (SqlValue::DateTime(x), SqlValue::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
