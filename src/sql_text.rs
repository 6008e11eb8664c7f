//! SQL 文本扫描：跳过字符串字面量、带引号的标识符与注释。

/// 若 `pos` 处开始一个字面量或注释，返回其结束位置（不含）。
pub(crate) fn skip_literal(src: &str, pos: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let c = *bytes.get(pos)?;
    match c {
        b'\'' | b'"' | b'`' => {
            let mut i = pos + 1;
            while i < bytes.len() {
                if bytes[i] == c {
                    // 连续两个引号是转义
                    if bytes.get(i + 1) == Some(&c) {
                        i += 2;
                        continue;
                    }
                    return Some(i + 1);
                }
                i += 1;
            }
            Some(bytes.len())
        }
        b'-' if bytes.get(pos + 1) == Some(&b'-') => {
            let end = src[pos..].find('\n').map_or(bytes.len(), |n| pos + n);
            Some(end)
        }
        b'/' if bytes.get(pos + 1) == Some(&b'*') => {
            let end = src[pos + 2..].find("*/").map_or(bytes.len(), |n| pos + 2 + n + 2);
            Some(end)
        }
        _ => None,
    }
}

/// 统计字面量与注释之外的 `?` 数量。
pub(crate) fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut i = 0;
    let bytes = sql.as_bytes();
    while i < bytes.len() {
        if let Some(end) = skip_literal(sql, i) {
            i = end;
            continue;
        }
        if bytes[i] == b'?' {
            count += 1;
        }
        i += 1;
    }
    count
}

/// 括号与字面量之外是否出现 `ORDER BY`；子查询里的排序不算。
pub(crate) fn has_top_level_order_by(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(end) = skip_literal(sql, i) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'o' | b'O' if depth == 0 && starts_order_by(bytes, i) => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

fn starts_order_by(bytes: &[u8], pos: usize) -> bool {
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    if pos > 0 && is_word(bytes[pos - 1]) {
        return false;
    }
    let rest = &bytes[pos..];
    if rest.len() < 5 || !rest[..5].eq_ignore_ascii_case(b"order") {
        return false;
    }
    let gap = rest[5..].iter().take_while(|b| b.is_ascii_whitespace()).count();
    if gap == 0 {
        return false;
    }
    let by = &rest[5 + gap..];
    by.len() >= 2 && by[..2].eq_ignore_ascii_case(b"by") && !by.get(2).is_some_and(|b| is_word(*b))
}
