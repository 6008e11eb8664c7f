//! 列命名约定：Map 模式下未声明的属性名按此规则推导列名。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 属性名 -> 列名 的映射函数。
pub type FieldMapperFunc = Arc<dyn Fn(&str) -> String + Send + Sync + 'static>;

/// `None` 表示恒等映射。
static COLUMN_NAMING: Mutex<Option<FieldMapperFunc>> = Mutex::new(None);
static COLUMN_NAMING_SCOPE: Mutex<()> = Mutex::new(());

/// 恒等 mapper：列名与属性名相同。
pub fn identity_mapper() -> FieldMapperFunc {
    Arc::new(|property: &str| property.to_string())
}

/// 新建 `TableMapping` 时取用的命名约定。
pub fn default_field_mapper() -> FieldMapperFunc {
    COLUMN_NAMING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_else(identity_mapper)
}

/// 替换全局命名约定，返回旧值。
pub fn set_default_field_mapper(mapper: FieldMapperFunc) -> FieldMapperFunc {
    let mut slot = COLUMN_NAMING.lock().unwrap_or_else(PoisonError::into_inner);
    slot.replace(mapper).unwrap_or_else(identity_mapper)
}

/// 作用域内的命名约定；drop 时恢复旧值并释放全局锁。
pub struct DefaultFieldMapperGuard {
    previous: FieldMapperFunc,
    _scope: MutexGuard<'static, ()>,
}

impl Drop for DefaultFieldMapperGuard {
    fn drop(&mut self) {
        set_default_field_mapper(Arc::clone(&self.previous));
    }
}

pub fn set_default_field_mapper_scoped(mapper: FieldMapperFunc) -> DefaultFieldMapperGuard {
    let scope = COLUMN_NAMING_SCOPE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    DefaultFieldMapperGuard {
        previous: set_default_field_mapper(mapper),
        _scope: scope,
    }
}

/// `loginName` / `LoginName` -> `login_name`。
///
/// 连续大写视为缩写：`HTTPServer` -> `http_server`。已是下划线风格的名字保持不变。
pub fn snake_case_mapper(property: &str) -> String {
    let mut column = String::with_capacity(property.len() + 4);
    let mut chars = property.chars().peekable();
    let mut last: Option<char> = None;

    while let Some(c) = chars.next() {
        if c.is_ascii_uppercase() {
            let boundary = match last {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => {
                    chars.peek().is_some_and(|n| n.is_ascii_lowercase())
                }
                _ => false,
            };
            if boundary {
                column.push('_');
            }
            column.push(c.to_ascii_lowercase());
        } else {
            column.push(c);
        }
        last = Some(c);
    }
    column
}
