//! 拼接 SQL 片段的缓冲区。

#[derive(Debug, Default, Clone)]
pub(crate) struct StringBuilder {
    sql: String,
}

impl StringBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// 非首个片段前补一个空格。
    pub(crate) fn push_spaced(&mut self, fragment: &str) -> &mut Self {
        if !self.sql.is_empty() && !self.sql.ends_with(' ') {
            self.sql.push(' ');
        }
        self.push(fragment)
    }

    /// 以 `sep` 连接各项，空项跳过。
    pub(crate) fn push_joined<I, S>(&mut self, items: I, sep: &str) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut wrote = false;
        for item in items {
            let item = item.as_ref();
            if item.is_empty() {
                continue;
            }
            if wrote {
                self.sql.push_str(sep);
            }
            self.sql.push_str(item);
            wrote = true;
        }
        self
    }

    pub(crate) fn finish(self) -> String {
        self.sql
    }
}
