//! 分页信息。

use serde::Serialize;

/// 分页参数：页大小、当前页与页码起始偏移。
///
/// `current_page()` 含偏移（页码从 1 开始时设置 offset = 1），
/// 记录位置总是按不含偏移的页码计算。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    page_size: i64,
    current_page: i64,
    page_number_offset: i64,
    total_count: i64,
}

/// `Page` 的快照，便于序列化返回给调用方。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub enable: bool,
    pub page_size: i64,
    pub total_count: i64,
    pub total_page: i64,
    pub current_page: i64,
    pub record_position: i64,
}

impl Page {
    pub fn new(page_size: i64, current_page: i64) -> Self {
        let mut page = Self::default();
        page.set_page_size(page_size);
        page.set_current_page(current_page);
        page
    }

    pub fn with_total_count(mut self, total_count: i64) -> Self {
        self.set_total_count(total_count);
        self
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: i64) {
        self.page_size = page_size.max(0);
    }

    pub fn current_page(&self) -> i64 {
        self.current_page.saturating_add(self.page_number_offset)
    }

    /// 传入的页码不含偏移。
    pub fn set_current_page(&mut self, current_page: i64) {
        self.current_page = current_page.max(0);
    }

    pub fn page_number_offset(&self) -> i64 {
        self.page_number_offset
    }

    pub fn set_page_number_offset(&mut self, offset: i64) {
        self.page_number_offset = offset.max(0);
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    pub fn set_total_count(&mut self, total_count: i64) {
        self.total_count = total_count.max(0);
    }

    pub fn is_enabled(&self) -> bool {
        self.page_size > 0
    }

    /// 当前页第一条记录的位置（从 0 开始），溢出时取 `i64::MAX`。
    pub fn first_record_position(&self) -> i64 {
        self.page_size.saturating_mul(self.current_page)
    }

    /// 总页数（含偏移）；没有记录时为 0。
    pub fn total_page(&self) -> i64 {
        if self.total_count == 0 {
            return 0;
        }
        let pages = if self.page_size == 0 {
            1
        } else {
            self.total_count / self.page_size + i64::from(self.total_count % self.page_size != 0)
        };
        pages.saturating_add(self.page_number_offset)
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.saturating_add(1);
    }

    pub fn previous_page(&mut self) {
        self.current_page = (self.current_page - 1).max(0);
    }

    pub fn first_page(&mut self) {
        self.current_page = 0;
    }

    pub fn last_page(&mut self) {
        let pages = self.total_page() - self.page_number_offset;
        self.current_page = (pages - 1).max(0);
    }

    pub fn to_page_info(&self) -> PageInfo {
        PageInfo {
            enable: self.is_enabled(),
            page_size: self.page_size,
            total_count: self.total_count,
            total_page: self.total_page(),
            current_page: self.current_page(),
            record_position: self.first_record_position(),
        }
    }
}
