use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;

/// One page of results plus the listing metadata the API exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl PageMeta {
    pub fn new(current_page: u32, per_page: u32, total: u64) -> Self {
        let per_page = per_page.max(1);
        let last_page = (total.div_ceil(per_page as u64)).max(1) as u32;
        Self {
            current_page: current_page.max(1),
            last_page,
            per_page,
            total,
        }
    }
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, current_page: u32, per_page: u32, total: u64) -> Self {
        Self {
            meta: PageMeta::new(current_page, per_page, total),
            data,
        }
    }
}
