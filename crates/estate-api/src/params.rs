use serde::Deserialize;

use estate_query::PageSpec;
use estate_query::page::DEFAULT_PER_PAGE;

/// `?page=&per_page=` on list endpoints that don't take property filters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn spec(&self) -> PageSpec {
        PageSpec::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(DEFAULT_PER_PAGE),
        )
    }
}
