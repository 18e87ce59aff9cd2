///
/// ArenaConfig
///
/// Recognized configuration knobs. Page geometry is fixed at construction;
/// a table holds at most `max_pages * page_size` rows and surfaces
/// `CapacityExceeded` beyond that.
///

#[derive(Clone, Debug)]
pub struct ArenaConfig {
    /// Rows per column page. Larger pages mean fewer allocations and more
    /// up-front memory per touched page.
    pub page_size: usize,
    /// Upper bound of pages per column; caps table size.
    pub max_pages: usize,
    /// Build string prefix-anchor indexes where declared.
    pub enable_prefix_index: bool,
    /// Build string suffix-anchor indexes where declared.
    pub enable_suffix_index: bool,
    /// Alias recognized for the primary-key field name at registration.
    pub id_column_override: Option<&'static str>,
    /// Accepted for parity with runtimes that emit specialized executor
    /// code. This engine always uses the compiled function-table executors,
    /// so the knob has no effect.
    pub codegen: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            page_size: 1024,
            max_pages: 1024,
            enable_prefix_index: true,
            enable_suffix_index: true,
            id_column_override: None,
            codegen: false,
        }
    }
}

impl ArenaConfig {
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.page_size * self.max_pages
    }

    #[must_use]
    pub const fn page_size(mut self, rows: usize) -> Self {
        self.page_size = rows;
        self
    }

    #[must_use]
    pub const fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }
}
