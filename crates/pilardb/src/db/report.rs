use crate::db::arena::Arena;
use std::fmt::{self, Display};

///
/// TableReport
///
/// Storage accounting for one entity's table. Counts are approximate under
/// concurrent writes; bytes cover resident column pages only.
///

#[derive(Clone, Debug)]
pub struct TableReport {
    pub entity: &'static str,
    pub live_rows: u64,
    pub allocated_rows: u64,
    pub column_pages: usize,
    pub approx_bytes: u64,
    pub id_entries: usize,
}

///
/// StorageReport
///

#[derive(Clone, Debug)]
pub struct StorageReport {
    pub tables: Vec<TableReport>,
}

impl StorageReport {
    #[must_use]
    pub fn total_live_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.live_rows).sum()
    }

    #[must_use]
    pub fn total_approx_bytes(&self) -> u64 {
        self.tables.iter().map(|t| t.approx_bytes).sum()
    }
}

impl Display for StorageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.tables {
            writeln!(
                f,
                "{}: {} live / {} allocated rows, {} pages, ~{} bytes",
                t.entity, t.live_rows, t.allocated_rows, t.column_pages, t.approx_bytes
            )?;
        }
        Ok(())
    }
}

impl Arena {
    /// Snapshot storage accounting across every table.
    #[must_use]
    pub fn storage_report(&self) -> StorageReport {
        let tables = self
            .runtimes()
            .iter()
            .map(|rt| TableReport {
                entity: rt.name,
                live_rows: rt.table.live_count(),
                allocated_rows: rt.table.allocated_count(),
                column_pages: rt.table.allocated_pages(),
                approx_bytes: rt.table.approx_bytes(),
                id_entries: rt.table.id_count(),
            })
            .collect();
        StorageReport { tables }
    }
}
