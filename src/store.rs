use log::{error, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::errors::StoreError;
use crate::member::{Column, MemberRecord};
use crate::normalize::{is_header_leak, normalize_record};
use crate::roster::{Origin, Table, new_member_id};

/// One sheet row keyed by header text.
pub type RawRecord = BTreeMap<String, String>;

/// The spreadsheet collaborator.
///
/// Implementations only move untyped grids around; all schema handling
/// lives in [`RecordStore`].
pub trait SheetBackend: Send + Sync {
    /// Every data row, keyed by the header row. Cells missing from a short
    /// row may simply be absent from its map.
    fn get_all_records(&self) -> Result<Vec<RawRecord>, StoreError>;

    /// Empties the sheet.
    fn clear(&self) -> Result<(), StoreError>;

    /// Writes `rows` starting at the first cell; the first row is the header.
    fn update(&self, rows: &[Vec<String>]) -> Result<(), StoreError>;
}

/// Converts a header-first grid into records.
pub fn records_from_grid(grid: &[Vec<String>]) -> Vec<RawRecord> {
    let Some((header, rows)) = grid.split_first() else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            header
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.clone(), v.clone()))
                .collect()
        })
        .collect()
}

/// Content fingerprint of a sheet, used as the table's version stamp.
///
/// Empty cells and blank rows are skipped so backends that omit trailing
/// blanks hash the same as those that keep them.
pub fn fingerprint(records: &[RawRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        let mut any = false;
        for (header, value) in record {
            if value.is_empty() {
                continue;
            }
            any = true;
            hasher.update(header.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        if any {
            hasher.update([1u8]);
        }
    }
    hex::encode(hasher.finalize())
}

/// Outcome of a whole-table overwrite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub rows_written: usize,
    /// The sheet had changed since this table was loaded; those changes
    /// were overwritten.
    pub conflict: bool,
    pub version: String,
}

/// Schema-aware adapter over a [`SheetBackend`].
pub struct RecordStore {
    backend: Box<dyn SheetBackend>,
}

impl RecordStore {
    pub fn new(backend: Box<dyn SheetBackend>) -> Self {
        RecordStore { backend }
    }

    /// Reads and normalizes the whole roster.
    pub fn load(&self) -> Result<Table, StoreError> {
        let raw = self.backend.get_all_records()?;
        let version = fingerprint(&raw);

        let mut records = Vec::with_capacity(raw.len());
        let mut seen_ids = HashSet::new();
        let mut dropped = 0;
        for (i, row) in raw.iter().enumerate() {
            let mut record = record_from_raw(row);
            if is_blank(&record) || is_header_leak(&record.name) {
                dropped += 1;
                continue;
            }
            if record.name.is_empty() {
                // sheet row, counting the header
                warn!("row {} has data but no name; dropped", i + 2);
                dropped += 1;
                continue;
            }
            if record.id.is_empty() || seen_ids.contains(&record.id) {
                if !record.id.is_empty() {
                    warn!("duplicate member id {} on '{}', issuing a new one", record.id, record.name);
                }
                record.id = new_member_id();
            }
            seen_ids.insert(record.id.clone());
            records.push(record);
        }

        if dropped > 0 {
            warn!("dropped {} blank, unnamed or header rows while loading", dropped);
        }
        info!("loaded {} members (version {})", records.len(), &version[..12]);
        Ok(Table::with_origin(records, Origin::Loaded { version }))
    }

    /// Like [`load`](Self::load), but an unreachable sheet yields an empty,
    /// unsaveable table instead of an error.
    pub fn load_or_empty(&self) -> Table {
        match self.load() {
            Ok(table) => table,
            Err(e) => {
                warn!("{}; continuing with an empty roster", e);
                Table::degraded()
            }
        }
    }

    /// Overwrites the whole sheet with `table`.
    ///
    /// When the sheet changed after `table` was loaded the other session's
    /// edits are lost; this is reported through `SaveReport::conflict` and a
    /// warning, and the write still happens.
    pub fn save(&self, table: &mut Table) -> Result<SaveReport, StoreError> {
        if *table.origin() == Origin::Degraded {
            return Err(StoreError::Unavailable(
                "roster was never loaded from the sheet; reload before saving".to_string(),
            ));
        }

        let current = fingerprint(&self.backend.get_all_records()?);
        let conflict = match table.origin() {
            Origin::Loaded { version } => *version != current,
            Origin::Fresh => current != fingerprint(&[]),
            Origin::Degraded => true,
        };
        if conflict {
            warn!(
                "sheet changed since this roster was loaded; overwriting the other edits (last writer wins)"
            );
        }

        let mut grid = Vec::with_capacity(table.len() + 1);
        grid.push(Column::header_row());
        grid.extend(table.iter().map(|r| normalize_record(r).to_row()));

        self.backend.clear()?;
        if let Err(e) = self.backend.update(&grid) {
            error!("sheet cleared but rewrite failed: {}", e);
            return Err(e);
        }

        let version = fingerprint(&records_from_grid(&grid));
        table.set_origin(Origin::Loaded {
            version: version.clone(),
        });
        info!("saved {} members", table.len());
        Ok(SaveReport {
            rows_written: table.len(),
            conflict,
            version,
        })
    }

    /// Save for UI callers: failures are logged and turn into `None`.
    pub fn save_or_skip(&self, table: &mut Table) -> Option<SaveReport> {
        match self.save(table) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("save skipped: {}", e);
                None
            }
        }
    }
}

fn record_from_raw(row: &RawRecord) -> MemberRecord {
    let mut cells: HashMap<Column, &str> = HashMap::new();
    for (header, value) in row {
        if let Some(column) = Column::from_header(header) {
            let slot = cells.entry(column).or_insert("");
            if slot.trim().is_empty() {
                *slot = value.as_str();
            }
        }
    }
    MemberRecord::from_cells(|column| cells.get(&column).copied().unwrap_or_default().to_string())
}

fn is_blank(record: &MemberRecord) -> bool {
    Column::ALL.iter().all(|c| record.cell(*c).is_empty())
}

/// Sheet held in process memory.
#[derive(Default)]
pub struct MemorySheet {
    grid: RwLock<Vec<Vec<String>>>,
    offline: AtomicBool,
}

impl MemorySheet {
    pub fn new(grid: Vec<Vec<String>>) -> Self {
        MemorySheet {
            grid: RwLock::new(grid),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulates losing the connection to the sheet.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn grid(&self) -> Vec<Vec<String>> {
        self.grid.read().map(|g| g.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory sheet is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SheetBackend for MemorySheet {
    fn get_all_records(&self) -> Result<Vec<RawRecord>, StoreError> {
        self.check()?;
        let grid = self
            .grid
            .read()
            .map_err(|_| StoreError::Unavailable("memory sheet lock poisoned".to_string()))?;
        Ok(records_from_grid(&grid))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.check()?;
        let mut grid = self
            .grid
            .write()
            .map_err(|_| StoreError::Unavailable("memory sheet lock poisoned".to_string()))?;
        grid.clear();
        Ok(())
    }

    fn update(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        self.check()?;
        let mut grid = self
            .grid
            .write()
            .map_err(|_| StoreError::Unavailable("memory sheet lock poisoned".to_string()))?;
        *grid = rows.to_vec();
        Ok(())
    }
}

// A shared sheet can back several stores, e.g. two sessions in tests.
impl<T: SheetBackend + ?Sized> SheetBackend for std::sync::Arc<T> {
    fn get_all_records(&self) -> Result<Vec<RawRecord>, StoreError> {
        (**self).get_all_records()
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }

    fn update(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        (**self).update(rows)
    }
}
