use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Mutex;

use shipwright_utils::ShipwrightError;
use shipwright_utils::atomic_write::write_json_atomic;

use crate::record::BudgetRecord;

/// Persistence for per-day budget records
pub trait BudgetStore: Send + Sync {
    fn load(&self, date: NaiveDate) -> Result<Option<BudgetRecord>, ShipwrightError>;

    /// Most recent record strictly before `date`
    fn latest_before(&self, date: NaiveDate) -> Result<Option<BudgetRecord>, ShipwrightError>;

    fn save(&self, record: &BudgetRecord) -> Result<(), ShipwrightError>;
}

/// One JSON file per day: `<dir>/YYYY-MM-DD.json`
#[derive(Debug, Clone)]
pub struct FileBudgetStore {
    dir: Utf8PathBuf,
}

impl FileBudgetStore {
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `<home>/budget`
    #[must_use]
    pub fn at_home() -> Self {
        Self::new(shipwright_utils::paths::budget_dir())
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn path_for(&self, date: NaiveDate) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    fn read(path: &Utf8Path) -> Result<Option<BudgetRecord>, ShipwrightError> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| ShipwrightError::storage(path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShipwrightError::storage(path, e)),
        }
    }
}

impl BudgetStore for FileBudgetStore {
    fn load(&self, date: NaiveDate) -> Result<Option<BudgetRecord>, ShipwrightError> {
        Self::read(&self.path_for(date))
    }

    fn latest_before(&self, date: NaiveDate) -> Result<Option<BudgetRecord>, ShipwrightError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ShipwrightError::storage(&self.dir, e)),
        };

        let mut latest: Option<NaiveDate> = None;
        for entry in entries {
            let entry = entry.map_err(|e| ShipwrightError::storage(&self.dir, e))?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            let Ok(day) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
                continue;
            };
            if day < date && latest.is_none_or(|l| day > l) {
                latest = Some(day);
            }
        }

        match latest {
            Some(day) => Self::read(&self.path_for(day)),
            None => Ok(None),
        }
    }

    fn save(&self, record: &BudgetRecord) -> Result<(), ShipwrightError> {
        let path = self.path_for(record.date);
        write_json_atomic(&path, record).map_err(|e| ShipwrightError::storage(&path, format!("{e:#}")))
    }
}

/// In-memory store for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryBudgetStore {
    records: Mutex<BTreeMap<NaiveDate, BudgetRecord>>,
}

impl MemoryBudgetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from existing records, e.g. a copy of the on-disk history
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = BudgetRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|r| (r.date, r)).collect()),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, BTreeMap<NaiveDate, BudgetRecord>> {
        // A poisoned map is still a consistent map: every write is a single insert.
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl BudgetStore for MemoryBudgetStore {
    fn load(&self, date: NaiveDate) -> Result<Option<BudgetRecord>, ShipwrightError> {
        Ok(self.guard().get(&date).cloned())
    }

    fn latest_before(&self, date: NaiveDate) -> Result<Option<BudgetRecord>, ShipwrightError> {
        Ok(self
            .guard()
            .range(..date)
            .next_back()
            .map(|(_, r)| r.clone()))
    }

    fn save(&self, record: &BudgetRecord) -> Result<(), ShipwrightError> {
        self.guard().insert(record.date, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use chrono::Utc;
    use tempfile::TempDir;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn file_store(temp: &TempDir) -> FileBudgetStore {
        FileBudgetStore::new(Utf8PathBuf::from_path_buf(temp.path().join("budget")).unwrap())
    }

    #[test]
    fn test_file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp);
        let mut record = BudgetRecord::new(day("2026-03-01"), Money::from_cents(500), Utc::now());
        record.spent = Money::from_cents(123);

        store.save(&record).unwrap();

        assert!(temp.path().join("budget").join("2026-03-01.json").is_file());
        assert_eq!(store.load(day("2026-03-01")).unwrap(), Some(record));
        assert_eq!(store.load(day("2026-03-02")).unwrap(), None);
    }

    #[test]
    fn test_file_store_latest_before() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp);
        for d in ["2026-02-27", "2026-03-01", "2026-03-05"] {
            store
                .save(&BudgetRecord::new(day(d), Money::from_cents(500), Utc::now()))
                .unwrap();
        }
        std::fs::write(temp.path().join("budget").join("notes.txt"), "ignored").unwrap();

        let latest = store.latest_before(day("2026-03-04")).unwrap().unwrap();

        assert_eq!(latest.date, day("2026-03-01"));
        assert!(store.latest_before(day("2026-02-27")).unwrap().is_none());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp);
        assert!(store.latest_before(day("2026-03-04")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record_is_storage_error() {
        let temp = TempDir::new().unwrap();
        let store = file_store(&temp);
        std::fs::create_dir_all(temp.path().join("budget")).unwrap();
        std::fs::write(temp.path().join("budget").join("2026-03-01.json"), "{not json").unwrap();

        assert!(matches!(
            store.load(day("2026-03-01")),
            Err(ShipwrightError::Storage { .. })
        ));
    }

    #[test]
    fn test_memory_store_latest_before() {
        let store = MemoryBudgetStore::with_records([
            BudgetRecord::new(day("2026-03-01"), Money::from_cents(500), Utc::now()),
            BudgetRecord::new(day("2026-03-03"), Money::from_cents(500), Utc::now()),
        ]);

        assert_eq!(
            store.latest_before(day("2026-03-03")).unwrap().map(|r| r.date),
            Some(day("2026-03-01"))
        );
    }
}
