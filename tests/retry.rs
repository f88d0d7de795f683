use std::sync::atomic::{AtomicU32, Ordering};

use idp_portal::PortalError;
use idp_portal::retry::{RetryPolicy, RetryingStore};
use idp_portal::store::{MemoryStore, RecordStore};
use idp_portal::table::{Row, Table};

/// Fails the next `failures` writes. With `apply_first` the write reaches
/// the inner store before the failure is reported.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicU32,
    load_failures: AtomicU32,
    apply_first: bool,
    permanent: bool,
    writes: AtomicU32,
}

impl FlakyStore {
    fn new(failures: u32, apply_first: bool) -> Self {
        Self {
            inner: MemoryStore::with_catalog(),
            failures: AtomicU32::new(failures),
            load_failures: AtomicU32::new(0),
            apply_first,
            permanent: false,
            writes: AtomicU32::new(0),
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn error(&self, table: &str) -> PortalError {
        if self.permanent {
            PortalError::unavailable(table, "permission denied")
        } else {
            PortalError::transient(table, "HTTP 503")
        }
    }
}

impl RecordStore for FlakyStore {
    fn load(&self, table: &str) -> idp_portal::Result<Table> {
        if Self::take_failure(&self.load_failures) {
            return Err(self.error(table));
        }
        self.inner.load(table)
    }

    fn replace_all(&self, table: &str, header: &[String], rows: &[Row]) -> idp_portal::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failures) {
            if self.apply_first {
                self.inner.replace_all(table, header, rows)?;
            }
            return Err(self.error(table));
        }
        self.inner.replace_all(table, header, rows)
    }

    fn append(&self, table: &str, values: &[String]) -> idp_portal::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failures) {
            if self.apply_first {
                self.inner.append(table, values)?;
            }
            return Err(self.error(table));
        }
        self.inner.append(table, values)
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn players_rows(store: &impl RecordStore) -> usize {
    store.load("Players").expect("load").len()
}

#[test]
fn transient_load_is_retried() {
    let flaky = FlakyStore::new(0, false);
    flaky.load_failures.store(2, Ordering::SeqCst);
    let store = RetryingStore::new(flaky, RetryPolicy::no_delay(3));
    assert!(store.load("Players").is_ok());
}

#[test]
fn load_gives_up_after_max_attempts() {
    let flaky = FlakyStore::new(0, false);
    flaky.load_failures.store(5, Ordering::SeqCst);
    let store = RetryingStore::new(flaky, RetryPolicy::no_delay(3));
    let err = store.load("Players").expect_err("exhausted");
    assert!(err.is_transient());
}

#[test]
fn permanent_error_is_not_retried() {
    let mut flaky = FlakyStore::new(1, false);
    flaky.permanent = true;
    let store = RetryingStore::new(flaky, RetryPolicy::no_delay(3));
    let err = store
        .append("Players", &strings(&["Ana", "U19"]))
        .expect_err("permanent");
    assert!(!err.is_transient());
    assert_eq!(store.inner().writes.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_append_is_sent_again() {
    let store = RetryingStore::new(FlakyStore::new(1, false), RetryPolicy::no_delay(3));
    store
        .append("Players", &strings(&["Ana", "U19"]))
        .expect("append");
    assert_eq!(store.inner().writes.load(Ordering::SeqCst), 2);
    assert_eq!(players_rows(&store), 1);
}

#[test]
fn applied_append_is_not_duplicated() {
    let store = RetryingStore::new(FlakyStore::new(1, true), RetryPolicy::no_delay(3));
    store
        .append("Players", &strings(&["Ana", "U19"]))
        .expect("append");
    assert_eq!(store.inner().writes.load(Ordering::SeqCst), 1);
    assert_eq!(players_rows(&store), 1);
}

fn ana_row(header: &[String]) -> Row {
    let mut row: Row = header.iter().map(|col| (col.clone(), String::new())).collect();
    row.insert("Player Name".to_string(), "Ana".to_string());
    row
}

#[test]
fn applied_replace_is_recognised_by_fingerprint() {
    let store = RetryingStore::new(FlakyStore::new(1, true), RetryPolicy::no_delay(3));
    let header = store.load("Players").expect("load").header;
    store
        .replace_all("Players", &header, &[ana_row(&header)])
        .expect("replace");
    assert_eq!(store.inner().writes.load(Ordering::SeqCst), 1);
    assert_eq!(players_rows(&store), 1);
}

#[test]
fn unapplied_replace_is_sent_again() {
    let store = RetryingStore::new(FlakyStore::new(2, false), RetryPolicy::no_delay(3));
    let header = store.load("Players").expect("load").header;
    store
        .replace_all("Players", &header, &[ana_row(&header)])
        .expect("replace");
    assert_eq!(store.inner().writes.load(Ordering::SeqCst), 3);
    assert_eq!(players_rows(&store), 1);
}

#[test]
fn replace_reports_last_error_when_exhausted() {
    let store = RetryingStore::new(FlakyStore::new(9, false), RetryPolicy::no_delay(2));
    let header = store.load("Players").expect("load").header;
    let err = store
        .replace_all("Players", &header, &[ana_row(&header)])
        .expect_err("exhausted");
    assert!(err.is_transient());
    assert_eq!(store.inner().writes.load(Ordering::SeqCst), 2);
}

#[test]
fn applied_replace_with_trailing_blank_row_is_recognised() {
    let store = RetryingStore::new(FlakyStore::new(2, true), RetryPolicy::no_delay(2));
    let header = store.load("Players").expect("load").header;
    let blank: Row = header.iter().map(|col| (col.clone(), String::new())).collect();
    store
        .replace_all("Players", &header, &[ana_row(&header), blank])
        .expect("replace landed on the first attempt");
    assert_eq!(store.inner().writes.load(Ordering::SeqCst), 1);
    assert_eq!(players_rows(&store), 1);
}
