// store.rs
use crate::types::{RateRecord, Snapshot};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Last retained record per symbol. Symbols are only ever added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryState {
    records: BTreeMap<String, RateRecord>,
}

impl HistoryState {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = Self::default();
        state.absorb(snapshot);
        state
    }

    pub fn get(&self, symbol: &str) -> Option<&RateRecord> {
        self.records.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &RateRecord> {
        self.records.values()
    }

    /// State after `snapshot` is applied: every symbol in it takes the new
    /// record, symbols not in it keep theirs. `self` is left untouched.
    pub fn succeeded_by(&self, snapshot: &Snapshot) -> Self {
        let mut next = self.clone();
        next.absorb(snapshot.iter().cloned());
        next
    }

    fn absorb(&mut self, records: impl IntoIterator<Item = RateRecord>) {
        for rec in records {
            self.records.insert(rec.symbol.clone(), rec);
        }
    }
}

/// Latest-state JSON file, plus an optional compressed audit trail next to it.
pub struct HistoryStore {
    path: PathBuf,
    audit_base: Option<PathBuf>,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            audit_base: None,
        }
    }

    /// Enables the audit trail under `<path>.audit/`.
    pub fn with_audit_log(mut self) -> Self {
        let mut base = self.path.clone().into_os_string();
        base.push(".audit");
        self.audit_base = Some(PathBuf::from(base));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state file, creating it (and its directory) as `[]` when absent.
    pub fn load(&self) -> Result<HistoryState> {
        if !self.path.exists() {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                create_dir_all(dir)
                    .with_context(|| format!("creating state directory {}", dir.display()))?;
            }
            self.write_snapshot(&Vec::new())?;
            return Ok(HistoryState::default());
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading state file {}", self.path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parsing state file {}", self.path.display()))?;
        Ok(HistoryState::from_snapshot(snapshot))
    }

    /// Persists `state` wholesale. Goes through a temp file and a rename so a
    /// reader never sees a partial file.
    pub fn replace_all(&self, state: &HistoryState) -> Result<()> {
        let snapshot: Snapshot = state.records().cloned().collect();
        self.write_snapshot(&snapshot)
    }

    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e)
                .with_context(|| format!("replacing state file {}", self.path.display()));
        }
        Ok(())
    }

    fn part_dir(base: &Path, ts_ms: i64) -> PathBuf {
        let t = OffsetDateTime::from_unix_timestamp_nanos((ts_ms as i128) * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let date = t.date();
        base.join(format!(
            "date={:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        ))
    }

    fn audit_path(&self, ts_ms: i64) -> Option<PathBuf> {
        self.audit_base
            .as_deref()
            .map(|base| Self::part_dir(base, ts_ms).join("snapshots.ndjson.zst"))
    }

    /// Appends one NDJSON line holding the whole snapshot. No-op when the
    /// audit trail is disabled.
    pub fn append_audit(&self, ts_ms: i64, snapshot: &Snapshot) -> Result<()> {
        let Some(path) = self.audit_path(ts_ms) else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut enc = zstd::stream::write::Encoder::new(file, 3)?;
        let line = serde_json::json!({
            "ts_ms": ts_ms,
            "snapshot": snapshot,
        })
        .to_string();
        enc.write_all(line.as_bytes())?;
        enc.write_all(b"\n")?;
        enc.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn rec(symbol: &str, rate: i64, ts: &str) -> RateRecord {
        RateRecord::new(symbol, Decimal::new(rate, 4), ts)
    }

    #[test]
    fn load_creates_missing_file_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/funding.json");
        let store = HistoryStore::new(&path);

        let state = store.load().unwrap();
        assert!(state.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "[]");
    }

    #[test]
    fn write_then_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("funding.json"));
        let mut no_rate = rec("SOL", 0, "2024-01-01T12:00:00.000Z");
        no_rate.funding_rate = None;
        let state = HistoryState::from_snapshot(vec![
            rec("XBT", 100, "2024-01-01T04:00:00.000Z"),
            rec("ETH", -375, "2024-01-01T12:00:00.000Z"),
            no_rate,
        ]);

        store.replace_all(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.get("ETH").unwrap().funding_rate, Some(Decimal::new(-375, 4)));
        assert_eq!(loaded.get("XBT").unwrap().timestamp, json!("2024-01-01T04:00:00.000Z"));
    }

    #[test]
    fn loads_numeric_rates_from_older_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding.json");
        fs::write(
            &path,
            r#"[{"symbol":"XBTUSD","fundingRate":0.01,"timestamp":"2024-01-01T04:00:00.000Z"}]"#,
        )
        .unwrap();

        let state = HistoryStore::new(&path).load().unwrap();
        assert_eq!(state.get("XBTUSD").unwrap().funding_rate, Some(Decimal::new(1, 2)));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding.json");
        fs::write(&path, "{not json").unwrap();
        assert!(HistoryStore::new(&path).load().is_err());
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding.json");
        // a non-empty directory where the state file should be makes the rename fail
        fs::create_dir_all(path.join("occupied")).unwrap();
        let store = HistoryStore::new(&path);

        let state = HistoryState::from_snapshot(vec![rec("XBT", 1, "a")]);
        assert!(store.replace_all(&state).is_err());
        assert!(!dir.path().join("funding.json.tmp").exists());
        assert!(path.is_dir());
    }

    #[test]
    fn succeeded_by_replaces_and_never_prunes() {
        let before = HistoryState::from_snapshot(vec![rec("XBT", 1, "a"), rec("ETH", 2, "a")]);
        let after = before.succeeded_by(&vec![rec("XBT", 9, "b"), rec("SOL", 3, "b")]);

        assert_eq!(after.len(), 3);
        assert_eq!(after.get("XBT"), Some(&rec("XBT", 9, "b")));
        assert_eq!(after.get("ETH"), Some(&rec("ETH", 2, "a")));
        assert_eq!(before.get("XBT"), Some(&rec("XBT", 1, "a")));
    }

    #[test]
    fn audit_log_appends_compressed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funding.json");
        let store = HistoryStore::new(&path).with_audit_log();
        let ts_ms = 1_704_067_200_000; // 2024-01-01T00:00:00Z

        store.append_audit(ts_ms, &vec![rec("XBT", 1, "a")]).unwrap();
        store.append_audit(ts_ms + 60_000, &vec![rec("XBT", 2, "b")]).unwrap();

        let audit = dir
            .path()
            .join("funding.json.audit/date=2024-01-01/snapshots.ndjson.zst");
        let bytes = zstd::decode_all(fs::File::open(audit).unwrap()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["snapshot"][0]["symbol"], "XBT");
        assert!(!path.exists());
    }

    #[test]
    fn audit_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("funding.json"));
        store.append_audit(0, &vec![rec("XBT", 1, "a")]).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
