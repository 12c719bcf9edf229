//! Event recording for market runs.
//!
//! A `tracing` subscriber turns every `info!` event into one row of a
//! column table named after the event's target (`trade`, `good_market`,
//! `archetype`, `bankruptcy`, `respawn`). Columns appear the first time a
//! field is seen; rows that lack a field get a zero / empty value.
//!
//! # Usage
//!
//! ```ignore
//! // In simulation code:
//! tracing::info!(target: "trade", tick, good_id, quantity, price);
//!
//! // In a test:
//! instrument::install_subscriber();
//! // ... run ticks ...
//! let recorder = instrument::drain();
//! let grain_prices = recorder.series("good_market", "good_id", 0, "avg_price");
//! ```
//!
//! Storage is thread-local. Events must be emitted from the thread that
//! later drains the recorder.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Metadata, Subscriber};

// === COLUMNS ===

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::U64(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fill_to(&mut self, rows: usize) {
        let missing = rows.saturating_sub(self.len());
        if missing == 0 {
            return;
        }
        match self {
            ColumnData::U64(v) => v.extend(std::iter::repeat_n(0, missing)),
            ColumnData::I64(v) => v.extend(std::iter::repeat_n(0, missing)),
            ColumnData::F64(v) => v.extend(std::iter::repeat_n(0.0, missing)),
            ColumnData::Bool(v) => v.extend(std::iter::repeat_n(false, missing)),
            ColumnData::Str(v) => v.extend(std::iter::repeat_n(String::new(), missing)),
        }
    }

    /// Numeric view of row `i`, whatever the stored integer / float type.
    fn number(&self, i: usize) -> Option<f64> {
        match self {
            ColumnData::U64(v) => v.get(i).map(|&x| x as f64),
            ColumnData::I64(v) => v.get(i).map(|&x| x as f64),
            ColumnData::F64(v) => v.get(i).copied(),
            ColumnData::Bool(_) | ColumnData::Str(_) => None,
        }
    }
}

/// All rows recorded for one target.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub columns: HashMap<String, ColumnData>,
    pub rows: usize,
}

impl EventTable {
    /// Close the current row: every column gets exactly `rows` values.
    fn finish_row(&mut self) {
        self.rows += 1;
        let rows = self.rows;
        for col in self.columns.values_mut() {
            col.fill_to(rows);
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.get(name)
    }

    pub fn f64s(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            ColumnData::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn u64s(&self, name: &str) -> Option<&[u64]> {
        match self.columns.get(name)? {
            ColumnData::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn strs(&self, name: &str) -> Option<&[String]> {
        match self.columns.get(name)? {
            ColumnData::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        // Sorted for a stable column order
        let mut names: Vec<&String> = self.columns.keys().collect();
        names.sort();

        let columns = names
            .into_iter()
            .map(|name| match &self.columns[name] {
                ColumnData::U64(v) => Column::new(name.into(), v),
                ColumnData::I64(v) => Column::new(name.into(), v),
                ColumnData::F64(v) => Column::new(name.into(), v),
                ColumnData::Bool(v) => Column::new(name.into(), v),
                ColumnData::Str(v) => Column::new(name.into(), v),
            })
            .collect();

        DataFrame::new(columns)
    }
}

/// Every table recorded on this thread, keyed by target.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, EventTable>,
}

impl Recorder {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }

    pub fn rows(&self, target: &str) -> usize {
        self.tables.get(target).map_or(0, |t| t.rows)
    }

    /// Values of `value_field` for the rows whose `key_field` equals `key`,
    /// in emission order. Used to pull one good's or one archetype's series
    /// out of a per-tick table.
    pub fn series(&self, target: &str, key_field: &str, key: u64, value_field: &str) -> Vec<f64> {
        let Some(table) = self.tables.get(target) else {
            return Vec::new();
        };
        let (Some(keys), Some(values)) = (table.column(key_field), table.column(value_field))
        else {
            return Vec::new();
        };
        (0..table.rows)
            .filter(|&i| keys.number(i) == Some(key as f64))
            .filter_map(|i| values.number(i))
            .collect()
    }

    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::default();
}

// === SUBSCRIBER ===

struct RowVisitor<'a> {
    table: &'a mut EventTable,
}

impl RowVisitor<'_> {
    fn column(&mut self, field: &Field, empty: impl FnOnce(usize) -> ColumnData) -> &mut ColumnData {
        let rows = self.table.rows;
        self.table
            .columns
            .entry(field.name().to_string())
            .or_insert_with(|| empty(rows))
    }
}

impl Visit for RowVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if let ColumnData::U64(v) = self.column(field, |n| ColumnData::U64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let ColumnData::I64(v) = self.column(field, |n| ColumnData::I64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let ColumnData::F64(v) = self.column(field, |n| ColumnData::F64(vec![0.0; n])) {
            v.push(value);
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if let ColumnData::Bool(v) = self.column(field, |n| ColumnData::Bool(vec![false; n])) {
            v.push(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let ColumnData::Str(v) = self.column(field, |n| ColumnData::Str(vec![String::new(); n])) {
            v.push(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

/// Collects info-level events into the thread-local `Recorder`. Spans are ignored.
pub struct TableSubscriber;

impl Subscriber for TableSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= tracing::Level::INFO
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let target = event.metadata().target();
        RECORDER.with(|r| {
            let mut recorder = r.borrow_mut();
            let table = recorder.tables.entry(target.to_string()).or_default();
            event.record(&mut RowVisitor { table: &mut *table });
            table.finish_row();
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install `TableSubscriber` as the global default. Later calls are no-ops.
pub fn install_subscriber() {
    let _ = tracing::subscriber::set_global_default(TableSubscriber);
}

/// Take everything recorded on this thread so far.
pub fn drain() -> Recorder {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

pub fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = Recorder::default());
}

pub fn drain_to_dataframes() -> HashMap<String, DataFrame> {
    drain().to_dataframes()
}

// === PARQUET ===

fn io_error(e: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: e.into(),
        msg: None,
    }
}

/// Write each table to `{dir}/{target}.parquet`.
pub fn save_parquet(dfs: &mut HashMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_error)?;
    for (name, df) in dfs.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{name}.parquet"))).map_err(io_error)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .take(60)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Clears the recorder on creation and writes every table to
/// `{parent}/{name}/` as parquet on drop.
///
/// ```ignore
/// let mut rec = instrument::ScopedRecorder::new("runs", "scarcity_shock");
/// world.run(500);
/// let dfs = rec.get();
/// // rec drops -> runs/scarcity_shock/*.parquet
/// ```
pub struct ScopedRecorder {
    run_dir: PathBuf,
    dfs: Option<HashMap<String, DataFrame>>,
}

impl ScopedRecorder {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        clear();
        install_subscriber();
        Self {
            run_dir: parent.into().join(sanitize(name)),
            dfs: None,
        }
    }

    /// Drains on first call; later calls return the same frames.
    pub fn get(&mut self) -> &HashMap<String, DataFrame> {
        self.dfs.get_or_insert_with(drain_to_dataframes)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl Drop for ScopedRecorder {
    fn drop(&mut self) {
        let mut dfs = self.dfs.take().unwrap_or_else(drain_to_dataframes);
        if dfs.is_empty() {
            return;
        }
        if let Err(e) = save_parquet(&mut dfs, &self.run_dir) {
            eprintln!("ScopedRecorder({}): failed to write parquet: {e}", self.run_dir.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;

    #[test]
    fn test_missing_fields_are_filled() {
        clear();
        with_default(TableSubscriber, || {
            tracing::info!(target: "respawn", tick = 1u64, archetype = 0u64, reason = "scarce");
            tracing::info!(target: "respawn", tick = 2u64, archetype = 1u64, count = 3u64);
        });
        let recorder = drain();
        let table = recorder.table("respawn").unwrap();

        assert_eq!(table.rows, 2);
        for (name, col) in &table.columns {
            assert_eq!(col.len(), 2, "column {name} out of step");
        }
        assert_eq!(table.u64s("count"), Some(&[0, 3][..]), "new column back-filled");
        assert_eq!(table.strs("reason").unwrap()[1], "", "absent field filled");
    }

    #[test]
    fn test_series_filters_by_key() {
        clear();
        with_default(TableSubscriber, || {
            for tick in 1..=3u64 {
                for good in 0..2u64 {
                    let price = tick as f64 + good as f64 * 10.0;
                    tracing::info!(target: "good_market", tick = tick, good_id = good, avg_price = price);
                }
            }
        });
        let recorder = drain();

        assert_eq!(recorder.series("good_market", "good_id", 1, "avg_price"), vec![11.0, 12.0, 13.0]);
        assert_eq!(recorder.series("good_market", "good_id", 0, "tick"), vec![1.0, 2.0, 3.0]);
        assert!(recorder.series("good_market", "good_id", 5, "avg_price").is_empty());
        assert!(recorder.series("trade", "good_id", 0, "price").is_empty());
    }

    #[test]
    fn test_dataframe_conversion() {
        clear();
        with_default(TableSubscriber, || {
            tracing::info!(target: "trade", tick = 1u64, quantity = 2.5f64, price = 1.02f64);
            tracing::info!(target: "trade", tick = 1u64, quantity = 1.0f64, price = 0.98f64);
        });
        let dfs = drain_to_dataframes();
        let df = &dfs["trade"];
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);
        assert!(drain().tables.is_empty(), "drain empties the recorder");
    }
}
