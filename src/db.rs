//! Interval store.
//!
//! Four tables keyed by natural key. Every call goes through the single mutex,
//! so concurrent callers queue up instead of racing on upserts. When opened
//! with a directory, each table has an append-only JSON Lines journal: an upsert
//! appends only the records it inserted or updated, and the replay on open keeps
//! the last line of each key. Oversized journals are compacted on open.

mod calculation;
mod consumption;
mod query;
mod rate;
mod standing_charge;

use std::{
    collections::BTreeMap,
    fmt::Debug,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

pub use self::{
    calculation::{CalculationKey, CostCalculation, IntervalType},
    consumption::ConsumptionInterval,
    query::{Order, Query},
    rate::RateInterval,
    standing_charge::StandingCharge,
};
use crate::prelude::*;

/// Anything that lives in one of the tables.
pub trait Record: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Key: Ord + Clone + Debug + Send + Sync;

    /// Table name, also the journal file stem when persisted.
    const TABLE: &'static str;

    fn key(&self) -> Self::Key;

    fn rows(tables: &Tables) -> &BTreeMap<Self::Key, Self>;

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Key, Self>;
}

/// Record that is valid over `[start, end)`.
pub trait Timed: Record {
    fn start(&self) -> DateTime<Utc>;

    /// `None` means open-ended.
    fn end(&self) -> Option<DateTime<Utc>>;

    /// Tariff that the record belongs to, `None` for tariff-independent series.
    fn tariff_code(&self) -> Option<&str>;

    #[must_use]
    fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.start() <= instant && self.end().is_none_or(|end| instant < end)
    }
}

#[derive(Default)]
pub struct Tables {
    rates: BTreeMap<<RateInterval as Record>::Key, RateInterval>,
    standing_charges: BTreeMap<<StandingCharge as Record>::Key, StandingCharge>,
    consumption: BTreeMap<<ConsumptionInterval as Record>::Key, ConsumptionInterval>,
    calculations: BTreeMap<<CostCalculation as Record>::Key, CostCalculation>,
}

struct Inner {
    tables: Tables,
    directory: Option<PathBuf>,
}

#[must_use]
#[derive(Clone)]
pub struct Db(Arc<Mutex<Inner>>);

impl Db {
    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(Inner { tables: Tables::default(), directory: None })))
    }

    /// Open the store persisted in the directory, creating it when missing.
    #[instrument(skip_all, fields(directory = %directory.as_ref().display()))]
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).await?;
        let mut inner = Inner { tables: Tables::default(), directory: Some(directory) };
        inner.load::<RateInterval>().await?;
        inner.load::<StandingCharge>().await?;
        inner.load::<ConsumptionInterval>().await?;
        inner.load::<CostCalculation>().await?;
        Ok(Self(Arc::new(Mutex::new(inner))))
    }

    pub const fn table<R: Record>(&self) -> Table<'_, R> {
        Table { db: self, marker: PhantomData }
    }

    pub const fn rates(&self) -> Table<'_, RateInterval> {
        self.table()
    }

    pub const fn standing_charges(&self) -> Table<'_, StandingCharge> {
        self.table()
    }

    pub const fn consumption(&self) -> Table<'_, ConsumptionInterval> {
        self.table()
    }

    pub const fn calculations(&self) -> Table<'_, CostCalculation> {
        self.table()
    }
}

/// Outcome of an upsert.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, derive_more::AddAssign)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Local extent of a time series.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Extent {
    pub min_start: DateTime<Utc>,
    pub max_start: DateTime<Utc>,

    /// `None` when the latest record is open-ended.
    pub max_end: Option<DateTime<Utc>>,

    pub count: usize,
}

#[must_use]
pub struct Table<'a, R> {
    db: &'a Db,
    marker: PhantomData<R>,
}

impl<R: Record> Table<'_, R> {
    /// Insert new records and update existing ones in place, matching by the natural key.
    #[instrument(skip_all, fields(table = R::TABLE, n_records = records.len()))]
    pub async fn upsert(&self, records: Vec<R>) -> Result<UpsertSummary> {
        let mut inner = self.db.0.lock().await;
        let rows = R::rows_mut(&mut inner.tables);
        let mut summary = UpsertSummary::default();
        let mut changed = Vec::new();
        for record in records {
            match rows.get_mut(&record.key()) {
                Some(existing) if *existing == record => summary.unchanged += 1,
                Some(existing) => {
                    *existing = record.clone();
                    changed.push(record);
                    summary.updated += 1;
                }
                None => {
                    rows.insert(record.key(), record.clone());
                    changed.push(record);
                    summary.inserted += 1;
                }
            }
        }
        if !changed.is_empty() {
            inner.append(&changed).await?;
        }
        debug!(?summary, "upserted");
        Ok(summary)
    }

    pub async fn get(&self, key: &R::Key) -> Result<Option<R>> {
        let inner = self.db.0.lock().await;
        Ok(R::rows(&inner.tables).get(key).cloned())
    }

    #[instrument(skip_all, fields(table = R::TABLE))]
    pub async fn find(&self, query: Query<R>) -> Result<Vec<R>> {
        let inner = self.db.0.lock().await;
        Ok(query.apply(R::rows(&inner.tables).values()))
    }

    pub async fn count(&self, filter: impl Fn(&R) -> bool + Send) -> Result<usize> {
        let inner = self.db.0.lock().await;
        Ok(R::rows(&inner.tables).values().filter(|record| filter(record)).count())
    }

    #[instrument(skip_all, fields(table = R::TABLE))]
    pub async fn delete_all(&self) -> Result<usize> {
        let mut inner = self.db.0.lock().await;
        let rows = R::rows_mut(&mut inner.tables);
        let n_deleted = rows.len();
        rows.clear();
        inner.rewrite::<R>().await?;
        info!(n_deleted, "deleted");
        Ok(n_deleted)
    }
}

impl<R: Timed> Table<'_, R> {
    /// Bounds and count of the records matching the filter.
    pub async fn extent(&self, filter: impl Fn(&R) -> bool + Send) -> Result<Option<Extent>> {
        let inner = self.db.0.lock().await;
        let mut extent: Option<Extent> = None;
        for record in R::rows(&inner.tables).values().filter(|record| filter(record)) {
            let (start, end) = (record.start(), record.end());
            extent = Some(match extent {
                None => Extent { min_start: start, max_start: start, max_end: end, count: 1 },
                Some(extent) => Extent {
                    min_start: extent.min_start.min(start),
                    max_start: extent.max_start.max(start),
                    max_end: match (extent.max_end, end) {
                        (Some(lhs), Some(rhs)) => Some(lhs.max(rhs)),
                        _ => None,
                    },
                    count: extent.count + 1,
                },
            });
        }
        Ok(extent)
    }
}

impl Inner {
    /// Replay the table's journal, compacting it when it has grown well past the table.
    async fn load<R: Record>(&mut self) -> Result {
        let Some(directory) = &self.directory else {
            return Ok(());
        };
        let path = journal_path::<R>(directory);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };
        let rows = R::rows_mut(&mut self.tables);
        let mut n_lines = 0;
        for line in contents.split(|byte| *byte == b'\n').filter(|line| !line.is_empty()) {
            let record: R = serde_json::from_slice(line).map_err(|error| {
                Error::Store(format!("failed to decode line {} of `{}`: {error}", n_lines + 1, path.display()))
            })?;
            rows.insert(record.key(), record);
            n_lines += 1;
        }
        let n_rows = rows.len();
        info!(table = R::TABLE, n_rows, n_lines, "loaded");
        if n_lines > 2 * n_rows {
            self.rewrite::<R>().await?;
        }
        Ok(())
    }

    /// Append the records to the table's journal.
    async fn append<R: Record>(&self, records: &[R]) -> Result {
        let Some(directory) = &self.directory else {
            return Ok(());
        };
        let path = journal_path::<R>(directory);
        let contents = encode(records.iter())?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(&contents).await?;
        file.flush().await?;
        trace!(path = %path.display(), n_records = records.len(), "appended");
        Ok(())
    }

    /// Atomically replace the table's journal with the current rows.
    async fn rewrite<R: Record>(&self) -> Result {
        let Some(directory) = &self.directory else {
            return Ok(());
        };
        let path = journal_path::<R>(directory);
        let rows = R::rows(&self.tables);
        let contents = encode(rows.values())?;
        let temporary_path = path.with_extension("jsonl.tmp");
        fs::write(&temporary_path, contents).await?;
        fs::rename(&temporary_path, &path).await?;
        debug!(path = %path.display(), n_rows = rows.len(), "compacted");
        Ok(())
    }
}

fn journal_path<R: Record>(directory: &Path) -> PathBuf {
    directory.join(format!("{}.jsonl", R::TABLE))
}

/// One JSON document per line.
fn encode<'a, R: Record>(records: impl Iterator<Item = &'a R>) -> Result<Vec<u8>> {
    let mut contents = Vec::new();
    for record in records {
        serde_json::to_writer(&mut contents, record)
            .map_err(|error| Error::Store(format!("failed to encode `{}`: {error}", R::TABLE)))?;
        contents.push(b'\n');
    }
    Ok(contents)
}
