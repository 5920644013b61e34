//! redb-backed trial store.
//!
//! Tables:
//! - `trials`: trial id → framed [`TrialSnapshot`]
//! - `meta`: `"standard"` → framed standard + history,
//!   `"next_trial_id"` → framed id counter
//!
//! Every save is its own write transaction; a promotion writes both tables
//! in one transaction.

use super::{StoredStandard, TrialStore, assemble};
use crate::error::Result;
use crate::formats::{ManagerSnapshot, decode_frame, encode_frame};
use crate::standard::{StandardLens, StandardRecord};
use crate::trial::TrialSnapshot;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

const TRIALS: TableDefinition<u64, &[u8]> = TableDefinition::new("trials");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const STANDARD_KEY: &str = "standard";
const NEXT_ID_KEY: &str = "next_trial_id";

/// Durable trial store on a redb database file.
pub struct RedbTrialStore {
    db: Database,
}

impl std::fmt::Debug for RedbTrialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbTrialStore").finish_non_exhaustive()
    }
}

impl RedbTrialStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())?;

        let txn = db.begin_write()?;
        {
            txn.open_table(TRIALS)?;
            txn.open_table(META)?;
        }
        txn.commit()?;

        tracing::debug!(path = %path.as_ref().display(), "opened trial store");
        Ok(Self { db })
    }

    fn encode_standard(standard: &StandardLens, history: &[StandardRecord]) -> Result<Vec<u8>> {
        encode_frame(&StoredStandard {
            standard: standard.clone(),
            history: history.to_vec(),
        })
    }
}

impl TrialStore for RedbTrialStore {
    fn save_trial(&self, trial: &TrialSnapshot) -> Result<()> {
        let bytes = encode_frame(trial)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TRIALS)?;
            table.insert(trial.id.0, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn save_created_trial(&self, trial: &TrialSnapshot, next_trial_id: u64) -> Result<()> {
        let trial_bytes = encode_frame(trial)?;
        let counter_bytes = encode_frame(&next_trial_id)?;
        let txn = self.db.begin_write()?;
        {
            let mut trials = txn.open_table(TRIALS)?;
            trials.insert(trial.id.0, trial_bytes.as_slice())?;
            let mut meta = txn.open_table(META)?;
            meta.insert(NEXT_ID_KEY, counter_bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn save_standard(&self, standard: &StandardLens, history: &[StandardRecord]) -> Result<()> {
        let bytes = Self::encode_standard(standard, history)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(META)?;
            table.insert(STANDARD_KEY, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn save_promotion(
        &self,
        trial: &TrialSnapshot,
        standard: &StandardLens,
        history: &[StandardRecord],
    ) -> Result<()> {
        let trial_bytes = encode_frame(trial)?;
        let standard_bytes = Self::encode_standard(standard, history)?;
        let txn = self.db.begin_write()?;
        {
            let mut trials = txn.open_table(TRIALS)?;
            trials.insert(trial.id.0, trial_bytes.as_slice())?;
            let mut meta = txn.open_table(META)?;
            meta.insert(STANDARD_KEY, standard_bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn load(&self) -> Result<Option<ManagerSnapshot>> {
        let txn = self.db.begin_read()?;
        let meta = txn.open_table(META)?;
        let Some(entry) = meta.get(STANDARD_KEY)? else {
            return Ok(None);
        };
        let standard: StoredStandard = decode_frame(entry.value())?;
        let next_id = match meta.get(NEXT_ID_KEY)? {
            Some(counter) => Some(decode_frame::<u64>(counter.value())?),
            None => None,
        };

        let table = txn.open_table(TRIALS)?;
        let mut trials = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            trials.push(decode_frame::<TrialSnapshot>(value.value())?);
        }
        Ok(Some(assemble(standard, trials, next_id)))
    }
}
