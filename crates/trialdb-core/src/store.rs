use crate::error::TrialResult;
use crate::trial::{ConflictPolicy, InsertOutcome, InsertTally, KeyValues, Record, TrialFilter, TrialKey};

pub trait ExperimentStore {
    // Writes
    fn insert(&self, record: Record, policy: ConflictPolicy) -> TrialResult<InsertOutcome>;
    fn insert_many(&self, records: Vec<Record>, policy: ConflictPolicy) -> TrialResult<InsertTally>;

    // Reads
    fn get(&self, key: &TrialKey) -> TrialResult<Option<Record>>;
    fn query(&self, filter: &TrialFilter) -> TrialResult<Vec<Record>>;
    fn distinct_key_values(&self) -> TrialResult<KeyValues>;
    fn failed_records(&self) -> TrialResult<Vec<Record>>;

    // Stats
    fn count(&self) -> TrialResult<usize>;
}
