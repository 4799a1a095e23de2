pub mod codec;
pub mod error;
pub mod parser;
pub mod sample;
pub mod store;
pub mod trial;

pub use codec::{BinaryMatrixCodec, MatrixCodec};
pub use error::{TrialError, TrialResult};
pub use parser::{parse_trial_log, LogParser, ParserConfig};
pub use sample::{merge, Metric, MetricSummary, SampleMatrix, SampleRow, FAILED_ROW, METRIC_COUNT};
pub use store::ExperimentStore;
pub use trial::{
    ConflictPolicy, InsertOutcome, InsertTally, KeyValues, Record, TrialFilter, TrialKey, WILDCARD,
};
