pub mod config;
pub mod context;
pub mod corpus;
pub mod coverage;
pub mod dictionary;
pub mod executor;
pub mod feature;
pub mod fuzzer;
pub mod input;
pub mod instrument;
pub mod minimizer;
pub mod mutator;
pub mod oracle;
pub mod rng;
pub mod scheduler;

pub use config::FuzzerConfig;
pub use context::ExecutionContext;
pub use corpus::{Corpus, CorpusEntry, CorpusError};
pub use coverage::{CoverageMap, FileCoverage};
pub use dictionary::{Dictionary, DictionaryError};
pub use executor::{ExecutionStatus, Executor, ExecutorError, InProcessExecutor, Target, TargetError};
pub use feature::{BlockId, EdgeId, Feature, FeatureSet};
pub use fuzzer::{FuzzStats, Fuzzer, FuzzerError, StopReason};
pub use instrument::{FileInfo, InstrumentError, Instrumented, Instrumentor};
pub use minimizer::{MinimizeError, MinimizeOutcome, DEFAULT_MINIMIZE_RUNS};
pub use mutator::{Mutation, Mutator};
pub use oracle::Verdict;
pub use rng::FuzzRng;
pub use scheduler::{LengthControl, RandomScheduler, Scheduler, Selection};
