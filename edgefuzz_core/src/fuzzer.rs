use crate::config::{FuzzerConfig, FuzzerSettings};
use crate::context::ExecutionContext;
use crate::corpus::{self, Corpus, CorpusEntry, CorpusError};
use crate::dictionary::{Dictionary, DictionaryError};
use crate::executor::{Executor, ExecutorError, InProcessExecutor, Target};
use crate::input;
use crate::mutator::Mutator;
use crate::oracle::{self, Verdict};
use crate::rng::FuzzRng;
use crate::scheduler::{LengthControl, RandomScheduler, Scheduler, Selection};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum FuzzerError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error("Input {0:?} does not exist")]
    MissingInput(PathBuf),
    /// A seed crashed while the corpus was loaded, so the baseline is broken.
    #[error("Corpus seed {path:?} crashed: {info}")]
    SeedCrash { path: PathBuf, info: String },
    #[error("Instrumentation broken, aborting: {0}")]
    InstrumentationBroken(String),
}

impl From<ExecutorError> for FuzzerError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::HarnessBroken(msg) => FuzzerError::InstrumentationBroken(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxRuns,
    MaxCrashes,
}

/// Summary of a finished fuzzing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzStats {
    pub runs: u64,
    /// Every crash, duplicates included.
    pub crashes: usize,
    pub unique_crashes: usize,
    pub new_entries: usize,
    pub reductions: usize,
    pub corpus_entries: usize,
    pub features: usize,
    pub max_len: usize,
    pub stop_reason: StopReason,
}

/// Single-threaded coverage-guided fuzzing loop around one target.
pub struct Fuzzer<T: Target> {
    pub(crate) executor: InProcessExecutor<T>,
    pub(crate) ctx: ExecutionContext,
    pub(crate) corpus: Corpus,
    pub(crate) mutator: Mutator,
    pub(crate) scheduler: RandomScheduler,
    pub(crate) rng: FuzzRng,
    pub(crate) settings: FuzzerSettings,
    pub(crate) corpus_dir: Option<PathBuf>,
    pub(crate) output_dir: PathBuf,
    pub(crate) runs: u64,
    crashes: usize,
    initial_features: usize,
    start: Instant,
}

impl<T: Target> Fuzzer<T> {
    /// Validates `config`, loads the configured dictionaries, and seeds the RNG.
    pub fn new(target: T, config: &FuzzerConfig) -> Result<Self, FuzzerError> {
        config
            .validate()
            .map_err(|e| FuzzerError::Config(e.to_string()))?;

        if let Some(dir) = &config.corpus.dir {
            if !dir.is_dir() {
                return Err(CorpusError::MissingDirectory(dir.clone()).into());
            }
        }

        let mut dictionary = Dictionary::new();
        for path in &config.dictionary.paths {
            let added = dictionary.load_file(path)?;
            debug!(?path, added, "loaded dictionary");
        }

        let rng = config
            .fuzzer
            .seed
            .map_or_else(FuzzRng::from_entropy, FuzzRng::from_seed);

        Ok(Self {
            executor: InProcessExecutor::new(target, config.fuzzer.timeout()),
            ctx: ExecutionContext::new(),
            corpus: Corpus::new(),
            mutator: Mutator::new(dictionary),
            scheduler: RandomScheduler::new(),
            rng,
            settings: config.fuzzer.clone(),
            corpus_dir: config.corpus.dir.clone(),
            output_dir: config.corpus.output_dir.clone(),
            runs: 0,
            crashes: 0,
            initial_features: 0,
            start: Instant::now(),
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Executes one input against a freshly reset context.
    pub fn run_input(&mut self, input: &[u8]) -> Result<CorpusEntry, FuzzerError> {
        self.runs += 1;
        let status = self.executor.execute(input, &mut self.ctx)?;
        Ok(CorpusEntry::new(
            input.to_vec(),
            self.ctx.features(),
            status.crash_info(),
        ))
    }

    /// Replays every file of the corpus directory and admits those that add features.
    ///
    /// Seeds are admitted shortest first so that short inputs own shared features. A crashing
    /// seed aborts loading.
    pub fn load_corpus(&mut self) -> Result<usize, FuzzerError> {
        let dir = self.require_corpus_dir()?;
        let mut entries = Vec::new();
        for (path, data) in corpus::read_seed_files(&dir)? {
            let entry = self.run_input(&data)?.with_path(path.clone());
            if let Some(info) = entry.crash_info {
                return Err(FuzzerError::SeedCrash { path, info });
            }
            entries.push(entry);
        }

        entries.sort_by_key(CorpusEntry::len);
        let seeds = entries.len();
        for mut entry in entries {
            self.corpus.compute_unique_features(&mut entry);
            if !entry.unique_features.is_empty() {
                self.corpus.add_entry(entry);
            }
        }
        self.initial_features = self.corpus.feature_count();
        debug!(
            seeds,
            admitted = self.corpus.len(),
            features = self.initial_features,
            "loaded corpus"
        );
        Ok(self.corpus.len())
    }

    /// Runs the main loop until the run budget or the crash ceiling is exhausted.
    pub fn fuzz(&mut self) -> Result<FuzzStats, FuzzerError> {
        let corpus_dir = self.require_corpus_dir()?;
        self.load_corpus()?;

        let mut len_control = LengthControl::new(
            self.settings.max_len,
            self.settings.len_control_factor,
            self.corpus.max_len(),
        );
        let max_runs = self.settings.max_runs.unwrap_or(u64::MAX);
        let mut stats = FuzzStats {
            runs: 0,
            crashes: 0,
            unique_crashes: 0,
            new_entries: 0,
            reductions: 0,
            corpus_entries: 0,
            features: 0,
            max_len: len_control.current(),
            stop_reason: StopReason::MaxRuns,
        };

        // Corpus replays do not count.
        self.runs = 0;
        self.crashes = 0;
        self.start = Instant::now();

        'fuzz: while self.runs < max_runs {
            let selection = self.scheduler.select(&self.corpus, &mut self.rng);
            let mut input = selection.parent_input().to_vec();
            for _ in 0..self.settings.mutation_depth {
                input = self.mutator.mutate(
                    &mut self.rng,
                    &input,
                    len_control.current(),
                    selection.crossover.as_deref(),
                );
                let mut entry = self.run_input(&input)?;
                let verdict = oracle::classify(&self.corpus, &mut entry, selection.parent.as_ref());
                match verdict {
                    Verdict::Crash => {
                        if self.handle_crash(entry)? {
                            stats.unique_crashes += 1;
                        }
                        self.crashes += 1;
                        if self.crashes >= self.settings.max_crashes {
                            warn!(
                                "Maximum of {} crashes reached, aborting",
                                self.settings.max_crashes
                            );
                            stats.stop_reason = StopReason::MaxCrashes;
                            break 'fuzz;
                        }
                    }
                    Verdict::New => {
                        self.handle_new(entry, &corpus_dir)?;
                        len_control.record_progress(self.runs);
                        stats.new_entries += 1;
                    }
                    Verdict::Reduce => {
                        self.handle_reduce(entry, &selection, &corpus_dir)?;
                        len_control.record_progress(self.runs);
                        stats.reductions += 1;
                    }
                    Verdict::Discard => {}
                }
                if verdict.ends_iteration() {
                    break;
                }
            }
            len_control.maybe_grow(self.runs);
        }

        stats.runs = self.runs;
        stats.crashes = self.crashes;
        stats.corpus_entries = self.corpus.len();
        stats.features = self.corpus.feature_count();
        stats.max_len = len_control.current();
        info!(
            runs = stats.runs,
            crashes = stats.crashes,
            corpus = stats.corpus_entries,
            features = stats.features,
            "fuzzing finished"
        );
        Ok(stats)
    }

    /// Runs a single file through the target.
    pub fn run_single(&mut self, path: &Path) -> Result<CorpusEntry, FuzzerError> {
        if !path.is_file() {
            return Err(FuzzerError::MissingInput(path.to_path_buf()));
        }
        let data = std::fs::read(path)
            .map_err(|e| CorpusError::Io(format!("Failed to read input {:?}: {}", path, e)))?;
        let entry = self.run_input(&data)?.with_path(path.to_path_buf());
        if let Some(info) = &entry.crash_info {
            info!("CRASH in {:?}!\n{}", path, info);
        } else {
            info!(features = entry.features.len(), "run completed without crash");
        }
        Ok(entry)
    }

    /// Persists a crash that hits a feature no earlier crash did. Returns whether it was new.
    fn handle_crash(&mut self, entry: CorpusEntry) -> Result<bool, FuzzerError> {
        let path = input::crash_file_name(&self.output_dir, entry.hash());
        let data = entry.input().to_vec();
        let info = entry.crash_info.clone().unwrap_or_default();
        if !self.corpus.add_crash_entry(entry) {
            warn!("DUPLICATE CRASH");
            return Ok(false);
        }
        corpus::write_input(&path, &data)?;
        info!("CRASH in {:?}!\n{}", path, info);
        Ok(true)
    }

    fn handle_new(&mut self, mut entry: CorpusEntry, corpus_dir: &Path) -> Result<(), FuzzerError> {
        entry.store_at(corpus_dir)?;
        let len = entry.len();
        self.corpus.add_entry(entry);
        self.report("NEW", len);
        Ok(())
    }

    /// Replaces the parent with a shorter input covering everything the parent owns.
    fn handle_reduce(
        &mut self,
        mut entry: CorpusEntry,
        selection: &Selection,
        corpus_dir: &Path,
    ) -> Result<(), FuzzerError> {
        let Some(parent) = selection.parent.as_ref() else {
            return Ok(());
        };
        // Keep ownership of the parent's features even if they are no longer unique.
        entry.unique_features = parent.unique_features.clone();
        let hash = entry.hash().to_string();
        let len = entry.len();
        if self.corpus.replace_entry(parent, entry) {
            if let Some(stored) = self.corpus.get_mut(&hash) {
                stored.store_at(corpus_dir)?;
            }
        }
        parent.clone().remove_stored()?;
        self.report("REDUCE", len);
        Ok(())
    }

    fn report(&self, action: &str, entry_len: usize) {
        let secs = self.start.elapsed().as_secs_f64().max(1e-3);
        let features = self.corpus.feature_count();
        let new_features = features.saturating_sub(self.initial_features);
        let max_len = self.corpus.max_len();
        let width = max_len.to_string().len();
        info!(
            "{:<6} run: {} ({:4.0}/s), ft: {} ({:.0}/s), corp: {} ({}), len: {:>width$}/{}, t: {:.0}s",
            action,
            self.runs,
            self.runs as f64 / secs,
            features,
            new_features as f64 / secs,
            self.corpus.len(),
            format_bytes(self.corpus.total_len()),
            entry_len,
            max_len,
            secs,
            width = width,
        );
    }

    fn require_corpus_dir(&self) -> Result<PathBuf, FuzzerError> {
        self.corpus_dir
            .clone()
            .ok_or_else(|| FuzzerError::Config("no corpus directory configured".to_string()))
    }
}

/// Human-readable size: bytes below 10 KiB, KiB below 10 MiB, MiB above.
pub fn format_bytes(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;
    if bytes < 10 * KIB {
        format!("{bytes}b")
    } else if bytes < 10 * MIB {
        format!("{}kb", (bytes as f64 / KIB as f64).round() as usize)
    } else {
        format!("{}mb", (bytes as f64 / MIB as f64).round() as usize)
    }
}
