use crate::feature::{self, BlockId, EdgeId, FeatureSet};
use crate::input;
use indexmap::IndexMap;
use rand_core::RngCore;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Defines errors that can arise during corpus operations.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// An I/O error occurred while reading seeds or persisting entries.
    /// Contains a string describing the underlying I/O error and the path involved.
    #[error("Corpus I/O error: {0}")]
    Io(String),

    /// The configured corpus directory does not exist or is not a directory.
    #[error("Corpus directory {0:?} does not exist")]
    MissingDirectory(PathBuf),
}

impl From<std::io::Error> for CorpusError {
    fn from(err: std::io::Error) -> Self {
        CorpusError::Io(err.to_string())
    }
}

/// One retained input together with the coverage it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    input: Vec<u8>,
    hash: String,
    /// Every feature observed while executing `input`.
    pub features: FeatureSet,
    /// Features this entry owns. Filled by [`Corpus::compute_unique_features`] or transplanted
    /// from a parent on reduction.
    pub unique_features: FeatureSet,
    /// Set iff executing `input` crashed.
    pub crash_info: Option<String>,
    path: Option<PathBuf>,
}

impl CorpusEntry {
    /// Hashes `input`. `unique_features` starts empty.
    pub fn new(input: Vec<u8>, features: FeatureSet, crash_info: Option<String>) -> Self {
        let hash = input::content_hash(&input);
        Self {
            input,
            hash,
            features,
            unique_features: FeatureSet::new(),
            crash_info,
            path: None,
        }
    }

    /// Records that the input already lives at `path`, e.g. a seed file.
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// The retained bytes.
    pub fn input(&self) -> &[u8] {
        &self.input
    }

    /// Consumes the entry, returning its input.
    pub fn into_input(self) -> Vec<u8> {
        self.input
    }

    /// Hex MD5 of the input. Doubles as the corpus key and file name.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Input length in bytes.
    pub fn len(&self) -> usize {
        self.input.len()
    }

    /// True for the empty input.
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// True if executing the input crashed.
    pub fn is_crash(&self) -> bool {
        self.crash_info.is_some()
    }

    /// Where the entry was persisted, if it was.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True if this execution covers every feature `other` owns.
    pub fn has_all_unique_features_of(&self, other: &CorpusEntry) -> bool {
        other.unique_features.is_subset(&self.features)
    }

    /// Writes the input to `<dir>/<hash>.txt` and remembers the location.
    pub fn store_at(&mut self, dir: &Path) -> Result<&Path, CorpusError> {
        let path = input::corpus_file_name(dir, &self.hash);
        write_input(&path, &self.input)?;
        Ok(self.path.insert(path).as_path())
    }

    /// Deletes the persisted copy. A file that is already gone is not an error.
    pub fn remove_stored(&mut self) -> Result<(), CorpusError> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CorpusError::Io(format!(
                "Failed to remove corpus file {:?}: {}",
                path, e
            ))),
        }
    }
}

/// Writes `data` to `path`, replacing any existing file.
pub fn write_input(path: &Path, data: &[u8]) -> Result<(), CorpusError> {
    fs::write(path, data)
        .map_err(|e| CorpusError::Io(format!("Failed to write input {:?}: {}", path, e)))
}

/// Retained inputs plus the two novelty oracles.
///
/// `seen_features` only ever grows: it is the union of every feature set granted to an admitted
/// entry, including entries that were later replaced. Crashes are judged against their own
/// `seen_crash_features` so coverage and crash deduplication never suppress each other.
#[derive(Debug, Default)]
pub struct Corpus {
    entries: IndexMap<String, CorpusEntry>,
    seen_features: FeatureSet,
    seen_crash_features: FeatureSet,
    crashes: Vec<CorpusEntry>,
    total_len: usize,
    max_len: usize,
}

impl Corpus {
    /// An empty corpus with empty oracles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills `entry.unique_features` with the features nobody has seen yet.
    pub fn compute_unique_features(&self, entry: &mut CorpusEntry) {
        entry.unique_features = entry
            .features
            .difference(&self.seen_features)
            .copied()
            .collect();
    }

    /// Admits `entry`. An entry with an existing hash overwrites the old one.
    pub fn add_entry(&mut self, entry: CorpusEntry) {
        self.seen_features
            .extend(entry.unique_features.iter().copied());
        self.total_len += entry.len();
        self.max_len = self.max_len.max(entry.len());
        if let Some(previous) = self.entries.insert(entry.hash.clone(), entry) {
            self.forget_len(previous.len());
        }
    }

    /// Removes `old` and inserts `new` unless its hash is already present.
    ///
    /// Returns whether `new` was inserted. `old` is removed either way, so the caller can drop
    /// its persisted copy unconditionally and persist `new` only on `true`.
    pub fn replace_entry(&mut self, old: &CorpusEntry, new: CorpusEntry) -> bool {
        if let Some(removed) = self.entries.shift_remove(&old.hash) {
            self.forget_len(removed.len());
        }
        if self.entries.contains_key(&new.hash) {
            debug!(hash = %new.hash, "replacement already in corpus");
            return false;
        }
        self.add_entry(new);
        true
    }

    /// Retains a crashing entry iff it exercises a feature no earlier crash did.
    pub fn add_crash_entry(&mut self, entry: CorpusEntry) -> bool {
        let novel: Vec<_> = entry
            .features
            .difference(&self.seen_crash_features)
            .copied()
            .collect();
        if novel.is_empty() {
            return false;
        }
        self.seen_crash_features.extend(novel);
        self.crashes.push(entry);
        true
    }

    /// Picks an entry uniformly, or `None` on an empty corpus.
    pub fn get_random_entry(&self, rng: &mut dyn RngCore) -> Option<&CorpusEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let index = rng.next_u64() as usize % self.entries.len();
        self.entries.get_index(index).map(|(_, entry)| entry)
    }

    /// Looks an entry up by content hash.
    pub fn get(&self, hash: &str) -> Option<&CorpusEntry> {
        self.entries.get(hash)
    }

    pub(crate) fn get_mut(&mut self, hash: &str) -> Option<&mut CorpusEntry> {
        self.entries.get_mut(hash)
    }

    /// Whether an entry with this content hash is retained.
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    /// Retained entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &CorpusEntry> {
        self.entries.values()
    }

    /// Crashes retained by [`Corpus::add_crash_entry`], oldest first.
    pub fn crashes(&self) -> &[CorpusEntry] {
        &self.crashes
    }

    /// Number of retained entries. Crashes are not counted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entry is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the coverage oracle, i.e. features ever granted.
    pub fn feature_count(&self) -> usize {
        self.seen_features.len()
    }

    /// Coverage oracle. Never shrinks.
    pub fn seen_features(&self) -> &FeatureSet {
        &self.seen_features
    }

    /// Crash oracle, kept apart from [`Corpus::seen_features`].
    pub fn seen_crash_features(&self) -> &FeatureSet {
        &self.seen_crash_features
    }

    /// Sum of the input lengths of retained entries.
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Longest retained input, 0 when empty.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Raw edges ever hit, with the count bucket masked off.
    pub fn seen_edges(&self) -> BTreeSet<EdgeId> {
        self.seen_features
            .iter()
            .map(|f| feature::feature_edge(*f))
            .collect()
    }

    /// Blocks ever entered.
    pub fn seen_blocks(&self) -> BTreeSet<BlockId> {
        self.seen_features
            .iter()
            .map(|f| feature::edge_target(feature::feature_edge(*f)))
            .collect()
    }

    fn forget_len(&mut self, len: usize) {
        self.total_len -= len;
        if len == self.max_len {
            self.max_len = self.entries.values().map(CorpusEntry::len).max().unwrap_or(0);
        }
    }
}

/// Reads every file below `dir`, recursively, in path order.
pub fn read_seed_files(dir: &Path) -> Result<Vec<(PathBuf, Vec<u8>)>, CorpusError> {
    if !dir.is_dir() {
        return Err(CorpusError::MissingDirectory(dir.to_path_buf()));
    }
    let mut paths = Vec::new();
    collect_files(dir, &mut paths)?;
    paths.sort();

    let mut seeds = Vec::with_capacity(paths.len());
    for path in paths {
        let data = fs::read(&path)
            .map_err(|e| CorpusError::Io(format!("Failed to read seed file {:?}: {}", path, e)))?;
        seeds.push((path, data));
    }
    Ok(seeds)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CorpusError> {
    let read_dir = fs::read_dir(dir)
        .map_err(|e| CorpusError::Io(format!("Failed to read seed directory {:?}: {}", dir, e)))?;
    for entry_result in read_dir {
        let entry = entry_result
            .map_err(|e| CorpusError::Io(format!("Error reading entry in {:?}: {}", dir, e)))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
