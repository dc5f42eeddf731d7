use crate::corpus::{Corpus, CorpusEntry};

/// What the fuzzer should do with an executed candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The run crashed. Deduplication happens in [`Corpus::add_crash_entry`].
    Crash,
    /// The candidate owns at least one feature nobody has seen.
    New,
    /// The candidate is strictly shorter than its parent and covers all of the parent's unique
    /// features, so it can take the parent's place.
    Reduce,
    Discard,
}

impl Verdict {
    /// Whether the mutation chain of the current iteration should stop.
    pub fn ends_iteration(self) -> bool {
        !matches!(self, Verdict::Discard)
    }
}

/// Classifies `candidate` against the corpus, filling its `unique_features` on the way.
pub fn classify(
    corpus: &Corpus,
    candidate: &mut CorpusEntry,
    parent: Option<&CorpusEntry>,
) -> Verdict {
    if candidate.is_crash() {
        return Verdict::Crash;
    }
    corpus.compute_unique_features(candidate);
    if !candidate.unique_features.is_empty() {
        return Verdict::New;
    }
    match parent {
        Some(parent)
            if candidate.len() < parent.len() && candidate.has_all_unique_features_of(parent) =>
        {
            Verdict::Reduce
        }
        _ => Verdict::Discard,
    }
}
