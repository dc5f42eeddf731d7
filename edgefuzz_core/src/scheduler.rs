use crate::corpus::{Corpus, CorpusEntry};
use rand_core::RngCore;
use tracing::debug;

/// Inputs picked for one fuzzing iteration.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Entry to mutate. `None` on an empty corpus, in which case mutation starts from `b""`.
    pub parent: Option<CorpusEntry>,
    /// Second buffer for crossover, drawn independently of `parent`.
    pub crossover: Option<Vec<u8>>,
}

impl Selection {
    /// Bytes to mutate: the parent's input, or empty without a parent.
    pub fn parent_input(&self) -> &[u8] {
        self.parent.as_ref().map(CorpusEntry::input).unwrap_or_default()
    }
}

/// A `Scheduler` is responsible for selecting the inputs of the next iteration from the `Corpus`.
pub trait Scheduler {
    /// Chooses the parent and crossover partner for the next run.
    fn select(&mut self, corpus: &Corpus, rng: &mut dyn RngCore) -> Selection;
}

/// Uniform, feedback-free selection.
#[derive(Default, Debug)]
pub struct RandomScheduler;

impl RandomScheduler {
    /// Stateless, so every instance behaves the same.
    pub fn new() -> Self {
        RandomScheduler
    }
}

impl Scheduler for RandomScheduler {
    fn select(&mut self, corpus: &Corpus, rng: &mut dyn RngCore) -> Selection {
        let parent = corpus.get_random_entry(rng).cloned();
        let crossover = corpus.get_random_entry(rng).map(|e| e.input().to_vec());
        Selection { parent, crossover }
    }
}

/// Slowly raises the per-run input length cap while coverage stagnates.
///
/// The cap starts at `max(4, corpus max length)` and never exceeds the configured ceiling. After
/// more than `factor * log2(cap)` runs without a NEW or REDUCE, it grows by `log2(cap)`.
#[derive(Debug, Clone)]
pub struct LengthControl {
    ceiling: usize,
    factor: u64,
    current: usize,
    last_progress_run: u64,
}

impl LengthControl {
    pub const MIN_START_LEN: usize = 4;

    /// `ceiling` is the configured maximum input length. `factor` scales the stagnation window.
    pub fn new(ceiling: usize, factor: u64, corpus_max_len: usize) -> Self {
        Self {
            ceiling,
            factor,
            current: corpus_max_len.max(Self::MIN_START_LEN).min(ceiling),
            last_progress_run: 0,
        }
    }

    /// Length cap for the next mutation.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Upper bound the cap never passes.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Marks `run` as the last run that grew or shrank the corpus.
    pub fn record_progress(&mut self, run: u64) {
        self.last_progress_run = run;
    }

    /// Grows the cap if the corpus has stagnated long enough. Returns the new cap if it changed.
    pub fn maybe_grow(&mut self, run: u64) -> Option<usize> {
        if self.current >= self.ceiling || self.current == 0 {
            return None;
        }
        let step = self.current.ilog2() as usize;
        let stagnant_for = run.saturating_sub(self.last_progress_run);
        if stagnant_for <= self.factor.saturating_mul(step as u64) {
            return None;
        }
        self.current = (self.current + step).min(self.ceiling);
        self.last_progress_run = run;
        debug!(max_len = self.current, run, "raised length cap");
        Some(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureSet, edge_id, feature};
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    #[test]
    fn empty_corpus_selects_nothing() {
        let mut scheduler = RandomScheduler::new();
        let corpus = Corpus::new();
        let mut rng = ChaCha8Rng::from_seed([0; 32]);
        let selection = scheduler.select(&corpus, &mut rng);
        assert!(selection.parent.is_none());
        assert!(selection.crossover.is_none());
        assert_eq!(selection.parent_input(), b"");
    }

    #[test]
    fn parent_and_crossover_are_drawn_independently() {
        let mut corpus = Corpus::new();
        for (i, input) in [&b"one"[..], &b"two"[..], &b"three"[..]].iter().enumerate() {
            let features: FeatureSet = [feature(edge_id(0, i as u32 + 1), 1)].into();
            let mut entry = CorpusEntry::new(input.to_vec(), features, None);
            corpus.compute_unique_features(&mut entry);
            corpus.add_entry(entry);
        }

        let mut scheduler = RandomScheduler::new();
        let mut rng = ChaCha8Rng::from_seed([7; 32]);
        let mut differed = false;
        for _ in 0..50 {
            let selection = scheduler.select(&corpus, &mut rng);
            let parent = selection.parent.expect("non-empty corpus");
            let crossover = selection.crossover.expect("non-empty corpus");
            differed |= parent.input() != crossover.as_slice();
        }
        assert!(differed);
    }

    #[test]
    fn start_length_is_clamped() {
        assert_eq!(LengthControl::new(4096, 200, 0).current(), 4);
        assert_eq!(LengthControl::new(4096, 200, 100).current(), 100);
        assert_eq!(LengthControl::new(3, 200, 100).current(), 3);
    }

    #[test]
    fn grows_by_log2_after_stagnation() {
        let mut control = LengthControl::new(4096, 1, 0);
        assert_eq!(control.current(), 4);
        // log2(4) == 2: two stagnant runs are tolerated, the third one grows the cap.
        assert_eq!(control.maybe_grow(1), None);
        assert_eq!(control.maybe_grow(2), None);
        assert_eq!(control.maybe_grow(3), Some(6));

        control.record_progress(10);
        assert_eq!(control.maybe_grow(12), None);
        assert_eq!(control.maybe_grow(13), Some(8));
        // log2(8) == 3
        assert_eq!(control.maybe_grow(16), None);
        assert_eq!(control.maybe_grow(17), Some(11));
    }

    #[test]
    fn growth_is_capped_at_ceiling() {
        let mut control = LengthControl::new(5, 1, 0);
        assert_eq!(control.maybe_grow(3), Some(5));
        assert_eq!(control.maybe_grow(1000), None);
        assert_eq!(control.current(), control.ceiling());
    }
}
