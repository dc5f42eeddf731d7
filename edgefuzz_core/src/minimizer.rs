use crate::corpus::{self, CorpusError};
use crate::executor::Target;
use crate::fuzzer::{Fuzzer, FuzzerError};
use crate::input;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Attempt budget used when the caller sets none.
pub const DEFAULT_MINIMIZE_RUNS: u64 = 100_000;

#[derive(Error, Debug)]
pub enum MinimizeError {
    #[error("Crash input {0:?} does not exist")]
    MissingInput(PathBuf),
    #[error("Crash input {0:?} did not crash")]
    DidNotCrash(PathBuf),
    #[error(transparent)]
    Fuzzer(#[from] FuzzerError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimizeOutcome {
    /// Smallest crashing input found.
    pub input: Vec<u8>,
    pub original_len: usize,
    /// Last `minimized-<hash>.txt` written, if any reduction succeeded.
    pub path: Option<PathBuf>,
    pub crash_info: String,
    pub attempts: u64,
}

impl<T: Target> Fuzzer<T> {
    /// Shrinks a crashing input while it keeps crashing.
    ///
    /// Every mutation attempt counts against `max_attempts`, including candidates that are
    /// discarded without running because they are not shorter. Stops early once the input is
    /// empty.
    pub fn minimize_crash(
        &mut self,
        path: &Path,
        max_attempts: u64,
    ) -> Result<MinimizeOutcome, MinimizeError> {
        if !path.is_file() {
            return Err(MinimizeError::MissingInput(path.to_path_buf()));
        }
        let mut best = std::fs::read(path)
            .map_err(|e| CorpusError::Io(format!("Failed to read input {:?}: {}", path, e)))?;
        let original_len = best.len();

        let entry = self.run_input(&best)?;
        let Some(mut crash_info) = entry.crash_info else {
            return Err(MinimizeError::DidNotCrash(path.to_path_buf()));
        };

        let mut outcome_path = None;
        let mut attempts = 0;
        while attempts < max_attempts && !best.is_empty() {
            attempts += 1;
            let candidate = self.mutator.mutate(&mut self.rng, &best, best.len(), None);
            if candidate.len() >= best.len() {
                continue;
            }
            let entry = self.run_input(&candidate)?;
            let Some(info) = entry.crash_info else {
                continue;
            };

            let out = input::minimized_file_name(&self.output_dir, &input::content_hash(&candidate));
            corpus::write_input(&out, &candidate)?;
            info!("CRASH with length {} in {:?}!\n{}", candidate.len(), out, info);
            outcome_path = Some(out);
            crash_info = info;
            best = candidate;
        }

        Ok(MinimizeOutcome {
            input: best,
            original_len,
            path: outcome_path,
            crash_info,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FuzzerConfig;
    use crate::context::ExecutionContext;
    use crate::executor::TargetError;
    use std::fs;
    use tempfile::tempdir;

    type TargetFn = fn(&[u8], &mut ExecutionContext) -> Result<(), TargetError>;

    fn crashes_on_bang(data: &[u8], ctx: &mut ExecutionContext) -> Result<(), TargetError> {
        ctx.trace_block(1);
        if data.contains(&b'!') {
            return Err(TargetError::Error("found a bang".into()));
        }
        Ok(())
    }

    fn fuzzer(output: &Path) -> Fuzzer<TargetFn> {
        let mut config = FuzzerConfig::default();
        config.fuzzer.seed = Some(3);
        config.corpus.output_dir = output.to_path_buf();
        Fuzzer::new(crashes_on_bang as TargetFn, &config).unwrap()
    }

    #[test]
    fn shrinks_while_still_crashing() {
        let dir = tempdir().unwrap();
        let crash = dir.path().join("crash.txt");
        fs::write(&crash, b"aaaaaaaa!aaaaaaaa").unwrap();

        let outcome = fuzzer(dir.path()).minimize_crash(&crash, 5_000).unwrap();
        assert!(outcome.input.len() < outcome.original_len);
        assert!(outcome.input.contains(&b'!'));
        assert_eq!(outcome.crash_info, "found a bang");

        let written = outcome.path.expect("at least one reduction");
        assert!(written
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("minimized-"));
        assert_eq!(fs::read(written).unwrap(), outcome.input);
    }

    #[test]
    fn budget_bounds_single_byte_crash() {
        let dir = tempdir().unwrap();
        let crash = dir.path().join("crash.txt");
        fs::write(&crash, b"!").unwrap();

        let outcome = fuzzer(dir.path()).minimize_crash(&crash, 100).unwrap();
        assert_eq!(outcome.input, b"!");
        assert_eq!(outcome.attempts, 100);
        assert!(outcome.path.is_none());
    }

    #[test]
    fn non_crashing_input_is_rejected() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("fine.txt");
        fs::write(&input, b"fine").unwrap();

        let mut fuzzer = fuzzer(dir.path());
        assert!(matches!(
            fuzzer.minimize_crash(&input, 10),
            Err(MinimizeError::DidNotCrash(_))
        ));
        assert!(matches!(
            fuzzer.minimize_crash(&dir.path().join("missing"), 10),
            Err(MinimizeError::MissingInput(_))
        ));
    }
}
