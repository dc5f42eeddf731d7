use edgefuzz_core::config::FuzzerConfig;
use edgefuzz_core::context::ExecutionContext;
use edgefuzz_core::executor::TargetError;
use edgefuzz_core::fuzzer::{Fuzzer, StopReason};
use edgefuzz_core::input;
use std::fs;
use tempfile::tempdir;

/// Crashes on inputs starting with `z=#`. Every matched byte is a new block, so coverage
/// guides the search one byte at a time.
fn planted_bug(data: &[u8], ctx: &mut ExecutionContext) -> Result<(), TargetError> {
    ctx.trace_block(1);
    if data.first() == Some(&b'z') {
        ctx.trace_block(2);
        if data.get(1) == Some(&b'=') {
            ctx.trace_block(3);
            if data.get(2) == Some(&b'#') {
                ctx.trace_block(4);
                return Err(TargetError::Error("planted bug reached".into()));
            }
        }
    }
    Ok(())
}

#[test]
fn finds_planted_bug_and_persists_progress() {
    let (corpus, output) = (tempdir().unwrap(), tempdir().unwrap());
    fs::write(corpus.path().join("seed.txt"), b"hello").unwrap();

    let mut config = FuzzerConfig::default();
    config.fuzzer.seed = Some(0x5eed);
    config.fuzzer.max_runs = Some(500_000);
    config.fuzzer.max_crashes = 1;
    config.corpus.dir = Some(corpus.path().to_path_buf());
    config.corpus.output_dir = output.path().to_path_buf();

    let mut fuzzer = Fuzzer::new(planted_bug, &config).unwrap();
    let stats = fuzzer.fuzz().unwrap();

    assert_eq!(stats.stop_reason, StopReason::MaxCrashes);
    assert_eq!(stats.crashes, 1);
    assert_eq!(stats.unique_crashes, 1);
    assert!(stats.runs < 500_000);
    assert!(stats.new_entries >= 1);

    let crashes: Vec<_> = fs::read_dir(output.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(crashes.len(), 1);
    let crash = fs::read(&crashes[0]).unwrap();
    assert!(crash.starts_with(b"z=#"), "crash input {crash:?}");
    assert_eq!(
        crashes[0],
        input::crash_file_name(output.path(), &input::content_hash(&crash))
    );

    // Every entry found while fuzzing is stored under its content hash.
    for entry in fuzzer.corpus().entries() {
        if let Some(path) = entry.path().filter(|p| !p.ends_with("seed.txt")) {
            assert_eq!(fs::read(path).unwrap(), entry.input());
            assert_eq!(path, input::corpus_file_name(corpus.path(), entry.hash()));
        }
    }
}

#[test]
fn same_seed_gives_same_session() {
    let run = || {
        let (corpus, output) = (tempdir().unwrap(), tempdir().unwrap());
        let mut config = FuzzerConfig::default();
        config.fuzzer.seed = Some(42);
        config.fuzzer.max_runs = Some(2_000);
        config.corpus.dir = Some(corpus.path().to_path_buf());
        config.corpus.output_dir = output.path().to_path_buf();
        let mut fuzzer = Fuzzer::new(planted_bug, &config).unwrap();
        let stats = fuzzer.fuzz().unwrap();
        let mut hashes: Vec<String> = fuzzer
            .corpus()
            .entries()
            .map(|e| e.hash().to_string())
            .collect();
        hashes.sort();
        (stats, hashes)
    };
    assert_eq!(run(), run());
}
