mod demo;

use anyhow::Context;
use clap::{Parser, Subcommand};
use edgefuzz_core::config::FuzzerConfig;
use edgefuzz_core::coverage::CoverageMap;
use edgefuzz_core::executor;
use edgefuzz_core::fuzzer::Fuzzer;
use edgefuzz_core::instrument::syntax::parse_tree;
use edgefuzz_core::instrument::Instrumentor;
use edgefuzz_core::minimizer::DEFAULT_MINIMIZE_RUNS;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults to ./config.toml when present.
    #[clap(short, long, value_parser, global = true)]
    config: Option<PathBuf>,
    /// Dictionary file, may be repeated.
    #[clap(long = "dict", global = true)]
    dicts: Vec<PathBuf>,
    #[clap(long, global = true)]
    max_runs: Option<u64>,
    #[clap(long, global = true)]
    max_len: Option<usize>,
    #[clap(long, global = true)]
    timeout_ms: Option<u64>,
    #[clap(long, global = true)]
    len_control_factor: Option<u64>,
    #[clap(long, global = true)]
    seed: Option<u64>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fuzz the built-in target, growing the corpus in CORPUS.
    Fuzz { corpus: Option<PathBuf> },
    /// Run one input through the built-in target.
    RunSingle { input: PathBuf },
    /// Shrink a crashing input while it keeps crashing.
    MinimizeCrash { input: PathBuf },
    /// Insert coverage probes into a source file.
    Instrument {
        /// Source file to instrument.
        #[clap(long)]
        source: PathBuf,
        /// Control-flow tree of the source as JSON.
        #[clap(long)]
        tree: PathBuf,
        /// Output file. Defaults to stdout.
        #[clap(long)]
        out: Option<PathBuf>,
        /// Coverage map JSON to add this file's block offsets to.
        #[clap(long)]
        block_map: Option<PathBuf>,
    },
    /// Replay CORPUS and print covered/total blocks per instrumented file.
    ReportCoverage {
        /// Coverage map JSON written by `instrument --block-map`.
        #[clap(long)]
        block_map: PathBuf,
        corpus: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("EDGEFUZZ_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Target panics are caught and reported as crashes. Anything else is a fuzzer bug.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if executor::in_target() {
            debug!("target panicked: {info}");
        } else {
            error!("fuzzer panicked: {info}");
            default_hook(info);
        }
    }));

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    config.dictionary.paths.extend(cli.dicts);
    if let Some(max_runs) = cli.max_runs {
        config.fuzzer.max_runs = Some(max_runs);
    }
    if let Some(max_len) = cli.max_len {
        config.fuzzer.max_len = max_len;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.fuzzer.timeout_ms = timeout_ms;
    }
    if let Some(factor) = cli.len_control_factor {
        config.fuzzer.len_control_factor = factor;
    }
    if let Some(seed) = cli.seed {
        config.fuzzer.seed = Some(seed);
    }
    config.validate()?;
    debug!(?config, "effective configuration");

    match cli.command {
        Command::Fuzz { corpus } => fuzz(config, corpus),
        Command::RunSingle { input } => {
            let mut fuzzer = Fuzzer::new(demo::header_parser, &config)?;
            fuzzer.run_single(&input)?;
            Ok(())
        }
        Command::MinimizeCrash { input } => {
            let budget = config.fuzzer.max_runs.unwrap_or(DEFAULT_MINIMIZE_RUNS);
            let mut fuzzer = Fuzzer::new(demo::header_parser, &config)?;
            let outcome = fuzzer.minimize_crash(&input, budget)?;
            info!(
                "Minimized {} -> {} bytes in {} attempts",
                outcome.original_len,
                outcome.input.len(),
                outcome.attempts
            );
            Ok(())
        }
        Command::Instrument {
            source,
            tree,
            out,
            block_map,
        } => instrument(&source, &tree, out.as_deref(), block_map.as_deref()),
        Command::ReportCoverage { block_map, corpus } => {
            config.corpus.dir = Some(corpus);
            for line in report_coverage(&config, &block_map)? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FuzzerConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {path:?}");
            FuzzerConfig::load_from_file(path)
        }
        None => {
            let default_path = Path::new("config.toml");
            if default_path.exists() {
                info!("Loading default configuration from {default_path:?}");
                FuzzerConfig::load_from_file(default_path)
            } else {
                debug!("No config.toml found, using built-in defaults");
                Ok(FuzzerConfig::default())
            }
        }
    }
}

fn fuzz(mut config: FuzzerConfig, corpus: Option<PathBuf>) -> anyhow::Result<()> {
    let corpus_dir = match corpus.or_else(|| config.corpus.dir.clone()) {
        Some(dir) => dir,
        None => {
            let dir = tempfile::Builder::new()
                .prefix("corpus-")
                .keep(true)
                .tempdir()
                .context("Failed to create temporary corpus directory")?;
            info!("Using {:?} as corpus directory", dir.path());
            dir.path().to_path_buf()
        }
    };
    config.corpus.dir = Some(corpus_dir);

    let mut fuzzer = Fuzzer::new(demo::header_parser, &config)?;
    info!("Using seed {}", fuzzer.seed());
    let stats = fuzzer.fuzz()?;
    info!(
        "Finished after {} runs: {} crashes ({} unique), {} corpus entries, {} features",
        stats.runs, stats.crashes, stats.unique_crashes, stats.corpus_entries, stats.features
    );
    Ok(())
}

fn instrument(
    source: &Path,
    tree: &Path,
    out: Option<&Path>,
    block_map: Option<&Path>,
) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read source {source:?}"))?;
    let tree_json =
        std::fs::read_to_string(tree).with_context(|| format!("Failed to read tree {tree:?}"))?;
    let tree = parse_tree(&tree_json)?;

    let mut instrumentor = Instrumentor::new();
    let mut map = match block_map {
        Some(path) if path.exists() => {
            let map = read_block_map(path)?;
            // Keep ids unique across every file recorded in the map.
            let last = map
                .files()
                .filter_map(|(_, info)| info.block_index_to_pos.keys().next_back().copied())
                .max()
                .unwrap_or(0);
            instrumentor.continue_after(last);
            map
        }
        _ => CoverageMap::new(),
    };

    let instrumented = instrumentor
        .instrument(&code, &tree)
        .with_context(|| format!("Failed to instrument {source:?}"))?;
    match out {
        Some(path) => std::fs::write(path, &instrumented.code)
            .with_context(|| format!("Failed to write {path:?}"))?,
        None => print!("{}", instrumented.code),
    }
    info!(
        "Instrumented {:?} with {} probes",
        source,
        instrumented.probes.len()
    );

    if let Some(path) = block_map {
        map.insert(source, instrumented.file_info);
        let json = serde_json::to_string_pretty(&map)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {path:?}"))?;
    }
    Ok(())
}

fn read_block_map(path: &Path) -> anyhow::Result<CoverageMap> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read block map {path:?}"))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid block map {path:?}"))
}

/// Replays the configured corpus and renders one `path covered/total` line per file.
fn report_coverage(config: &FuzzerConfig, block_map: &Path) -> anyhow::Result<Vec<String>> {
    let map = read_block_map(block_map)?;
    let mut fuzzer = Fuzzer::new(demo::header_parser, config)?;
    let admitted = fuzzer.load_corpus()?;
    info!("Replayed corpus, {admitted} entries admitted");

    let seen = fuzzer.corpus().seen_blocks();
    Ok(map
        .report(&seen)
        .iter()
        .map(|file| format!("{} {}/{}", file.short_path, file.covered, file.total))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn report_counts_blocks_reached_by_the_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus");
        fs::create_dir(&corpus).unwrap();
        // Enters the function, one line, a `key=value` split and the fallback arm.
        fs::write(corpus.join("seed"), b"a=b").unwrap();

        let block_map = dir.path().join("blocks.json");
        fs::write(
            &block_map,
            r#"{
                "src/demo.rs": {"block_index_to_pos": {"1": 10, "2": 20, "13": 30, "14": 40}},
                "src/other.rs": {"block_index_to_pos": {"100": 5}}
            }"#,
        )
        .unwrap();

        let mut config = FuzzerConfig::default();
        config.corpus.dir = Some(corpus);
        let lines = report_coverage(&config, &block_map).unwrap();
        assert_eq!(lines, vec!["demo.rs 3/4", "other.rs 0/1"]);
    }

    #[test]
    fn report_needs_a_readable_block_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FuzzerConfig::default();
        config.corpus.dir = Some(dir.path().to_path_buf());
        assert!(report_coverage(&config, &dir.path().join("missing.json")).is_err());
    }
}
