use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzerSettings {
    /// Stop after this many target executions. Unbounded when absent.
    #[serde(default)]
    pub max_runs: Option<u64>,
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    #[serde(default = "default_len_control_factor")]
    pub len_control_factor: u64,
    #[serde(default = "default_mutation_depth")]
    pub mutation_depth: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_crashes")]
    pub max_crashes: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

pub fn default_max_len() -> usize {
    4096
}
pub fn default_len_control_factor() -> u64 {
    200
}
pub fn default_mutation_depth() -> usize {
    5
}
pub fn default_timeout_ms() -> u64 {
    3000
}
pub fn default_max_crashes() -> usize {
    100
}

impl FuzzerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for FuzzerSettings {
    fn default() -> Self {
        Self {
            max_runs: None,
            max_len: default_max_len(),
            len_control_factor: default_len_control_factor(),
            mutation_depth: default_mutation_depth(),
            timeout_ms: default_timeout_ms(),
            max_crashes: default_max_crashes(),
            seed: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CorpusConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Where crash and minimized inputs are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: None,
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct DictionaryConfig {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzerConfig {
    #[serde(default)]
    pub fuzzer: FuzzerSettings,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub dictionary: DictionaryConfig,
}

impl FuzzerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: FuzzerConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the fuzzing loop cannot run with.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.fuzzer.max_len == 0 {
            anyhow::bail!("fuzzer.max-len must be at least 1");
        }
        if self.fuzzer.mutation_depth == 0 {
            anyhow::bail!("fuzzer.mutation-depth must be at least 1");
        }
        if self.fuzzer.timeout_ms == 0 {
            anyhow::bail!("fuzzer.timeout-ms must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_uses_defaults() {
        let config: FuzzerConfig = toml::from_str("").unwrap();
        assert_eq!(config.fuzzer.max_len, 4096);
        assert_eq!(config.fuzzer.len_control_factor, 200);
        assert_eq!(config.fuzzer.mutation_depth, 5);
        assert_eq!(config.fuzzer.timeout(), Duration::from_secs(3));
        assert_eq!(config.fuzzer.max_crashes, 100);
        assert!(config.fuzzer.max_runs.is_none());
        assert_eq!(config.corpus.output_dir, PathBuf::from("."));
        assert!(config.dictionary.paths.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn load_from_file_reads_all_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edgefuzz.toml");
        std::fs::write(
            &path,
            r#"
[fuzzer]
max-runs = 1000
max-len = 64
seed = 42

[corpus]
dir = "corpus"
output-dir = "crashes"

[dictionary]
paths = ["php.dict"]
"#,
        )
        .unwrap();

        let config = FuzzerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.fuzzer.max_runs, Some(1000));
        assert_eq!(config.fuzzer.max_len, 64);
        assert_eq!(config.fuzzer.seed, Some(42));
        assert_eq!(config.corpus.dir, Some(PathBuf::from("corpus")));
        assert_eq!(config.corpus.output_dir, PathBuf::from("crashes"));
        assert_eq!(config.dictionary.paths, vec![PathBuf::from("php.dict")]);
    }

    #[test]
    fn unknown_keys_and_zero_limits_are_rejected() {
        assert!(toml::from_str::<FuzzerConfig>("[fuzzer]\nthreads = 4\n").is_err());

        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[fuzzer]\nmax-len = 0\n").unwrap();
        let err = FuzzerConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("max-len"));

        let mut config = FuzzerConfig::default();
        config.fuzzer.mutation_depth = 0;
        assert!(config.validate().is_err());
    }
}
