//! Naming contract for inputs persisted by the fuzzer.

use std::path::{Path, PathBuf};

pub const INPUT_EXTENSION: &str = "txt";
pub const CRASH_PREFIX: &str = "crash-";
pub const MINIMIZED_PREFIX: &str = "minimized-";

/// Lowercase hex MD5 digest of `input`, used as corpus key and file stem.
pub fn content_hash(input: &[u8]) -> String {
    format!("{:x}", md5::compute(input))
}

/// `<dir>/<hash>.txt`
pub fn corpus_file_name(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{hash}.{INPUT_EXTENSION}"))
}

/// `<dir>/crash-<hash>.txt`
pub fn crash_file_name(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{CRASH_PREFIX}{hash}.{INPUT_EXTENSION}"))
}

/// `<dir>/minimized-<hash>.txt`
pub fn minimized_file_name(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{MINIMIZED_PREFIX}{hash}.{INPUT_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_md5_hex() {
        assert_eq!(content_hash(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_hash(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn file_names_follow_conventions() {
        let dir = Path::new("/tmp/out");
        assert_eq!(
            corpus_file_name(dir, "ab12"),
            PathBuf::from("/tmp/out/ab12.txt")
        );
        assert_eq!(
            crash_file_name(dir, "ab12"),
            PathBuf::from("/tmp/out/crash-ab12.txt")
        );
        assert_eq!(
            minimized_file_name(dir, "ab12"),
            PathBuf::from("/tmp/out/minimized-ab12.txt")
        );
    }
}
