use crate::rng::FuzzRng;
use regex::bytes::{Captures, Regex};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("Dictionary {path:?} does not exist")]
    Missing { path: std::path::PathBuf },
    #[error("Failed to read dictionary {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Line {line} of dictionary is invalid")]
    InvalidLine { line: usize },
    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Flat list of byte strings used by the dictionary-word mutation.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: Vec<Vec<u8>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words(words: Vec<Vec<u8>>) -> Self {
        Self { words }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn add_words(&mut self, words: impl IntoIterator<Item = Vec<u8>>) {
        self.words.extend(words);
    }

    pub fn choose(&self, rng: &mut FuzzRng) -> Option<&[u8]> {
        rng.choose(&self.words).map(Vec::as_slice)
    }

    /// Parses a dictionary file and appends its entries.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, DictionaryError> {
        if !path.is_file() {
            return Err(DictionaryError::Missing {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read(path).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let words = parse(&text)?;
        let added = words.len();
        self.add_words(words);
        Ok(added)
    }
}

/// One quoted entry anywhere on the line, optionally preceded by `name=`. Only `\\`, `\"` and
/// `\xHH` escapes are allowed inside the quotes.
const ENTRY_PATTERN: &str = r#"(?s-u)(?:\w+=)?"((?:[^"\\]|\\(?:["\\]|x[0-9a-zA-Z]{2}))*)""#;
const ESCAPE_PATTERN: &str = r#"(?s-u)\\(["\\]|x[0-9a-zA-Z]{2})"#;

/// Parses the dictionary text format. Blank lines and `#` comments are skipped, text around the
/// quoted entry is ignored, and a line without a well-formed entry is an error.
pub fn parse(text: &[u8]) -> Result<Vec<Vec<u8>>, DictionaryError> {
    let entry = Regex::new(ENTRY_PATTERN)?;
    let escape = Regex::new(ESCAPE_PATTERN)?;

    let mut words = Vec::new();
    for (idx, raw_line) in text.split(|b| *b == b'\n').enumerate() {
        let line = raw_line.trim_ascii();
        if line.is_empty() || line[0] == b'#' {
            continue;
        }
        let caps = entry
            .captures(line)
            .ok_or(DictionaryError::InvalidLine { line: idx + 1 })?;
        let escaped = caps.get(1).map_or(&b""[..], |m| m.as_bytes());
        let word = escape.replace_all(escaped, |caps: &Captures| unescape(&caps[1]));
        words.push(word.into_owned());
    }
    Ok(words)
}

/// `"` and `\\` stand for themselves. `xHH` is a byte built from the hex digits among `HH`,
/// non-hex characters are skipped.
fn unescape(escape: &[u8]) -> Vec<u8> {
    match escape.split_first() {
        Some((b'x', digits)) => {
            let byte = digits
                .iter()
                .filter_map(|b| char::from(*b).to_digit(16))
                .fold(0u32, |acc, d| acc * 16 + d);
            vec![byte as u8]
        }
        _ => escape.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_names_comments_and_escapes() {
        let text = br#"# Comment
foo="bar"
"baz"

"\\abc\\abc\\"
"\"abc\"abc\""
"\x00abc\x00abc\x00"
"#;
        let words = parse(text).unwrap();
        assert_eq!(
            words,
            vec![
                b"bar".to_vec(),
                b"baz".to_vec(),
                b"\\abc\\abc\\".to_vec(),
                b"\"abc\"abc\"".to_vec(),
                b"\x00abc\x00abc\x00".to_vec(),
            ]
        );
    }

    #[test]
    fn invalid_line_reports_line_number() {
        let text = b"\"ok\"\nnot quoted\n";
        match parse(text) {
            Err(DictionaryError::InvalidLine { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected invalid line error, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_and_unknown_escape_are_rejected() {
        assert!(parse(b"\"abc").is_err());
        assert!(parse(b"\"a\\qb\"").is_err());
    }

    #[test]
    fn text_around_the_entry_is_ignored() {
        let words = parse(b"kw@1=\"foo\"\nkw1 = \"bar\"\n1bad name=\"x\" trailing").unwrap();
        assert_eq!(words, vec![b"foo".to_vec(), b"bar".to_vec(), b"x".to_vec()]);
    }

    #[test]
    fn hex_escape_keeps_only_hex_digits() {
        let words = parse(b"\"\\xZZ\"\n\"\\x1Z\"\n\"\\xff\"").unwrap();
        assert_eq!(words, vec![vec![0u8], vec![1u8], vec![0xffu8]]);
    }

    #[test]
    fn load_file_appends_words() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.dict");
        std::fs::write(&path, "kw1=\"select\"\n\"from\"\n").unwrap();

        let mut dict = Dictionary::new();
        assert_eq!(dict.load_file(&path).unwrap(), 2);
        assert_eq!(dict.len(), 2);

        let missing = dir.path().join("nope.dict");
        assert!(matches!(
            dict.load_file(&missing),
            Err(DictionaryError::Missing { .. })
        ));
    }
}
