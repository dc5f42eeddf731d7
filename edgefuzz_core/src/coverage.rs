use crate::feature::BlockId;
use crate::instrument::FileInfo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Block maps of every instrumented file, keyed by source path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap {
    files: BTreeMap<String, FileInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCoverage {
    pub block: BlockId,
    pub pos: usize,
    pub covered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCoverage {
    pub path: String,
    /// `path` without the directory prefix shared by all reported files.
    pub short_path: String,
    pub covered: usize,
    pub total: usize,
    /// Probes in source order.
    pub blocks: Vec<BlockCoverage>,
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the block map of one file.
    pub fn insert(&mut self, path: impl AsRef<Path>, info: FileInfo) {
        self.files
            .insert(path.as_ref().to_string_lossy().into_owned(), info);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &FileInfo)> {
        self.files.iter().map(|(path, info)| (path.as_str(), info))
    }

    /// Per-file covered/total counts against the blocks reached by the corpus.
    pub fn report(&self, seen_blocks: &BTreeSet<BlockId>) -> Vec<FileCoverage> {
        let paths: Vec<&str> = self.files.keys().map(String::as_str).collect();
        let prefix = common_path_prefix(&paths);

        self.files
            .iter()
            .map(|(path, info)| {
                let mut blocks: Vec<BlockCoverage> = info
                    .block_index_to_pos
                    .iter()
                    .map(|(&block, &pos)| BlockCoverage {
                        block,
                        pos,
                        covered: seen_blocks.contains(&block),
                    })
                    .collect();
                blocks.sort_by_key(|b| (b.pos, b.block));
                FileCoverage {
                    path: path.clone(),
                    short_path: path
                        .strip_prefix(prefix.as_str())
                        .unwrap_or(path.as_str())
                        .to_string(),
                    covered: blocks.iter().filter(|b| b.covered).count(),
                    total: blocks.len(),
                    blocks,
                }
            })
            .collect()
    }
}

/// Longest common directory prefix of `paths`, including the trailing separator.
///
/// Both `/` and `\` count as separators. Returns an empty string when the paths share no
/// directory.
pub fn common_path_prefix<S: AsRef<str>>(paths: &[S]) -> String {
    let Some((first, rest)) = paths.split_first() else {
        return String::new();
    };
    let first = first.as_ref().as_bytes();
    let mut len = first.len();
    for path in rest {
        len = first[..len]
            .iter()
            .zip(path.as_ref().as_bytes())
            .take_while(|(a, b)| a == b)
            .count();
    }

    // Separators are ASCII, so cutting just past one stays on a char boundary.
    let cut = first[..len]
        .iter()
        .rposition(|&b| b == b'/' || b == b'\\')
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&first[..cut]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix_cases() {
        let cases: &[(&[&str], &str)] = &[
            (&[], ""),
            (&["/foo/bar/baz.php"], "/foo/bar/"),
            (&["C:\\foo\\bar\\baz.php"], "C:\\foo\\bar\\"),
            (&["bar", "foo"], ""),
            (&["/foo/bar/abc.php", "/foo/bar/abd.php"], "/foo/bar/"),
            (&["/foo/abc/bar.php", "/foo/abd/bar.php"], "/foo/"),
            (&["C:\\foo\\bar\\abc.php", "C:\\foo\\bar\\abd.php"], "C:\\foo\\bar\\"),
            (&["C:\\foo\\abc\\bar.php", "C:\\foo\\abd\\bar.php"], "C:\\foo\\"),
        ];
        for (paths, expected) in cases {
            assert_eq!(common_path_prefix(paths), *expected, "paths: {paths:?}");
        }
    }

    #[test]
    fn report_counts_seen_blocks_per_file() {
        let mut map = CoverageMap::new();
        map.insert(
            "/src/app/a.php",
            FileInfo {
                block_index_to_pos: [(1, 30), (2, 10), (3, 50)].into_iter().collect(),
            },
        );
        map.insert(
            "/src/app/lib/b.php",
            FileInfo {
                block_index_to_pos: [(4, 5)].into_iter().collect(),
            },
        );

        let seen: BTreeSet<BlockId> = [0, 2, 3].into_iter().collect();
        let report = map.report(&seen);
        assert_eq!(report.len(), 2);

        let a = &report[0];
        assert_eq!(a.short_path, "a.php");
        assert_eq!((a.covered, a.total), (2, 3));
        let order: Vec<_> = a.blocks.iter().map(|b| b.block).collect();
        assert_eq!(order, vec![2, 1, 3]);

        let b = &report[1];
        assert_eq!(b.short_path, "lib/b.php");
        assert_eq!((b.covered, b.total), (0, 1));
    }

    #[test]
    fn map_serializes_as_plain_object() {
        let mut map = CoverageMap::new();
        map.insert(
            "x.php",
            FileInfo {
                block_index_to_pos: [(1, 2)].into_iter().collect(),
            },
        );
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"x.php":{"block_index_to_pos":{"1":2}}}"#);
        assert_eq!(serde_json::from_str::<CoverageMap>(&json).unwrap(), map);
    }
}
