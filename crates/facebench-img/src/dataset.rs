//! Dataset descriptions: sample list files for closed-set evaluation and the
//! LFW pair lists for pairwise verification.
//!
//! Both refer to images by a path key relative to the dataset root. The
//! person identity of a key is its first path component (`"alice/x.jpg"` →
//! `"alice"`) unless a list line names it explicitly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Dense integer identity, assigned in first-seen order.
pub type Label = usize;

pub const LFW_DEV_TRAIN_FILE: &str = "pairsDevTrain.txt";
pub const LFW_SPLITS_FILE: &str = "pairs.txt";

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("dataset is empty")]
    Empty,
}

/// Stable identity → label mapping. Labels are handed out in the order
/// identities are first seen.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    index: HashMap<String, Label>,
    names: Vec<String>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label for an identity, assigning the next free one on first encounter.
    pub fn label_for(&mut self, identity: &str) -> Label {
        if let Some(&label) = self.index.get(identity) {
            return label;
        }
        let label = self.names.len();
        self.names.push(identity.to_string());
        self.index.insert(identity.to_string(), label);
        label
    }

    /// Label for the person owning an image path key.
    pub fn label_for_path(&mut self, key: &str) -> Label {
        self.label_for(identity_of(key))
    }

    pub fn name(&self, label: Label) -> Option<&str> {
        self.names.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Person identity of a path key: everything before the first `/`.
pub fn identity_of(key: &str) -> &str {
    key.split_once('/').map_or(key, |(person, _)| person)
}

/// One entry of a sample list file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub path: String,
    pub identity: String,
}

/// Parse a sample list. Each non-empty, non-`#` line is either
/// `path;identity` or a bare `path`, whose identity is its first component.
pub fn parse_sample_list(text: &str) -> Result<Vec<SampleRecord>, DatasetError> {
    let mut records = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (path, identity) = match line.split_once(';') {
            Some((path, identity)) => (path.trim(), identity.trim()),
            None => (line, identity_of(line)),
        };
        if path.is_empty() || identity.is_empty() {
            return Err(DatasetError::Parse {
                line: i + 1,
                reason: format!("expected `path;identity`, got {line:?}"),
            });
        }
        records.push(SampleRecord {
            path: path.to_string(),
            identity: identity.to_string(),
        });
    }
    Ok(records)
}

pub fn read_sample_list(path: &Path) -> Result<Vec<SampleRecord>, DatasetError> {
    let text = read_text(path)?;
    parse_sample_list(&text)
}

/// Two image keys and whether they show the same person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub image1: String,
    pub image2: String,
    pub same: bool,
}

/// LFW-style pair dataset: a development training list plus the numbered
/// test splits.
#[derive(Debug, Clone, Default)]
pub struct PairDataset {
    train: Vec<ImagePair>,
    splits: Vec<Vec<ImagePair>>,
}

impl PairDataset {
    pub fn new(train: Vec<ImagePair>, splits: Vec<Vec<ImagePair>>) -> Self {
        Self { train, splits }
    }

    /// Load `pairsDevTrain.txt` and `pairs.txt` from the dataset root.
    pub fn load(root: &Path) -> Result<Self, DatasetError> {
        let train = parse_pairs(&read_text(&root.join(LFW_DEV_TRAIN_FILE))?)?
            .into_iter()
            .flatten()
            .collect();
        let splits = parse_pairs(&read_text(&root.join(LFW_SPLITS_FILE))?)?;
        let dataset = Self { train, splits };
        tracing::info!(
            root = %root.display(),
            train = dataset.train.len(),
            splits = dataset.splits.len(),
            "loaded LFW pairs"
        );
        Ok(dataset)
    }

    pub fn train(&self) -> &[ImagePair] {
        &self.train
    }

    pub fn num_splits(&self) -> usize {
        self.splits.len()
    }

    /// Pairs of test split `index`. Out-of-range indices yield no pairs.
    pub fn test(&self, index: usize) -> &[ImagePair] {
        self.splits.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Parse an LFW pair list.
///
/// The header is either `N` (one split of N matched and N mismatched pairs)
/// or `S N` (S splits). Matched lines are `name n1 n2`, mismatched lines are
/// `name1 n1 name2 n2`; every split lists its matched pairs first.
pub fn parse_pairs(text: &str) -> Result<Vec<Vec<ImagePair>>, DatasetError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let (header_line, header) = lines.next().ok_or(DatasetError::Empty)?;
    let numbers: Vec<usize> = header
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| DatasetError::Parse {
            line: header_line,
            reason: format!("bad header {header:?}: {e}"),
        })?;
    let (num_splits, per_kind) = match numbers.as_slice() {
        [n] => (1, *n),
        [s, n] => (*s, *n),
        _ => {
            return Err(DatasetError::Parse {
                line: header_line,
                reason: format!("expected `N` or `splits N`, got {header:?}"),
            })
        }
    };

    if per_kind.checked_mul(2).and_then(|n| n.checked_mul(num_splits)).is_none() {
        return Err(DatasetError::Parse {
            line: header_line,
            reason: format!("pair count in header {header:?} is out of range"),
        });
    }

    // Header counts are untrusted; vectors grow with the lines actually read.
    let mut last_line = header_line;
    let mut splits = Vec::new();
    for _ in 0..num_splits {
        let mut split = Vec::new();
        for same in [true, false] {
            for _ in 0..per_kind {
                let (line, text) = lines.next().ok_or_else(|| DatasetError::Parse {
                    line: last_line,
                    reason: "unexpected end of pair list".into(),
                })?;
                last_line = line;
                split.push(parse_pair_line(line, text, same)?);
            }
        }
        splits.push(split);
    }
    Ok(splits)
}

fn parse_pair_line(line: usize, text: &str, same: bool) -> Result<ImagePair, DatasetError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let parse_num = |t: &str| {
        t.parse::<u32>().map_err(|e| DatasetError::Parse {
            line,
            reason: format!("bad image number {t:?}: {e}"),
        })
    };
    match (same, tokens.as_slice()) {
        (true, &[name, a, b]) => Ok(ImagePair {
            image1: lfw_key(name, parse_num(a)?),
            image2: lfw_key(name, parse_num(b)?),
            same: true,
        }),
        (false, &[name1, a, name2, b]) => Ok(ImagePair {
            image1: lfw_key(name1, parse_num(a)?),
            image2: lfw_key(name2, parse_num(b)?),
            same: false,
        }),
        _ => Err(DatasetError::Parse {
            line,
            reason: format!(
                "expected {} pair, got {text:?}",
                if same { "a matched" } else { "a mismatched" }
            ),
        }),
    }
}

/// Path key of the n-th image of a person in the LFW directory layout.
pub fn lfw_key(name: &str, number: u32) -> String {
    format!("{name}/{name}_{number:04}.jpg")
}

fn read_text(path: &Path) -> Result<String, DatasetError> {
    std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_first_seen_order() {
        let mut labels = LabelMap::new();
        assert_eq!(labels.label_for_path("alice/x.jpg"), 0);
        assert_eq!(labels.label_for_path("bob/y.jpg"), 1);
        assert_eq!(labels.label_for_path("alice/z.jpg"), 0);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.name(1), Some("bob"));
    }

    #[test]
    fn test_identity_without_separator() {
        assert_eq!(identity_of("carol.jpg"), "carol.jpg");
        assert_eq!(identity_of("dave/sub/1.png"), "dave");
    }

    #[test]
    fn test_parse_sample_list() {
        let text = "# faces\n\
                    s1/1.pgm;0\n\
                    s1/2.pgm; 0 \n\
                    \n\
                    s2/1.pgm\n";
        let records = parse_sample_list(text).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].identity, "0");
        assert_eq!(records[2].identity, "s2");
    }

    #[test]
    fn test_parse_sample_list_rejects_empty_identity() {
        let err = parse_sample_list("a.png;\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_parse_dev_train_pairs() {
        let text = "1\n\
                    Abel_Pacheco 1 4\n\
                    Abel_Pacheco 2 3 \n\
                    Aaron 1 Zach 2\n";
        let err = parse_pairs(text).unwrap_err();
        // header says 1 matched + 1 mismatched; the second line is matched-shaped
        assert!(matches!(err, DatasetError::Parse { line: 3, .. }));

        let text = "1\nAbel_Pacheco 1 4\nAaron 1 Zach 2\n";
        let splits = parse_pairs(text).unwrap();
        assert_eq!(splits.len(), 1);
        assert_eq!(
            splits[0][0],
            ImagePair {
                image1: "Abel_Pacheco/Abel_Pacheco_0001.jpg".into(),
                image2: "Abel_Pacheco/Abel_Pacheco_0004.jpg".into(),
                same: true,
            }
        );
        assert!(!splits[0][1].same);
        assert_eq!(splits[0][1].image2, "Zach/Zach_0002.jpg");
    }

    #[test]
    fn test_parse_split_pairs() {
        let text = "2 1\nA 1 2\nA 1 B 1\nC 3 4\nC 1 D 9\n";
        let splits = parse_pairs(text).unwrap();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[1][0].image1, "C/C_0003.jpg");
        assert_eq!(splits[1][1].image2, "D/D_0009.jpg");
    }

    #[test]
    fn test_parse_pairs_truncated() {
        let err = parse_pairs("2 1\nA 1 2\nA 1 B 1\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 3, .. }));
        assert!(matches!(parse_pairs(""), Err(DatasetError::Empty)));
    }

    #[test]
    fn test_parse_pairs_oversized_header() {
        let err = parse_pairs("1 9223372036854775807\nA 1 2\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 1, .. }));

        // In range but far larger than the file: fails at the last line read.
        let err = parse_pairs("1000000 1000000\nA 1 2\n").unwrap_err();
        assert!(matches!(err, DatasetError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_pair_dataset_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LFW_DEV_TRAIN_FILE), "1\nA 1 2\nA 1 B 1\n").unwrap();
        std::fs::write(dir.path().join(LFW_SPLITS_FILE), "2 1\nA 1 2\nA 1 B 1\nC 3 4\nC 1 D 9\n")
            .unwrap();
        let dataset = PairDataset::load(dir.path()).unwrap();
        assert_eq!(dataset.train().len(), 2);
        assert_eq!(dataset.num_splits(), 2);
        assert_eq!(dataset.test(1).len(), 2);
        assert!(dataset.test(5).is_empty());
    }

    #[test]
    fn test_pair_dataset_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(PairDataset::load(dir.path()), Err(DatasetError::Io { .. })));
    }
}
