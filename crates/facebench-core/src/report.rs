//! Text reports: cross-validation table rows, Octave ROC files, pair
//! benchmark lines and the selector listing.

use crate::benchmark::{PairBenchmark, SplitResult};
use crate::classifier::ClassifierKind;
use crate::eval::{CrossSummary, FoldStats};
use crate::extractor::ExtractorKind;
use crate::filter::FilterKind;
use crate::metrics::RocPoint;
use chrono::{DateTime, Utc};
use facebench_img::PreprocessKind;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Selector names printed per listing row.
const OPTIONS_PER_ROW: usize = 5;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `"<folds> fold, <persons> classes, <images> images, <preprocess>"`.
pub fn dataset_banner(folds: usize, persons: usize, images: usize, preprocess: PreprocessKind) -> String {
    format!("{folds} fold, {persons} classes, {images} images, {preprocess}")
}

pub fn fold_line(name: &str, stats: &FoldStats) -> String {
    format!(" {:<16} {:>3} {:>5} {}", name, stats.fold, stats.correct, stats.errors)
}

/// Final cross-validation row: name, errors, total, accuracy.
pub fn cross_row(summary: &CrossSummary) -> String {
    format!(
        " {:<16} {:>6} {:>6} {:>6.3}",
        summary.name, summary.errors, summary.total, summary.accuracy
    )
}

/// Render ROC points as two labelled 1×N Octave text matrices,
/// `tpr_<name>` and `fpr_<name>`.
pub fn render_roc(name: &str, points: &[RocPoint], created: DateTime<Utc>) -> String {
    let mut out = format!("# Created by facebench, {}\n", created.format("%a %b %d %H:%M:%S %Y UTC"));
    let series: [(&str, Vec<f64>); 2] = [
        ("tpr", points.iter().map(|p| p.tpr).collect()),
        ("fpr", points.iter().map(|p| p.fpr).collect()),
    ];
    for (label, values) in series {
        let _ = writeln!(out, "# name: {label}_{name}");
        let _ = writeln!(out, "# type: matrix");
        let _ = writeln!(out, "# rows: 1");
        let _ = writeln!(out, "# columns: {}", values.len());
        for v in &values {
            let _ = write!(out, " {v}");
        }
        out.push_str("\n\n\n");
    }
    out
}

/// Write `<dir>/<name>.roc` and return its path.
pub fn write_roc(dir: &Path, name: &str, points: &[RocPoint]) -> Result<PathBuf, ReportError> {
    let path = dir.join(format!("{name}.roc"));
    std::fs::write(&path, render_roc(name, points, Utc::now())).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!(path = %path.display(), points = points.len(), "roc file written");
    Ok(path)
}

pub fn split_line(result: &SplitResult) -> String {
    format!(
        "{:>4} {:.3}/{:<5.3}  {:.3}",
        result.split, result.tpr, result.fpr, result.accuracy
    )
}

/// Benchmark summary: stage names, then `acc/se tpr/fpr seconds`.
pub fn pair_summary(
    extractor: ExtractorKind,
    filter: FilterKind,
    comparator: ClassifierKind,
    bench: &PairBenchmark,
) -> String {
    format!(
        "{:<8} {:<7} {:<11} {:<5}\t{:.4}/{:<6.4} {:.4}/{:<6.4} {:.4}",
        extractor.name(),
        filter.name(),
        comparator.name(),
        bench.train_method.name(),
        bench.mean_accuracy,
        bench.std_error,
        bench.mean_tpr,
        bench.mean_fpr,
        bench.elapsed_secs,
    )
}

/// Index/name table of every selector.
pub fn options_listing() -> String {
    let mut out = String::new();
    section(&mut out, "extractors", ExtractorKind::ALL.iter().map(|k| k.name()));
    section(&mut out, "filters", FilterKind::ALL.iter().map(|k| k.name()));
    section(&mut out, "classifiers", ClassifierKind::ALL.iter().map(|k| k.name()));
    section(&mut out, "preprocessing", PreprocessKind::ALL.iter().map(|k| k.name()));
    out
}

fn section<'a>(out: &mut String, title: &str, names: impl Iterator<Item = &'a str>) {
    let _ = writeln!(out, "{title}:");
    let names: Vec<&str> = names.collect();
    for (row, chunk) in names.chunks(OPTIONS_PER_ROW).enumerate() {
        for (col, name) in chunk.iter().enumerate() {
            let _ = write!(out, "{:>4} {:<12}", row * OPTIONS_PER_ROW + col, name);
        }
        out.push('\n');
    }
    out.push('\n');
}
