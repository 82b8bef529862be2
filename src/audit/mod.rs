//! Read-only dataset audit.
//!
//! For each split of a YOLO dataset root (`images/<split>`, `labels/<split>`)
//! the auditor counts files, pairs images with labels by stem, and can
//! optionally validate label syntax, probe image headers and read the
//! trainer's label cache. Nothing is ever written.

pub mod cache;
mod report;

pub use report::{AuditReport, FormatIssue, FormatIssueKind, SplitAudit, UnreadableImage};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ObbkitError;
use crate::label::{
    collect_files_with_extensions, file_name, file_stem, require_dir, Depth, IMAGE_EXTENSIONS,
    LABEL_EXTENSION,
};

/// Field count of an oriented-box label line: `cls x y w h angle`.
pub const DEFAULT_FIELDS: usize = 6;
/// Field count of a polygon label line: `cls` plus four corners.
pub const POLYGON_FIELDS: usize = 9;

/// Options for [`audit_dataset`].
#[derive(Clone, Debug)]
pub struct AuditOptions {
    pub splits: Vec<String>,
    /// Sample size for printed lists.
    pub limit: usize,
    pub check_format: bool,
    /// Expected tokens per label line when `check_format` is set.
    pub expected_fields: usize,
    pub inspect_cache: bool,
    pub check_images: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            splits: vec!["train".into(), "val".into(), "test".into()],
            limit: 5,
            check_format: false,
            expected_fields: DEFAULT_FIELDS,
            inspect_cache: false,
            check_images: false,
        }
    }
}

/// Audits every requested split under `root`.
pub fn audit_dataset(root: &Path, opts: &AuditOptions) -> Result<AuditReport, ObbkitError> {
    require_dir(root)?;

    let splits = opts
        .splits
        .iter()
        .map(|split| audit_split(root, split, opts))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AuditReport {
        root: root.to_path_buf(),
        limit: opts.limit,
        splits,
    })
}

fn list_split_dir(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, ObbkitError> {
    if !dir.is_dir() {
        warn!(path = %dir.display(), "split directory missing, counting as empty");
        return Ok(Vec::new());
    }
    collect_files_with_extensions(dir, extensions, Depth::TopLevel)
}

fn stems(paths: &[PathBuf]) -> BTreeSet<String> {
    paths.iter().filter_map(|p| file_stem(p)).collect()
}

/// Names of `paths` whose stem is absent from `other`.
fn unmatched(paths: &[PathBuf], other: &BTreeSet<String>) -> Vec<String> {
    paths
        .iter()
        .filter(|p| file_stem(p).is_some_and(|stem| !other.contains(&stem)))
        .map(|p| file_name(p))
        .collect()
}

fn audit_split(root: &Path, split: &str, opts: &AuditOptions) -> Result<SplitAudit, ObbkitError> {
    let images = list_split_dir(&root.join("images").join(split), &IMAGE_EXTENSIONS)?;
    let labels = list_split_dir(&root.join("labels").join(split), &[LABEL_EXTENSION])?;
    debug!(split, images = images.len(), labels = labels.len(), "scanned split");

    let image_stems = stems(&images);
    let label_stems = stems(&labels);

    let format_issues = if opts.check_format {
        let mut issues = Vec::new();
        for path in &labels {
            issues.extend(check_label_file(path, opts.expected_fields)?);
        }
        Some(issues)
    } else {
        None
    };

    let unreadable_images = opts.check_images.then(|| {
        images
            .iter()
            .filter_map(|path| {
                imagesize::size(path).err().map(|err| UnreadableImage {
                    file: file_name(path),
                    message: err.to_string(),
                })
            })
            .collect()
    });

    let cache = opts
        .inspect_cache
        .then(|| cache::inspect_cache(&root.join("labels").join(format!("{split}.cache"))));

    Ok(SplitAudit {
        name: split.to_string(),
        image_count: images.len(),
        label_count: labels.len(),
        labels_without_image: unmatched(&labels, &image_stems),
        images_without_label: unmatched(&images, &label_stems),
        format_issues,
        unreadable_images,
        cache,
    })
}

/// Checks every non-empty line of one label file.
pub fn check_label_file(
    path: &Path,
    expected_fields: usize,
) -> Result<Vec<FormatIssue>, ObbkitError> {
    let file = file_name(path);
    let bytes = fs::read(path)?;
    let Ok(text) = String::from_utf8(bytes) else {
        return Ok(vec![FormatIssue {
            file,
            line: 0,
            kind: FormatIssueKind::Unreadable,
            detail: "not valid UTF-8".to_string(),
            text: String::new(),
        }]);
    };

    let issues = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| {
            check_line(line, expected_fields).map(|(kind, detail)| FormatIssue {
                file: file.clone(),
                line: idx + 1,
                kind,
                detail,
                text: line.trim().to_string(),
            })
        })
        .collect();
    Ok(issues)
}

/// Validates one label line; the first failing rule wins.
pub fn check_line(line: &str, expected_fields: usize) -> Option<(FormatIssueKind, String)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != expected_fields {
        return Some((
            FormatIssueKind::FieldCount,
            format!("expected {expected_fields} fields, found {}", parts.len()),
        ));
    }

    let class = parts[0];
    if class.is_empty() || !class.bytes().all(|b| b.is_ascii_digit()) {
        return Some((
            FormatIssueKind::ClassIndex,
            format!("class '{class}' is not a non-negative integer"),
        ));
    }

    let mut values = Vec::with_capacity(parts.len() - 1);
    for raw in &parts[1..] {
        match raw.parse::<f64>() {
            Ok(value) => values.push(value),
            Err(_) => {
                return Some((FormatIssueKind::NotNumeric, format!("'{raw}' is not a number")))
            }
        }
    }
    if let Some(raw) = parts[1..]
        .iter()
        .zip(&values)
        .find_map(|(raw, value)| (!value.is_finite()).then_some(raw))
    {
        return Some((FormatIssueKind::NotFinite, format!("'{raw}' is not finite")));
    }

    range_issue(&values, expected_fields).map(|detail| (FormatIssueKind::OutOfRange, detail))
}

fn range_issue(values: &[f64], expected_fields: usize) -> Option<String> {
    let unit = |v: f64| (0.0..=1.0).contains(&v);
    match expected_fields {
        5 | 6 => {
            let [x, y, w, h] = [values[0], values[1], values[2], values[3]];
            if !unit(x) || !unit(y) {
                Some(format!("center ({x}, {y}) outside [0, 1]"))
            } else if !(w > 0.0 && w <= 1.0) || !(h > 0.0 && h <= 1.0) {
                Some(format!("size ({w}, {h}) outside (0, 1]"))
            } else {
                None
            }
        }
        POLYGON_FIELDS => values
            .iter()
            .position(|v| !unit(*v))
            .map(|i| format!("coordinate {} = {} outside [0, 1]", i + 1, values[i])),
        _ => None,
    }
}
