//! Forces every label line onto a single class and drops any field past the
//! fifth (the angle of an oriented box), leaving `class cx cy w h`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{collect_label_files, Depth, LabelText};
use crate::error::ObbkitError;

/// Number of fields kept on each line.
const CANONICAL_FIELDS: usize = 5;

/// Options for [`normalize_labels`].
#[derive(Clone, Debug)]
pub struct NormalizeOptions {
    /// Class token written at the start of every line.
    pub class_id: String,
    /// Report changes without writing them.
    pub dry_run: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            class_id: "0".to_string(),
            dry_run: false,
        }
    }
}

/// Outcome of a normalization run.
#[derive(Clone, Debug, Default)]
pub struct NormalizeReport {
    pub dry_run: bool,
    pub files_scanned: usize,
    /// Files that changed (or would change in a dry run).
    pub changed: Vec<PathBuf>,
}

impl fmt::Display for NormalizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            for path in &self.changed {
                writeln!(f, "Would update {}", path.display())?;
            }
        }
        let verb = if self.dry_run { "would be" } else { "were" };
        writeln!(f, "{} label files {} updated.", self.changed.len(), verb)
    }
}

/// Normalizes the text of one label file.
///
/// Returns `None` when nothing changes. Blank lines are kept as they are;
/// other lines are re-joined with single spaces.
pub fn normalize_text(text: &str, class_id: &str) -> Option<String> {
    let source = LabelText::parse(text);
    let mut changed = false;
    let mut lines = Vec::with_capacity(source.lines.len());

    for line in &source.lines {
        let mut parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            lines.push(line.clone());
            continue;
        }

        if parts[0] != class_id {
            parts[0] = class_id;
            changed = true;
        }
        if parts.len() > CANONICAL_FIELDS {
            parts.truncate(CANONICAL_FIELDS);
            changed = true;
        }
        lines.push(parts.join(" "));
    }

    changed.then(|| LabelText::render(&lines, source.trailing_newline))
}

/// Rewrites every `.txt` file under `labels_dir` in place.
pub fn normalize_labels(
    labels_dir: &Path,
    opts: &NormalizeOptions,
) -> Result<NormalizeReport, ObbkitError> {
    let files = collect_label_files(labels_dir, Depth::Recursive)?;
    let mut report = NormalizeReport {
        dry_run: opts.dry_run,
        files_scanned: files.len(),
        changed: Vec::new(),
    };

    for path in files {
        let text = fs::read_to_string(&path)?;
        let Some(updated) = normalize_text(&text, &opts.class_id) else {
            continue;
        };

        if !opts.dry_run {
            fs::write(&path, updated)?;
            debug!(path = %path.display(), "normalized label file");
        }
        report.changed.push(path);
    }

    Ok(report)
}
