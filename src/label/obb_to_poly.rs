//! Rewrites oriented-box labels (`class cx cy w h [angle]`) as explicit
//! four-corner polygons (`class` followed by eight coordinates).
//!
//! Lines that already carry nine fields pass through untouched. Unlike the
//! other converters this one stops at the first unparseable line.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{collect_label_files, Depth, LabelText};
use crate::error::ObbkitError;
use crate::geom::{AngleUnit, CornerOrder, OrientedBox};

const MIN_FIELDS: usize = 5;
const POLYGON_FIELDS: usize = 9;

/// Options for [`convert_labels`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ObbToPolyOptions {
    /// Unit of the stored angles (and of `default_angle`).
    pub angle_unit: AngleUnit,
    /// Angle used for lines with only five fields.
    pub default_angle: f64,
    pub order: CornerOrder,
    pub dry_run: bool,
}

/// A line that could not be converted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

/// Outcome of a conversion run.
#[derive(Clone, Debug, Default)]
pub struct ObbToPolyReport {
    pub dry_run: bool,
    pub files_scanned: usize,
    pub changed: Vec<PathBuf>,
}

impl fmt::Display for ObbToPolyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            for path in &self.changed {
                writeln!(f, "[dry-run] Would update {}", path.display())?;
            }
        }
        let verb = if self.dry_run { "would be" } else { "were" };
        writeln!(f, "{} files {} updated.", self.changed.len(), verb)
    }
}

/// Formats with 15 fixed decimals, then strips trailing zeros and a
/// trailing dot.
pub fn format_float(value: f64) -> String {
    let text = format!("{value:.15}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Converts the tokens of one non-empty label line.
pub fn convert_line(parts: &[&str], opts: &ObbToPolyOptions) -> Result<String, String> {
    if parts.len() < MIN_FIELDS {
        return Err(format!(
            "expected at least {MIN_FIELDS} fields, found {}",
            parts.len()
        ));
    }
    if parts.len() == POLYGON_FIELDS {
        return Ok(parts.join(" "));
    }

    let parse = |raw: &str| {
        raw.parse::<f64>()
            .map_err(|_| format!("could not parse numbers: {}", parts.join(" ")))
    };
    let cx = parse(parts[1])?;
    let cy = parse(parts[2])?;
    let w = parse(parts[3])?;
    let h = parse(parts[4])?;
    let angle = match parts.get(5) {
        Some(raw) => parse(raw)?,
        None => opts.default_angle,
    };

    let obb = OrientedBox::new(cx, cy, w, h, opts.angle_unit.to_radians(angle));
    let values = opts.order.flatten(&obb.corners());

    let mut out = String::from(parts[0]);
    for value in values {
        out.push(' ');
        out.push_str(&format_float(value));
    }
    Ok(out)
}

/// Converts the text of one label file.
///
/// Blank lines are dropped. Returns `Ok(None)` when every line was already
/// in its converted form.
pub fn convert_text(text: &str, opts: &ObbToPolyOptions) -> Result<Option<String>, LineError> {
    let source = LabelText::parse(text);
    let mut changed = false;
    let mut lines = Vec::with_capacity(source.lines.len());

    for (idx, line) in source.lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        let parts: Vec<&str> = stripped.split_whitespace().collect();
        let converted = convert_line(&parts, opts).map_err(|message| LineError {
            line: idx + 1,
            message,
        })?;
        if converted != stripped {
            changed = true;
        }
        lines.push(converted);
    }

    Ok(changed.then(|| LabelText::render(&lines, source.trailing_newline)))
}

/// Converts every `.txt` file under `labels_dir` in place.
///
/// Files processed before a failing line keep their new contents.
pub fn convert_labels(
    labels_dir: &Path,
    opts: &ObbToPolyOptions,
) -> Result<ObbToPolyReport, ObbkitError> {
    let files = collect_label_files(labels_dir, Depth::Recursive)?;
    let mut report = ObbToPolyReport {
        dry_run: opts.dry_run,
        files_scanned: files.len(),
        changed: Vec::new(),
    };

    for path in files {
        let text = fs::read_to_string(&path)?;
        let converted = convert_text(&text, opts).map_err(|err| ObbkitError::LabelParse {
            path: path.clone(),
            line: err.line,
            message: err.message,
        })?;
        let Some(converted) = converted else {
            continue;
        };

        if !opts.dry_run {
            fs::write(&path, converted)?;
            debug!(path = %path.display(), "wrote polygon labels");
        }
        report.changed.push(path);
    }

    Ok(report)
}

/// Fuzz-only entrypoint for single-line conversion.
#[cfg(feature = "fuzzing")]
pub fn fuzz_convert_line(input: &str) {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let _ = convert_line(&parts, &ObbToPolyOptions::default());
}
