//! Converts axis-aligned YOLO boxes (`class cx cy w h`) into polygon lines
//! (`class xmin xmax xmax xmin ymin ymin ymax ymax`) using exact decimal
//! arithmetic, so no binary floating-point rounding leaks into the output.
//!
//! Results are written to a `converted/` directory next to the sources;
//! source files are never modified.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;

use super::{collect_files_with_extensions, file_name, require_dir, Depth, LABEL_EXTENSION};
use crate::error::ObbkitError;

/// Name of the output directory created inside the source directory.
pub const CONVERTED_DIR: &str = "converted";

const BOX_FIELDS: usize = 5;

/// A line left out of the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedLine {
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

/// Outcome of a conversion run.
#[derive(Clone, Debug, Default)]
pub struct BboxToPolyReport {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub files_converted: usize,
    pub skipped: Vec<SkippedLine>,
    /// How many skipped lines `Display` lists.
    pub sample_limit: usize,
}

impl fmt::Display for BboxToPolyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.files_converted == 0 {
            return writeln!(f, "No .txt files found in {}", self.source_dir.display());
        }

        if !self.skipped.is_empty() {
            writeln!(f, "Skipped lines ({}):", self.skipped.len())?;
            for skipped in self.skipped.iter().take(self.sample_limit) {
                writeln!(
                    f,
                    "  - {}: line {} ({})",
                    skipped.file, skipped.line, skipped.reason
                )?;
            }
            if self.skipped.len() > self.sample_limit {
                writeln!(f, "  ... and {} more", self.skipped.len() - self.sample_limit)?;
            }
        }

        writeln!(
            f,
            "{} file(s) processed. Results saved in {}",
            self.files_converted,
            self.output_dir.display()
        )
    }
}

/// Parses a decimal token, accepting plain and scientific notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// `value / 2` at the scale decimal division prefers: the dividend's scale
/// when the quotient fits it, otherwise the fewest digits that stay exact.
/// So `0.1` halves to `0.05`, `0.20` to `0.10` and `1` to `0.5`.
fn half(value: Decimal) -> Decimal {
    let mut quotient = (value / Decimal::TWO).normalize();
    if quotient.scale() < value.scale() {
        quotient.rescale(value.scale());
    }
    quotient
}

/// Corner values for a box, in output order:
/// `xmin xmax xmax xmin ymin ymin ymax ymax` (top-left, top-right,
/// bottom-right, bottom-left).
pub fn polygon_values(
    cx: Decimal,
    cy: Decimal,
    w: Decimal,
    h: Decimal,
) -> Option<[Decimal; 8]> {
    let half_w = half(w);
    let half_h = half(h);
    let x_min = cx.checked_sub(half_w)?;
    let x_max = cx.checked_add(half_w)?;
    let y_min = cy.checked_sub(half_h)?;
    let y_max = cy.checked_add(half_h)?;
    Some([x_min, x_max, x_max, x_min, y_min, y_min, y_max, y_max])
}

fn convert_line(line: &str) -> Result<Option<String>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(None);
    }
    if parts.len() != BOX_FIELDS {
        return Err(format!(
            "expected {BOX_FIELDS} columns, found {}",
            parts.len()
        ));
    }

    let mut numbers = [Decimal::ZERO; 4];
    for (slot, raw) in numbers.iter_mut().zip(&parts[1..]) {
        *slot = parse_decimal(raw)
            .ok_or_else(|| format!("could not convert numeric values: {}", parts.join(" ")))?;
    }
    let [cx, cy, w, h] = numbers;
    let values =
        polygon_values(cx, cy, w, h).ok_or_else(|| "coordinates overflow".to_string())?;

    let mut out = String::from(parts[0]);
    for value in values {
        out.push(' ');
        out.push_str(&value.to_string());
    }
    Ok(Some(out))
}

/// Converts the text of one label file, returning the new text and the
/// lines that were skipped.
pub fn convert_text(text: &str, file: &str) -> (String, Vec<SkippedLine>) {
    let mut lines = Vec::new();
    let mut skipped = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        match convert_line(line) {
            Ok(Some(converted)) => lines.push(converted),
            Ok(None) => {}
            Err(reason) => {
                warn!(file, line = idx + 1, %reason, "skipping label line");
                skipped.push(SkippedLine {
                    file: file.to_string(),
                    line: idx + 1,
                    reason,
                });
            }
        }
    }

    let mut out = lines.join("\n");
    if !lines.is_empty() {
        out.push('\n');
    }
    (out, skipped)
}

/// Converts every `.txt` directly inside `labels_dir` into
/// `labels_dir/converted/`.
pub fn convert_labels(labels_dir: &Path, sample_limit: usize) -> Result<BboxToPolyReport, ObbkitError> {
    require_dir(labels_dir)?;
    let output_dir = labels_dir.join(CONVERTED_DIR);
    let files = collect_files_with_extensions(labels_dir, &[LABEL_EXTENSION], Depth::TopLevel)?;

    let mut report = BboxToPolyReport {
        source_dir: labels_dir.to_path_buf(),
        output_dir: output_dir.clone(),
        files_converted: 0,
        skipped: Vec::new(),
        sample_limit,
    };
    if files.is_empty() {
        return Ok(report);
    }

    fs::create_dir_all(&output_dir)?;
    for path in files {
        let name = file_name(&path);
        let text = fs::read_to_string(&path)?;
        let (converted, skipped) = convert_text(&text, &name);
        fs::write(output_dir.join(&name), converted)?;
        report.skipped.extend(skipped);
        report.files_converted += 1;
    }

    Ok(report)
}
