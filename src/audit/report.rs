//! Audit report types.
//!
//! The report is printed as text by default and serialized as-is for
//! `--output json`.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::cache::{CacheStatus, CacheSummary};

/// The result of auditing a dataset root.
#[derive(Clone, Debug, Serialize)]
pub struct AuditReport {
    pub root: PathBuf,
    /// How many samples of each list the text form shows.
    #[serde(skip)]
    pub limit: usize,
    pub splits: Vec<SplitAudit>,
}

impl AuditReport {
    /// Counts everything `--strict` treats as a failure: orphans, invalid
    /// lines and unreadable images.
    pub fn issue_count(&self) -> usize {
        self.splits.iter().map(SplitAudit::issue_count).sum()
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for split in &self.splits {
            split.write_text(f, self.limit)?;
        }
        Ok(())
    }
}

/// Findings for one split.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SplitAudit {
    pub name: String,
    pub image_count: usize,
    pub label_count: usize,
    /// Label file names with no image of the same stem.
    pub labels_without_image: Vec<String>,
    /// Image file names with no label of the same stem.
    pub images_without_label: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_issues: Option<Vec<FormatIssue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unreadable_images: Option<Vec<UnreadableImage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSummary>,
}

impl SplitAudit {
    pub fn issue_count(&self) -> usize {
        self.labels_without_image.len()
            + self.images_without_label.len()
            + self.format_issues.as_ref().map_or(0, Vec::len)
            + self.unreadable_images.as_ref().map_or(0, Vec::len)
    }

    fn write_text(&self, f: &mut fmt::Formatter<'_>, limit: usize) -> fmt::Result {
        writeln!(
            f,
            "{}: imgs={}, labels={}",
            self.name, self.image_count, self.label_count
        )?;

        if !self.labels_without_image.is_empty() {
            writeln!(
                f,
                "  labels without image: {} (e.g.: {:?})",
                self.labels_without_image.len(),
                sample(&self.labels_without_image, limit)
            )?;
        }
        if !self.images_without_label.is_empty() {
            writeln!(
                f,
                "  images without label: {} (e.g.: {:?})",
                self.images_without_label.len(),
                sample(&self.images_without_label, limit)
            )?;
        }

        if let Some(issues) = &self.format_issues {
            if issues.is_empty() {
                writeln!(f, "  format: ok")?;
            } else {
                writeln!(f, "  invalid lines: {}", issues.len())?;
                for issue in sample(issues, limit) {
                    writeln!(f, "    {issue}")?;
                }
            }
        }

        if let Some(images) = &self.unreadable_images {
            if !images.is_empty() {
                writeln!(f, "  unreadable images: {}", images.len())?;
                for image in sample(images, limit) {
                    writeln!(f, "    {}: {}", image.file, image.message)?;
                }
            }
        }

        if let Some(cache) = &self.cache {
            write_cache(f, cache, limit)?;
        }
        Ok(())
    }
}

fn sample<T>(items: &[T], limit: usize) -> &[T] {
    &items[..items.len().min(limit)]
}

fn opt_count(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn write_cache(f: &mut fmt::Formatter<'_>, cache: &CacheSummary, limit: usize) -> fmt::Result {
    match &cache.status {
        CacheStatus::NotFound => writeln!(f, "  cache {}: not found", cache.file),
        CacheStatus::Unreadable { message } => {
            writeln!(f, "  cache {}: error reading ({message})", cache.file)
        }
        CacheStatus::Loaded(contents) => {
            writeln!(
                f,
                "  cache {}: nf={}, nl={}, msgs={}",
                cache.file,
                opt_count(contents.nf),
                opt_count(contents.nl),
                contents.msgs.len()
            )?;
            if contents.version.is_some() || contents.label_records.is_some() {
                writeln!(
                    f,
                    "    version={}, label records={}",
                    contents.version.as_deref().unwrap_or("-"),
                    contents
                        .label_records
                        .map_or_else(|| "-".to_string(), |n| n.to_string())
                )?;
            }
            if let Some(r) = &contents.results {
                writeln!(
                    f,
                    "    results: found={}, missing={}, empty={}, corrupt={}, total={}",
                    r.found, r.missing, r.empty, r.corrupt, r.total
                )?;
            }
            if !contents.msgs.is_empty() {
                writeln!(f, "    msgs: {:?}", sample(&contents.msgs, limit))?;
            }
            Ok(())
        }
    }
}

/// Why a label line failed the format check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatIssueKind {
    /// Token count differs from the expected field count.
    FieldCount,
    /// First token is not a non-negative integer.
    ClassIndex,
    NotNumeric,
    NotFinite,
    OutOfRange,
    /// The file could not be read as UTF-8 text.
    Unreadable,
}

impl fmt::Display for FormatIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatIssueKind::FieldCount => "field-count",
            FormatIssueKind::ClassIndex => "class",
            FormatIssueKind::NotNumeric => "numeric",
            FormatIssueKind::NotFinite => "finite",
            FormatIssueKind::OutOfRange => "range",
            FormatIssueKind::Unreadable => "unreadable",
        };
        f.write_str(name)
    }
}

/// One invalid label line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormatIssue {
    pub file: String,
    /// 1-based; 0 when the whole file is affected.
    pub line: usize,
    pub kind: FormatIssueKind,
    pub detail: String,
    pub text: String,
}

impl fmt::Display for FormatIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}] {}: {}",
            self.file, self.line, self.kind, self.detail, self.text
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnreadableImage {
    pub file: String,
    pub message: String,
}
