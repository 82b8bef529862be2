//! Copies images and labels that exist in the flat source folders but not
//! yet in the split dataset, placing each stem in the split where its
//! counterpart already lives.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::debug;

use crate::error::ObbkitError;
use crate::label::{
    collect_files_with_extensions, file_name, file_stem, require_dir, Depth, LabelText,
    IMAGE_EXTENSIONS, LABEL_EXTENSION,
};

/// Dataset split a file belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Split {
    #[default]
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image or label side of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Label,
}

impl FileKind {
    fn dir_name(self) -> &'static str {
        match self {
            FileKind::Image => "images",
            FileKind::Label => "labels",
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            FileKind::Image => &IMAGE_EXTENSIONS,
            FileKind::Label => &[LABEL_EXTENSION],
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileKind::Image => "image",
            FileKind::Label => "label",
        })
    }
}

/// Options for [`sync_dataset`].
#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub source_images: PathBuf,
    pub source_labels: PathBuf,
    pub target: PathBuf,
    /// Split for stems the target does not know yet.
    pub default_split: Split,
    /// Angle token written verbatim as the sixth field.
    pub angle: String,
    pub class_id: String,
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            source_images: PathBuf::from("motos_box/imgs_com_box"),
            source_labels: PathBuf::from("motos_box/box_motos"),
            target: PathBuf::from("motos_box/yolo_obb_dataset"),
            default_split: Split::Train,
            angle: "0.0".to_string(),
            class_id: "0".to_string(),
            dry_run: false,
        }
    }
}

/// A copy performed (or planned in a dry run).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedCopy {
    pub kind: FileKind,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Outcome of a sync run.
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    pub dry_run: bool,
    pub copies: Vec<PlannedCopy>,
}

impl SyncReport {
    pub fn images_added(&self) -> usize {
        self.count(FileKind::Image)
    }

    pub fn labels_added(&self) -> usize {
        self.count(FileKind::Label)
    }

    fn count(&self, kind: FileKind) -> usize {
        self.copies.iter().filter(|c| c.kind == kind).count()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            for copy in &self.copies {
                writeln!(
                    f,
                    "[dry-run] copy {} {} -> {}",
                    copy.kind,
                    copy.source.display(),
                    copy.destination.display()
                )?;
            }
        }
        writeln!(f, "Images added: {}", self.images_added())?;
        writeln!(f, "Labels added: {}", self.labels_added())
    }
}

/// Rewrites a source label for the target dataset.
///
/// Blank lines are dropped and the class is forced. A five-field line gets
/// `angle` appended; longer lines have their sixth field replaced by it.
pub fn normalize_label(text: &str, class_id: &str, angle: &str) -> String {
    let source = LabelText::parse(text);
    let lines: Vec<String> = source
        .lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts: Vec<&str> = line.split_whitespace().collect();
            parts[0] = class_id;
            match parts.len() {
                5 => parts.push(angle),
                n if n >= 6 => parts[5] = angle,
                _ => {}
            }
            parts.join(" ")
        })
        .collect();
    LabelText::render(&lines, source.trailing_newline)
}

/// Maps each stem found under `<root>/<images|labels>/<split>` to its
/// split. Later splits win when a stem appears more than once.
pub fn map_stems_by_split(
    root: &Path,
    kind: FileKind,
) -> Result<BTreeMap<String, Split>, ObbkitError> {
    let mut mapping = BTreeMap::new();
    for split in Split::ALL {
        let dir = root.join(kind.dir_name()).join(split.as_str());
        if !dir.is_dir() {
            continue;
        }
        for path in collect_files_with_extensions(&dir, kind.extensions(), Depth::TopLevel)? {
            if let Some(stem) = file_stem(&path) {
                mapping.insert(stem, split);
            }
        }
    }
    Ok(mapping)
}

fn load_source(dir: &Path, kind: FileKind) -> Result<BTreeMap<String, PathBuf>, ObbkitError> {
    require_dir(dir)?;
    Ok(
        collect_files_with_extensions(dir, kind.extensions(), Depth::TopLevel)?
            .into_iter()
            .filter_map(|path| file_stem(&path).map(|stem| (stem, path)))
            .collect(),
    )
}

/// Copies every source stem missing from the target.
pub fn sync_dataset(opts: &SyncOptions) -> Result<SyncReport, ObbkitError> {
    let source_images = load_source(&opts.source_images, FileKind::Image)?;
    let source_labels = load_source(&opts.source_labels, FileKind::Label)?;
    let target_images = map_stems_by_split(&opts.target, FileKind::Image)?;
    let target_labels = map_stems_by_split(&opts.target, FileKind::Label)?;

    let stems: BTreeSet<&String> = source_images.keys().chain(source_labels.keys()).collect();
    let mut report = SyncReport {
        dry_run: opts.dry_run,
        copies: Vec::new(),
    };

    for stem in stems {
        let split = target_images
            .get(stem)
            .or_else(|| target_labels.get(stem))
            .copied()
            .unwrap_or(opts.default_split);

        if let (false, Some(source)) = (target_images.contains_key(stem), source_images.get(stem)) {
            let destination = destination_path(&opts.target, FileKind::Image, split, source);
            if !opts.dry_run {
                create_parent(&destination)?;
                fs::copy(source, &destination)?;
                debug!(dest = %destination.display(), "copied image");
            }
            report.copies.push(PlannedCopy {
                kind: FileKind::Image,
                source: source.clone(),
                destination,
            });
        }

        if let (false, Some(source)) = (target_labels.contains_key(stem), source_labels.get(stem)) {
            let destination = destination_path(&opts.target, FileKind::Label, split, source);
            if !opts.dry_run {
                let text = fs::read_to_string(source)?;
                create_parent(&destination)?;
                fs::write(&destination, normalize_label(&text, &opts.class_id, &opts.angle))?;
                debug!(dest = %destination.display(), "wrote label");
            }
            report.copies.push(PlannedCopy {
                kind: FileKind::Label,
                source: source.clone(),
                destination,
            });
        }
    }

    Ok(report)
}

fn destination_path(target: &Path, kind: FileKind, split: Split, source: &Path) -> PathBuf {
    target
        .join(kind.dir_name())
        .join(split.as_str())
        .join(file_name(source))
}

fn create_parent(path: &Path) -> Result<(), ObbkitError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
