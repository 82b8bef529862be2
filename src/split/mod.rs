//! Seeded train/val/test split of a flat image/label collection into the
//! YOLO layout `<output>/{images,labels}/{train,val,test}`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, warn};

use crate::error::ObbkitError;
use crate::label::{collect_files_with_extensions, file_name, file_stem, Depth, LABEL_EXTENSION};

/// Split names in output order.
pub const SPLIT_NAMES: [&str; 3] = ["train", "val", "test"];
/// Image extensions the splitter pairs (no `bmp`).
pub const SPLIT_IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const DEFAULT_RATIOS: [f64; 3] = [0.7, 0.2, 0.1];
/// Directory created under the base directory when no output is given.
pub const DEFAULT_OUTPUT_NAME: &str = "yolo_obb_dataset";

/// `(images, labels)` directory names probed under the base directory.
const CANDIDATE_DIRS: [(&str, &str); 2] = [("imgs_com_box", "box_motos"), ("images", "labels")];
const RATIO_TOLERANCE: f64 = 1e-6;
const UNPAIRED_SAMPLE: usize = 5;

/// An image and the label sharing its stem.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pair {
    pub stem: String,
    pub image: PathBuf,
    pub label: PathBuf,
}

/// Pairs found in the source directories plus the stems left unpaired.
#[derive(Clone, Debug, Default)]
pub struct PairScan {
    /// Sorted by stem.
    pub pairs: Vec<Pair>,
    pub labels_without_image: Vec<String>,
    pub images_without_label: Vec<String>,
}

/// Options for [`split_dataset`].
#[derive(Clone, Debug)]
pub struct SplitOptions {
    pub base_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub image_dir: Option<PathBuf>,
    pub label_dir: Option<PathBuf>,
    pub ratios: Vec<f64>,
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("motos_box"),
            output_dir: None,
            image_dir: None,
            label_dir: None,
            ratios: DEFAULT_RATIOS.to_vec(),
            seed: 42,
        }
    }
}

/// Outcome of a split run.
#[derive(Clone, Debug, Default)]
pub struct SplitReport {
    pub output_dir: PathBuf,
    /// Pair count per split, in [`SPLIT_NAMES`] order.
    pub counts: [usize; 3],
    pub labels_without_image: Vec<String>,
    pub images_without_label: Vec<String>,
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sample = |stems: &[String]| stems[..stems.len().min(UNPAIRED_SAMPLE)].to_vec();
        if !self.labels_without_image.is_empty() {
            writeln!(
                f,
                "Warning: {} labels lack images (examples: {:?})",
                self.labels_without_image.len(),
                sample(&self.labels_without_image)
            )?;
        }
        if !self.images_without_label.is_empty() {
            writeln!(
                f,
                "Warning: {} images lack labels (examples: {:?})",
                self.images_without_label.len(),
                sample(&self.images_without_label)
            )?;
        }
        for (name, count) in SPLIT_NAMES.iter().zip(self.counts) {
            writeln!(f, "{name}: copied {count} pairs.")?;
        }
        writeln!(f, "Finished. Output dataset at {}", self.output_dir.display())
    }
}

/// Picks the image and label directories: the explicit pair when both are
/// given, else the first candidate pair present under `base_dir`.
pub fn resolve_data_dirs(
    base_dir: &Path,
    image_dir: Option<&Path>,
    label_dir: Option<&Path>,
) -> Result<(PathBuf, PathBuf), ObbkitError> {
    if let (Some(images), Some(labels)) = (image_dir, label_dir) {
        return Ok((images.to_path_buf(), labels.to_path_buf()));
    }

    CANDIDATE_DIRS
        .iter()
        .map(|(images, labels)| (base_dir.join(images), base_dir.join(labels)))
        .find(|(images, labels)| images.is_dir() && labels.is_dir())
        .ok_or_else(|| ObbkitError::DataDirsNotFound {
            base: base_dir.to_path_buf(),
            message: "expected either (imgs_com_box, box_motos) or (images, labels), \
                      or pass --image-dir and --label-dir"
                .to_string(),
        })
}

fn stem_map(files: Vec<PathBuf>) -> BTreeMap<String, PathBuf> {
    files
        .into_iter()
        .filter_map(|path| file_stem(&path).map(|stem| (stem, path)))
        .collect()
}

/// Pairs images and labels found anywhere under the two directories.
pub fn gather_pairs(image_dir: &Path, label_dir: &Path) -> Result<PairScan, ObbkitError> {
    let images = stem_map(collect_files_with_extensions(
        image_dir,
        &SPLIT_IMAGE_EXTENSIONS,
        Depth::Recursive,
    )?);
    let mut labels = stem_map(collect_files_with_extensions(
        label_dir,
        &[LABEL_EXTENSION],
        Depth::Recursive,
    )?);

    let image_stems: BTreeSet<&String> = images.keys().collect();
    let label_stems: BTreeSet<&String> = labels.keys().collect();
    let labels_without_image: Vec<String> = label_stems
        .difference(&image_stems)
        .map(|s| s.to_string())
        .collect();
    let images_without_label: Vec<String> = image_stems
        .difference(&label_stems)
        .map(|s| s.to_string())
        .collect();

    let pairs: Vec<Pair> = images
        .into_iter()
        .filter_map(|(stem, image)| {
            labels.remove(&stem).map(|label| Pair { stem, image, label })
        })
        .collect();

    if pairs.is_empty() {
        return Err(ObbkitError::NoPairsFound {
            images_dir: image_dir.to_path_buf(),
            labels_dir: label_dir.to_path_buf(),
        });
    }
    if !labels_without_image.is_empty() || !images_without_label.is_empty() {
        warn!(
            labels_without_image = labels_without_image.len(),
            images_without_label = images_without_label.len(),
            "some files have no counterpart"
        );
    }

    Ok(PairScan {
        pairs,
        labels_without_image,
        images_without_label,
    })
}

/// Checks that there are three non-negative ratios summing to 1.
pub fn validate_ratios(ratios: &[f64]) -> Result<[f64; 3], ObbkitError> {
    let invalid = |message: String| ObbkitError::InvalidSplitRatios { message };

    let ratios: [f64; 3] = ratios
        .try_into()
        .map_err(|_| invalid(format!("expected 3 values, got {}", ratios.len())))?;
    if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) {
        return Err(invalid(format!("ratios must be non-negative, got {ratios:?}")));
    }
    let sum: f64 = ratios.iter().sum();
    if (sum - 1.0).abs() > RATIO_TOLERANCE {
        return Err(invalid(format!("ratios must sum to 1.0, got {ratios:?}")));
    }
    Ok(ratios)
}

/// End indices of the train and val slices: each split takes
/// `floor(total * ratio)` items and test takes the rest.
pub fn compute_split_indices(total: usize, ratios: &[f64; 3]) -> (usize, usize) {
    let take = |ratio: f64| ((total as f64) * ratio).floor() as usize;
    let train_end = take(ratios[0]).min(total);
    let val_end = (train_end + take(ratios[1])).min(total);
    (train_end, val_end)
}

/// Shuffles `pairs` with a seeded RNG and cuts them into train/val/test.
pub fn assign_splits(mut pairs: Vec<Pair>, ratios: &[f64; 3], seed: u64) -> [Vec<Pair>; 3] {
    let mut rng = StdRng::seed_from_u64(seed);
    pairs.shuffle(&mut rng);

    let (train_end, val_end) = compute_split_indices(pairs.len(), ratios);
    let test = pairs.split_off(val_end);
    let val = pairs.split_off(train_end);
    [pairs, val, test]
}

fn copy_into(source: &Path, dest_dir: &Path) -> Result<(), ObbkitError> {
    fs::copy(source, dest_dir.join(file_name(source)))?;
    Ok(())
}

/// Resolves sources, pairs, shuffles and copies into the output tree.
pub fn split_dataset(opts: &SplitOptions) -> Result<SplitReport, ObbkitError> {
    let ratios = validate_ratios(&opts.ratios)?;
    let (image_dir, label_dir) = resolve_data_dirs(
        &opts.base_dir,
        opts.image_dir.as_deref(),
        opts.label_dir.as_deref(),
    )?;
    let output_dir = opts
        .output_dir
        .clone()
        .unwrap_or_else(|| opts.base_dir.join(DEFAULT_OUTPUT_NAME));
    debug!(images = %image_dir.display(), labels = %label_dir.display(), "resolved source dirs");

    let scan = gather_pairs(&image_dir, &label_dir)?;
    let splits = assign_splits(scan.pairs, &ratios, opts.seed);

    let mut counts = [0; 3];
    for ((name, pairs), count) in SPLIT_NAMES.iter().zip(&splits).zip(&mut counts) {
        let images_out = output_dir.join("images").join(name);
        let labels_out = output_dir.join("labels").join(name);
        fs::create_dir_all(&images_out)?;
        fs::create_dir_all(&labels_out)?;

        for pair in pairs {
            copy_into(&pair.image, &images_out)?;
            copy_into(&pair.label, &labels_out)?;
        }
        *count = pairs.len();
    }

    Ok(SplitReport {
        output_dir,
        counts,
        labels_without_image: scan.labels_without_image,
        images_without_label: scan.images_without_label,
    })
}
