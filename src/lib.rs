//! obbkit: YOLO oriented-box dataset tools and a detection server.
//!
//! The dataset commands work directly on YOLO label text files and the
//! `images/<split>` / `labels/<split>` layout; the server wraps a detection
//! model behind a small HTTP API.
//!
//! # Modules
//!
//! - [`geom`]: Coordinates, axis-aligned boxes and oriented boxes
//! - [`label`]: Label file discovery and the label rewriting commands
//! - [`audit`]: Read-only dataset audit, including the trainer's label cache
//! - [`split`]: Seeded train/val/test split
//! - [`sync`]: Copy missing source files into an existing split dataset
//! - `serve`: HTTP detection service (feature `serve`)
//! - [`error`]: Error types for obbkit operations

pub mod audit;
pub mod error;
pub mod geom;
pub mod label;
#[cfg(feature = "serve")]
pub mod serve;
pub mod split;
pub mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub use error::ObbkitError;

use crate::geom::{AngleUnit, CornerOrder};
use crate::label::{bbox_to_poly, normalize, obb_to_poly};

/// The obbkit CLI application.
#[derive(Parser)]
#[command(name = "obbkit")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Count images and labels per split and report mismatches.
    Audit(AuditArgs),
    /// Force one class index and drop the angle from label files, in place.
    Normalize(NormalizeArgs),
    /// Rewrite oriented-box labels as four-corner polygons, in place.
    ObbToPoly(ObbToPolyArgs),
    /// Convert axis-aligned boxes to polygons into a `converted/` folder.
    BboxToPoly(BboxToPolyArgs),
    /// Split paired images and labels into train/val/test folders.
    Split(SplitArgs),
    /// Copy source images and labels missing from a split dataset.
    Sync(SyncArgs),
    /// Run the HTTP detection service.
    #[cfg(feature = "serve")]
    Serve(ServeArgs),
}

/// Report output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Arguments for the audit subcommand.
#[derive(clap::Args)]
struct AuditArgs {
    /// Dataset root containing images/ and labels/.
    #[arg(long, default_value = "datasets")]
    root: PathBuf,

    /// Comma-separated splits to inspect.
    #[arg(long, value_delimiter = ',', default_value = "train,val,test")]
    splits: Vec<String>,

    /// Number of examples shown per list.
    #[arg(long, default_value_t = 5)]
    limit: usize,

    /// Validate every label line.
    #[arg(long)]
    check_format: bool,

    /// Expected tokens per label line (6 = cls x y w h angle, 9 = polygon).
    #[arg(long, default_value_t = audit::DEFAULT_FIELDS)]
    fields: usize,

    /// Read labels/<split>.cache written by the trainer.
    #[arg(long)]
    inspect_cache: bool,

    /// Read each image header and report unreadable images.
    #[arg(long)]
    check_images: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,

    /// Exit non-zero if any issue is reported.
    #[arg(long)]
    strict: bool,
}

/// Arguments for the normalize subcommand.
#[derive(clap::Args)]
struct NormalizeArgs {
    /// Folder with .txt label files (searched recursively).
    #[arg(long, default_value = "motos_box/yolo_obb_dataset/labels")]
    labels_dir: PathBuf,

    /// Class token written at the start of every line.
    #[arg(long, default_value = "0")]
    class_id: String,

    /// Show which files would change without writing.
    #[arg(long)]
    dry_run: bool,
}

/// Arguments for the obb-to-poly subcommand.
#[derive(clap::Args)]
struct ObbToPolyArgs {
    /// Folder with .txt label files (searched recursively).
    #[arg(long, default_value = "motos_box/box_motos")]
    labels_dir: PathBuf,

    /// Unit of the stored angles.
    #[arg(long, value_enum, default_value_t = AngleUnit::Radians)]
    angle_format: AngleUnit,

    /// Angle used when a line has no sixth field, in --angle-format units.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    default_angle: f64,

    /// Layout of the eight corner values.
    #[arg(long, value_enum, default_value_t = CornerOrder::Grouped)]
    output_order: CornerOrder,

    /// Show which files would change without writing.
    #[arg(long)]
    dry_run: bool,
}

/// Arguments for the bbox-to-poly subcommand.
#[derive(clap::Args)]
struct BboxToPolyArgs {
    /// Folder with .txt label files (top level only).
    #[arg(long, default_value = "box_motos")]
    labels_dir: PathBuf,

    /// Number of skipped lines listed in the summary.
    #[arg(long, default_value_t = 5)]
    limit: usize,
}

/// Arguments for the split subcommand.
#[derive(clap::Args)]
struct SplitArgs {
    /// Base folder holding imgs_com_box/box_motos or images/labels.
    #[arg(long, default_value = "motos_box")]
    base_dir: PathBuf,

    /// Destination (default: <base-dir>/yolo_obb_dataset).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Explicit image folder (used together with --label-dir).
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Explicit label folder (used together with --image-dir).
    #[arg(long)]
    label_dir: Option<PathBuf>,

    /// Fractions for train, val and test; must sum to 1.
    #[arg(
        long,
        num_args = 3,
        value_names = ["TRAIN", "VAL", "TEST"],
        default_values_t = split::DEFAULT_RATIOS,
        allow_negative_numbers = true
    )]
    split_ratios: Vec<f64>,

    /// Seed for the shuffle before splitting.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Arguments for the sync subcommand.
#[derive(clap::Args)]
struct SyncArgs {
    /// Flat folder of source images.
    #[arg(long, default_value = "motos_box/imgs_com_box")]
    source_images: PathBuf,

    /// Flat folder of source labels.
    #[arg(long, default_value = "motos_box/box_motos")]
    source_labels: PathBuf,

    /// Split dataset root with images/ and labels/.
    #[arg(long, default_value = "motos_box/yolo_obb_dataset")]
    target: PathBuf,

    /// Split for stems the target does not contain yet.
    #[arg(long, value_enum, default_value_t = sync::Split::Train)]
    default_split: sync::Split,

    /// Angle written as the sixth field of every label line.
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    angle: String,

    /// Class token written at the start of every label line.
    #[arg(long, default_value = "0")]
    class_id: String,

    /// List planned copies without writing.
    #[arg(long)]
    dry_run: bool,
}

/// Arguments for the serve subcommand.
#[cfg(feature = "serve")]
#[derive(clap::Args)]
struct ServeArgs {
    /// ONNX export of the detection model.
    #[arg(long, env = "MODEL_PATH", default_value = serve::DEFAULT_MODEL_PATH)]
    model_path: PathBuf,

    #[arg(long, env = "OBBKIT_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "OBBKIT_PORT", default_value_t = 8000)]
    port: u16,

    /// Folder served at /static; its index.html is served at /.
    #[arg(long, default_value = "api/static")]
    static_dir: PathBuf,

    /// Square model input size in pixels.
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(32..))]
    image_size: u32,

    /// Minimum detection score.
    #[arg(long, default_value_t = 0.25)]
    confidence: f32,

    /// IoU threshold for non-maximum suppression.
    #[arg(long, default_value_t = 0.7)]
    iou: f32,

    /// Maximum upload size in MiB.
    #[arg(long, default_value_t = 20)]
    max_upload_mb: usize,
}

/// Run the obbkit CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), ObbkitError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Audit(args)) => run_audit(args),
        Some(Commands::Normalize(args)) => run_normalize(args),
        Some(Commands::ObbToPoly(args)) => run_obb_to_poly(args),
        Some(Commands::BboxToPoly(args)) => run_bbox_to_poly(args),
        Some(Commands::Split(args)) => run_split(args),
        Some(Commands::Sync(args)) => run_sync(args),
        #[cfg(feature = "serve")]
        Some(Commands::Serve(args)) => run_serve(args),
        None => {
            println!("obbkit {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("YOLO oriented-box dataset tools and a detection server.");
            println!();
            println!("Run 'obbkit --help' for usage information.");
            Ok(())
        }
    }
}

fn run_audit(args: AuditArgs) -> Result<(), ObbkitError> {
    let splits: Vec<String> = args
        .splits
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let opts = audit::AuditOptions {
        splits,
        limit: args.limit,
        check_format: args.check_format,
        expected_fields: args.fields,
        inspect_cache: args.inspect_cache,
        check_images: args.check_images,
    };
    let report = audit::audit_dataset(&args.root, &opts)?;

    match args.output {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print!("{report}"),
    }

    let issue_count = report.issue_count();
    if args.strict && issue_count > 0 {
        return Err(ObbkitError::AuditFailed { issue_count });
    }
    Ok(())
}

fn run_normalize(args: NormalizeArgs) -> Result<(), ObbkitError> {
    let opts = normalize::NormalizeOptions {
        class_id: args.class_id,
        dry_run: args.dry_run,
    };
    let report = normalize::normalize_labels(&args.labels_dir, &opts)?;
    print!("{report}");
    Ok(())
}

fn run_obb_to_poly(args: ObbToPolyArgs) -> Result<(), ObbkitError> {
    let opts = obb_to_poly::ObbToPolyOptions {
        angle_unit: args.angle_format,
        default_angle: args.default_angle,
        order: args.output_order,
        dry_run: args.dry_run,
    };
    let report = obb_to_poly::convert_labels(&args.labels_dir, &opts)?;
    print!("{report}");
    Ok(())
}

fn run_bbox_to_poly(args: BboxToPolyArgs) -> Result<(), ObbkitError> {
    let report = bbox_to_poly::convert_labels(&args.labels_dir, args.limit)?;
    print!("{report}");
    Ok(())
}

fn run_split(args: SplitArgs) -> Result<(), ObbkitError> {
    let opts = split::SplitOptions {
        base_dir: args.base_dir,
        output_dir: args.output_dir,
        image_dir: args.image_dir,
        label_dir: args.label_dir,
        ratios: args.split_ratios,
        seed: args.seed,
    };
    let report = split::split_dataset(&opts)?;
    print!("{report}");
    Ok(())
}

fn run_sync(args: SyncArgs) -> Result<(), ObbkitError> {
    let opts = sync::SyncOptions {
        source_images: args.source_images,
        source_labels: args.source_labels,
        target: args.target,
        default_split: args.default_split,
        angle: args.angle,
        class_id: args.class_id,
        dry_run: args.dry_run,
    };
    let report = sync::sync_dataset(&opts)?;
    print!("{report}");
    Ok(())
}

#[cfg(feature = "serve")]
fn run_serve(args: ServeArgs) -> Result<(), ObbkitError> {
    let config = serve::ServeConfig {
        host: args.host,
        port: args.port,
        model_path: args.model_path,
        static_dir: args.static_dir,
        params: serve::DetectorParams {
            image_size: args.image_size,
            confidence: args.confidence,
            iou: args.iou,
            ..Default::default()
        },
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve::serve(config))
}
