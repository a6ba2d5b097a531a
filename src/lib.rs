//! Orilabel: an oriented bounding box annotation engine.
//!
//! Orilabel keeps the labeled state of an image dataset — rotated boxes,
//! classes, provenance, train/val/test splits — and the machinery around it:
//! undo/redo, interactive edit gestures, model-assisted pre-labeling,
//! autosave with crash recovery, and interchange with the common
//! oriented-box dataset formats.
//!
//! # Modules
//!
//! - [`geometry`]: Rotated boxes, handle hit-testing, rotated IoU
//! - [`model`]: Annotations, classes, images, splits
//! - [`store`]: The annotation store with undo/redo history
//! - [`editor`]: Pointer/keyboard edit state machine
//! - [`autolabel`]: Detector proposals and background auto-labeling
//! - [`dataset`]: Split assignment, autosave, backups, crash recovery
//! - [`project`]: Project file persistence
//! - [`codec`]: YOLO-OBB, COCO and Pascal VOC import/export
//! - [`error`]: Error types for orilabel operations

pub mod autolabel;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod model;
pub mod project;
pub mod store;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use error::OrilabelError;

/// The orilabel CLI application.
#[derive(Parser)]
#[command(name = "orilabel")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print a summary of a project file.
    Info(InfoArgs),
    /// Export a project as a dataset in another format.
    Export(ExportArgs),
    /// Import a dataset into a new project file.
    Import(ImportArgs),
    /// Assign train/val/test splits deterministically.
    Split(SplitArgs),
}

/// Arguments for the info subcommand.
#[derive(clap::Args)]
struct InfoArgs {
    /// Project file to inspect.
    project: PathBuf,
}

/// Arguments for the export subcommand.
#[derive(clap::Args)]
struct ExportArgs {
    /// Project file to export from.
    project: PathBuf,

    /// Output format ('yolo-obb', 'coco', or 'voc').
    #[arg(long)]
    format: String,

    /// Directory to write the dataset into.
    #[arg(long)]
    out: PathBuf,
}

/// Arguments for the import subcommand.
#[derive(clap::Args)]
struct ImportArgs {
    /// Dataset directory to read.
    input: PathBuf,

    /// Input format ('yolo-obb', 'coco', or 'voc').
    #[arg(long)]
    format: String,

    /// Project file to create.
    #[arg(long)]
    out: PathBuf,

    /// Name of the new project.
    #[arg(long, default_value = "imported")]
    name: String,
}

/// Arguments for the split subcommand.
#[derive(clap::Args)]
struct SplitArgs {
    /// Project file to update in place.
    project: PathBuf,

    /// Train fraction.
    #[arg(long, default_value_t = 0.7)]
    train: f64,

    /// Validation fraction.
    #[arg(long, default_value_t = 0.2)]
    val: f64,

    /// Test fraction.
    #[arg(long, default_value_t = 0.1)]
    test: f64,

    /// Shuffle seed; the same seed reproduces the same split.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Run the orilabel CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), OrilabelError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Info(args)) => run_info(args),
        Some(Commands::Export(args)) => run_export(args),
        Some(Commands::Import(args)) => run_import(args),
        Some(Commands::Split(args)) => run_split(args),
        None => {
            println!("orilabel {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("An oriented bounding box annotation engine.");
            println!();
            println!("Run 'orilabel --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the info subcommand.
fn run_info(args: InfoArgs) -> Result<(), OrilabelError> {
    let loaded = project::load(&args.project, &config::EngineConfig::default())?;
    let store = &loaded.store;

    let mut annotations = 0;
    let mut per_split = [0usize; 4];
    for key in store.image_keys() {
        annotations += store.annotation_count(&key)?;
        let slot = match store.split_of(&key) {
            model::Split::Train => 0,
            model::Split::Val => 1,
            model::Split::Test => 2,
            model::Split::Unassigned => 3,
        };
        per_split[slot] += 1;
    }

    println!("project: {}", loaded.name);
    println!("classes: {}", store.classes().names().join(", "));
    println!("images: {}", store.image_count());
    println!("annotations: {}", annotations);
    println!(
        "splits: {} train / {} val / {} test / {} unassigned",
        per_split[0], per_split[1], per_split[2], per_split[3]
    );
    if !loaded.report.is_clean() {
        println!(
            "warning: skipped {} image record(s), {} annotation(s) while loading",
            loaded.report.skipped_images, loaded.report.skipped_annotations
        );
    }
    Ok(())
}

/// Execute the export subcommand.
fn run_export(args: ExportArgs) -> Result<(), OrilabelError> {
    let format: codec::ExportFormat = args.format.parse()?;
    let loaded = project::load(&args.project, &config::EngineConfig::default())?;
    let summary = codec::export_dataset(&loaded.store, format, &args.out)?;
    println!(
        "exported {} image(s), {} annotation(s) to {}",
        summary.images,
        summary.annotations,
        args.out.display()
    );
    Ok(())
}

/// Execute the import subcommand.
fn run_import(args: ImportArgs) -> Result<(), OrilabelError> {
    let format: codec::ImportFormat = args.format.parse()?;
    let engine_config = config::EngineConfig::default();
    let (store, report) = codec::import_dataset(format, &args.input, &engine_config)?;
    project::save(&args.out, &args.name, &store)?;

    println!(
        "imported {} image(s), {} annotation(s) into {}",
        report.images,
        report.annotations,
        args.out.display()
    );
    if !report.skipped.is_empty() {
        println!("skipped {} malformed record(s):", report.skipped.len());
        for issue in &report.skipped {
            match issue.line {
                Some(line) => println!("  {}:{}: {}", issue.path.display(), line, issue.message),
                None => println!("  {}: {}", issue.path.display(), issue.message),
            }
        }
    }
    if report.lossy_rotation > 0 {
        println!(
            "note: {} annotation(s) had no rotation information and were imported axis-aligned",
            report.lossy_rotation
        );
    }
    Ok(())
}

/// Execute the split subcommand.
fn run_split(args: SplitArgs) -> Result<(), OrilabelError> {
    let ratios = config::SplitRatios {
        train: args.train,
        val: args.val,
        test: args.test,
    };
    let engine_config = config::EngineConfig {
        split_ratios: ratios,
        split_seed: args.seed,
        ..config::EngineConfig::default()
    };
    engine_config.validate()?;

    let loaded = project::load(&args.project, &engine_config)?;
    let mut store = loaded.store;
    let summary = dataset::assign_split(&mut store, &ratios, args.seed)?;
    project::save(&args.project, &loaded.name, &store)?;

    println!(
        "assigned {} train / {} val / {} test over {} image(s)",
        summary.train,
        summary.val,
        summary.test,
        store.image_count()
    );
    Ok(())
}
