use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hamrs::config::{self, Config};
use hamrs::evaluate::{self, EvalOptions};
use hamrs::store::{FaceRecord, GalleryStore};
use hamrs::{Classifier, DistanceMode, FeatureVector, Vectorizer};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "hamrs")]
#[command(version, about = "Closed-set face identification with binary image patterns")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gallery file (overrides the config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a labelled photo into the gallery
    Enroll {
        label: String,
        image: PathBuf,
        /// Save intermediate images into this directory
        #[arg(long)]
        dump_stages: Option<PathBuf>,
    },
    /// Identify the person in a photo
    Recognize {
        image: PathBuf,
        /// Override the configured threshold
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Override the configured distance mode
        #[arg(short, long, value_enum)]
        mode: Option<DistanceMode>,
        /// Save intermediate images into this directory
        #[arg(long)]
        dump_stages: Option<PathBuf>,
    },
    /// Leave-one-out accuracy sweep over a directory of <label>-<n> images
    Evaluate {
        dir: PathBuf,
        /// Images per person; one fold per image number
        #[arg(short, long, default_value_t = 5)]
        per_person: u32,
        #[arg(short, long, value_enum)]
        mode: Option<DistanceMode>,
        /// Write the full report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// List enrolled labels
    List,
    /// Remove a label from the gallery, or everything when no label is given
    Purge { label: Option<String> },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let mut cfg = config::load_config(config_path)?;
    if let Some(store) = cli.store {
        cfg.store = Some(store);
    }
    let store = GalleryStore::open(cfg.store_path());

    match cli.command {
        Commands::Enroll {
            label,
            image,
            dump_stages,
        } => enroll(&cfg, &store, &label, &image, dump_stages.as_deref()),
        Commands::Recognize {
            image,
            threshold,
            mode,
            dump_stages,
        } => {
            cfg.threshold = threshold.unwrap_or(cfg.threshold);
            cfg.mode = mode.unwrap_or(cfg.mode);
            recognize(&cfg, &store, &image, dump_stages.as_deref())
        }
        Commands::Evaluate {
            dir,
            per_person,
            mode,
            report,
        } => {
            let opts = EvalOptions {
                per_person,
                mode: mode.unwrap_or(cfg.mode),
                ..EvalOptions::default()
            };
            run_evaluation(&cfg, &dir, &opts, report.as_deref())
        }
        Commands::List => list(&store),
        Commands::Purge { label } => purge(&store, label.as_deref()),
        Commands::Config => open_config(&cfg, config_path),
    }
}

fn vectorize(vectorizer: &Vectorizer, image: &Path, dump_stages: Option<&Path>) -> Result<FeatureVector> {
    let Some(dir) = dump_stages else {
        return vectorizer
            .vectorize_path(image)
            .with_context(|| format!("vectorizing {}", image.display()));
    };

    let img = hamrs_vision::vectorize::open_image(image)?;
    let (vector, stages) = vectorizer.vectorize_with_stages(&img);
    let prefix = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    for path in stages.save(dir, &prefix)? {
        info!("Saved stage: {}", path.display());
    }
    Ok(vector)
}

fn enroll(
    cfg: &Config,
    store: &GalleryStore,
    label: &str,
    image: &Path,
    dump_stages: Option<&Path>,
) -> Result<()> {
    info!("Enrolling '{}' from {}", label, image.display());

    let vectorizer = cfg.vectorizer()?;
    let vector = vectorize(&vectorizer, image, dump_stages)?;
    let record = FaceRecord::new(label, &vectorizer, &vector)?;

    store.insert(record).context("Failed to save face record")?;

    info!("✓ '{}' enrolled ({} foreground pixels)", label, vector.ones());
    Ok(())
}

fn recognize(cfg: &Config, store: &GalleryStore, image: &Path, dump_stages: Option<&Path>) -> Result<()> {
    let vectorizer = cfg.vectorizer()?;
    let gallery = store.load_gallery(&vectorizer).context("Failed to load gallery")?;

    if gallery.is_empty() {
        anyhow::bail!("No enrolled faces in {}. Run 'enroll' first.", store.path().display());
    }

    info!("Found {} enrolled face(s)", gallery.len());

    let classifier = Classifier::new(&gallery, cfg.threshold, cfg.mode)?;
    let vector = vectorize(&vectorizer, image, dump_stages)?;
    let result = classifier.classify(&vector).with_context(|| {
        format!(
            "gallery vectors have length {}; check width/height in the config",
            classifier.dimension()
        )
    })?;

    let closest = result.best_index.and_then(|i| classifier.label_at(i));
    match (result.is_unknown(), closest) {
        (false, _) => info!(
            "✓ Recognized '{}' (distance={:.4}, threshold={:.4})",
            result.label(),
            result.distance,
            cfg.threshold
        ),
        (true, Some(closest)) => warn!(
            "Unknown person. Closest match '{}' at distance {:.4} exceeds threshold {:.4}",
            closest, result.distance, cfg.threshold
        ),
        (true, None) => warn!("Unknown person. Blank image, nothing to compare"),
    }
    Ok(())
}

fn run_evaluation(cfg: &Config, dir: &Path, opts: &EvalOptions, report_path: Option<&Path>) -> Result<()> {
    let samples = evaluate::discover(dir)?;
    if samples.is_empty() {
        anyhow::bail!("No images found in {}", dir.display());
    }
    info!("Found {} image(s) in {}", samples.len(), dir.display());

    let report = evaluate::evaluate(&samples, &cfg.vectorizer()?, opts)?;

    info!(
        "{} probes scored at {} thresholds ({} skipped)",
        report.probes,
        report.thresholds.len(),
        report.skipped
    );
    info!(
        "Overall: success {:.1}%, wrong person {:.1}%, unknown {:.1}%",
        report.totals.success_rate(),
        report.totals.wrong_rate(),
        report.totals.unknown_rate()
    );
    if let Some(best) = report.best_threshold() {
        info!(
            "Best threshold {:.2}: success {:.1}%, wrong person {:.1}%, unknown {:.1}%",
            best.threshold, best.success_rate, best.wrong_rate, best.unknown_rate
        );
    }

    if let Some(path) = report_path {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("writing report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

fn list(store: &GalleryStore) -> Result<()> {
    let records = store.load_records().context("Failed to load gallery")?;
    if records.is_empty() {
        info!("Gallery {} is empty", store.path().display());
        return Ok(());
    }

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for record in &records {
        match counts.iter_mut().find(|(label, _)| *label == record.label) {
            Some((_, n)) => *n += 1,
            None => counts.push((record.label.as_str(), 1)),
        }
    }
    for (label, n) in counts {
        println!("{}\t{}", label, n);
    }
    Ok(())
}

fn purge(store: &GalleryStore, label: Option<&str>) -> Result<()> {
    match label {
        Some(label) => {
            let removed = store.remove_label(label).context("Failed to purge face records")?;
            info!("✓ Removed {} record(s) for '{}'", removed, label);
        }
        None => {
            store.clear().context("Failed to clear gallery")?;
            info!("✓ Gallery cleared");
        }
    }
    Ok(())
}

fn open_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(cfg, Some(config_path))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
