use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use anyhow::Context;
use clap::Parser;
use log::info;
use plantdoc::{AssetConfig, DetectionService, RuntimeConfig};

#[derive(Parser)]
#[command(author, version, about = "Diagnose a crop leaf photo", long_about = None)]
struct Args {
    /// Leaf photo to analyze (any format the image crate can decode)
    image: PathBuf,

    /// Directory holding hub_model.onnx and class_indices.json
    #[arg(short, long)]
    assets: Option<PathBuf>,

    /// Expected SHA-256 of the model file
    #[arg(long)]
    model_sha256: Option<String>,

    /// Language code for the result (only "en" is available without a translator)
    #[arg(short, long, default_value = "en")]
    language: String,

    /// Number of runner-up classes to print
    #[arg(short, long, default_value_t = 3)]
    top: usize,

    /// Threads used inside a single operator (0 lets ONNX Runtime decide)
    #[arg(long, default_value_t = 0)]
    intra_threads: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    plantdoc::init_logger();
    let args = Args::parse();

    info!("=== Starting Leaf Disease Detection ===");

    let mut assets = match &args.assets {
        Some(dir) => AssetConfig::new(dir),
        None => AssetConfig::default(),
    };
    if let Some(hash) = &args.model_sha256 {
        assets = assets.with_model_sha256(hash);
    }

    let runtime_config = RuntimeConfig {
        intra_threads: args.intra_threads,
        ..RuntimeConfig::default()
    };

    let service = DetectionService::builder()
        .with_assets(assets)
        .with_runtime_config(runtime_config)
        .build()?;

    let start_time = Instant::now();
    let ready = service
        .initialize()
        .await
        .context("Failed to load the bundled model and catalog")?;
    info!(
        "Detector ready in {:.2?} ({} classes, {} catalog entries)",
        start_time.elapsed(),
        ready.num_classes,
        ready.catalog_entries
    );

    let image = image::open(&args.image)
        .with_context(|| format!("Failed to open image {:?}", args.image))?;
    info!("Analyzing {:?} ({}x{})", args.image, image.width(), image.height());

    if args.language != plantdoc::translation::BASE_LANGUAGE {
        log::warn!(
            "No translator is available from the command line; showing '{}' results in English",
            args.language
        );
    }

    let analyze_start = Instant::now();
    let (result, ranked) = service.analyze_ranked(Arc::new(image), args.top).await?;
    info!("Analysis took {:.2?}", analyze_start.elapsed());

    println!("\nDiagnosis: {}", result.disease_name);
    println!("Confidence: {:.1}%", result.confidence * 100.0);
    println!("Treatment: {}", result.treatment);

    if ranked.len() > 1 {
        println!("\nTop {} classes:", ranked.len());
        for (i, (index, name, score)) in ranked.iter().enumerate() {
            println!("  {}. {} (class {}) - {:.1}%", i + 1, name, index, score * 100.0);
        }
    }

    service.shutdown();
    Ok(())
}
