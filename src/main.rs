use clap::{Parser, ValueEnum};
use docuscan::{DetectorConfig, DocScanner};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docuscan")]
#[command(about = "DocuScan - document detection and perspective rectification", long_about = None)]
struct Cli {
    /// Input image path
    image: PathBuf,

    /// Path to segmentation model (ONNX); omit to use edge detection only
    #[arg(long)]
    model: Option<PathBuf>,

    /// Write the rectified document image to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format for the detected boundary
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// JSON output with full details
    Json,
    /// Plain text, one corner per line
    Text,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docuscan=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.model {
        Some(model) => DetectorConfig::with_model(model),
        None => DetectorConfig::default(),
    };
    let mut scanner = DocScanner::new(config);

    let result = scanner.capture_file(&cli.image)?;

    match cli.format {
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "detected": result.detected,
                "effective": result.effective,
                "rectifiedWidth": result.rectified.width(),
                "rectifiedHeight": result.rectified.height(),
            });
            println!("{}", serde_json::to_string_pretty(&json_output)?);
        }
        OutputFormat::Text => {
            match &result.detected {
                Some(_) => println!("document detected"),
                None => println!("no document detected, default crop applied"),
            }
            for (name, p) in ["top-left", "top-right", "bottom-right", "bottom-left"]
                .iter()
                .zip(result.effective.points())
            {
                println!("{name}\t{:.1},{:.1}", p.x, p.y);
            }
        }
    }

    if let Some(output) = cli.output {
        result.rectified.save(&output)?;
    }

    Ok(())
}
