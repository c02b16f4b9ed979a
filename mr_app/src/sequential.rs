use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Run a MapReduce application in one process", long_about = None)]
struct Args {
    /// Application to run (wc, indexer)
    #[arg(short, long, default_value = "wc")]
    app: String,
    /// Output file
    #[arg(short, long, default_value = "mr-out-0")]
    output: PathBuf,
    /// Input splits
    #[arg(required = true)]
    files: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    mr::telemetry::init("mr=info,sequential=info");
    let args = Args::parse();

    let app = mr::apps::named(&args.app)?;
    let output = mr::sequential::run(&app, &args.files)?;
    std::fs::write(&args.output, output)
        .with_context(|| format!("cannot write {}", args.output.display()))?;
    tracing::info!("wrote {}", args.output.display());
    Ok(())
}
