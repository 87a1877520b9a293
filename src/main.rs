use anyhow::Context;
use clap::Parser;
use garden_sun::Config;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Inputs {
    /// Path to the JSON option file
    #[arg(short, long, default_value = "input/options.json")]
    optionfile: PathBuf,
    /// Overrides the mode of the option file
    #[arg(short, long)]
    mode: Option<String>,
    /// Overrides nrOfThreads of the option file
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Inputs::parse();

    log::info!("Using optionfile: {}", args.optionfile.display());
    let mut config = Config::from_file(&args.optionfile)
        .with_context(|| format!("Failed to read {}", args.optionfile.display()))?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(threads) = args.threads {
        config.nr_of_threads = threads;
    }

    let start = Instant::now();
    let summary = garden_sun::run(&config, !args.no_progress).context("Shadow calculation failed")?;

    log::info!("Garden sun calculator is done");
    log::info!(
        "{} of {} results written ({} skipped) in {}s",
        summary.written,
        summary.buckets,
        summary.skipped,
        start.elapsed().as_secs()
    );
    log::info!("Results can be found in: {}", config.output_path.display());
    Ok(())
}
