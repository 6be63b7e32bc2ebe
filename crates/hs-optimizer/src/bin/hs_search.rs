use anyhow::Context;
use hs_optimizer::SearchJob;
use hs_slave::builtin_registry;
use tracing_subscriber::EnvFilter;

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    enable_tracing();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HYPERSWEEP_JOB").ok())
        .context("usage: hs-search <job.json> (or set HYPERSWEEP_JOB)")?;

    let job = SearchJob::from_json_file(&path)
        .with_context(|| format!("loading search job {path}"))?;
    let mut settings = job.settings()?;
    let registry = builtin_registry()?;

    let outcome = job.run(&mut settings, &registry).await?;

    for report in &outcome.reports {
        eprint!("{report}");
    }
    eprintln!("{}", outcome.summary);
    println!("{}", outcome.best);
    Ok(())
}
