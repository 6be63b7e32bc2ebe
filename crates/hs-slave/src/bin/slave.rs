use anyhow::Context;
use hs_slave::{builtin_registry, report, run_slave, SlaveArgs};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // stdout carries the result line, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = SlaveArgs::parse(&raw)?;
    let registry = builtin_registry()?;

    // Any error exits non-zero before a result line is written.
    let objective = run_slave(&registry, &args)?;
    report(objective, args.out_file.as_deref()).context("writing result")?;
    Ok(())
}
