//! # hs-slave
//!
//! The worker half of the master/slave protocol. A slave is started as
//!
//! ```text
//! hs-slave --className=<entry point> --classArgs=<escaped flags> [--outFile=<path>]
//! ```
//!
//! evaluates exactly one configuration and reports exactly one number, either
//! into `outFile` (batch queue) or as the last line of stdout (remote shell).

mod builtin;

pub use builtin::{builtin_registry, noisy_quadratic, quadratic, rosenbrock};

use hs_types::{Configuration, EntryPointRegistry, HsResult, Settings, SlaveError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decoded slave command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveArgs {
    pub class_name: String,
    pub class_args: Configuration,
    pub out_file: Option<PathBuf>,
}

impl SlaveArgs {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> HsResult<Self> {
        let mut settings = Settings::new();
        let class_name = settings.register("className", String::new())?;
        let class_args = settings.register("classArgs", String::new())?;
        let out_file = settings.register("outFile", String::new())?;
        settings.parse(args)?;

        let class_name = settings.get(&class_name)?;
        if class_name.is_empty() {
            return Err(SlaveError::MissingArgument {
                name: "className".to_string(),
            }
            .into());
        }
        let out_file = settings.get(&out_file)?;
        Ok(Self {
            class_name,
            class_args: Configuration::from_escaped(&settings.get(&class_args)?),
            out_file: (!out_file.is_empty()).then(|| PathBuf::from(out_file)),
        })
    }
}

/// Resolve and evaluate the requested entry point.
pub fn run_slave(registry: &EntryPointRegistry, args: &SlaveArgs) -> HsResult<f64> {
    let entry = registry.resolve(&args.class_name)?;
    debug!(
        entry_point = %args.class_name,
        args = %args.class_args,
        "evaluating"
    );
    let objective = entry
        .evaluate(args.class_args.args())
        .map_err(|err| SlaveError::EvaluationFailed {
            message: format!("{err:#}"),
        })?;
    Ok(objective)
}

/// Write the single result line.
///
/// Output files are written under a temporary name and renamed into place,
/// since the master treats any non-empty file as finished.
pub fn report(objective: f64, out_file: Option<&Path>) -> io::Result<()> {
    let line = format!("{objective}\n");
    match out_file {
        Some(path) => {
            let mut staging = path.as_os_str().to_owned();
            staging.push(".tmp");
            let staging = PathBuf::from(staging);
            std::fs::write(&staging, &line)?;
            std::fs::rename(&staging, path)
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(line.as_bytes())?;
            stdout.flush()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::{escape_args, HsError};

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_protocol_flags() {
        let class_args = format!("--classArgs={}", escape_args(&["--x=0.5", "--y=-1"]).unwrap());
        let parsed = SlaveArgs::parse(&args(&[
            "--className=quadratic",
            class_args.as_str(),
            "--outFile=/tmp/job-3.out",
        ]))
        .unwrap();

        assert_eq!(parsed.class_name, "quadratic");
        assert_eq!(parsed.class_args.args(), &["--x=0.5", "--y=-1"]);
        assert_eq!(parsed.out_file, Some(PathBuf::from("/tmp/job-3.out")));
    }

    #[test]
    fn out_file_and_class_args_are_optional() {
        let parsed = SlaveArgs::parse(&args(&["--className=rosenbrock"])).unwrap();
        assert!(parsed.class_args.is_empty());
        assert_eq!(parsed.out_file, None);
    }

    #[test]
    fn class_name_is_required() {
        let err = SlaveArgs::parse(&args(&["--classArgs=x=1"])).unwrap_err();
        assert!(matches!(
            err,
            HsError::Slave(SlaveError::MissingArgument { .. })
        ));
        assert!(SlaveArgs::parse(&args(&["--bogus=1"])).is_err());
    }

    #[test]
    fn runs_registered_entry_point() {
        let registry = builtin_registry().unwrap();
        let parsed =
            SlaveArgs::parse(&args(&["--className=quadratic", "--classArgs=x=1::y=-2"])).unwrap();
        assert_eq!(run_slave(&registry, &parsed).unwrap(), 0.0);
    }

    #[test]
    fn unknown_entry_point_is_an_error() {
        let registry = builtin_registry().unwrap();
        let parsed = SlaveArgs::parse(&args(&["--className=NoSuchModel"])).unwrap();
        assert!(matches!(
            run_slave(&registry, &parsed),
            Err(HsError::Slave(SlaveError::UnknownEntryPoint { .. }))
        ));
    }

    #[test]
    fn evaluation_failures_carry_the_cause() {
        let registry = builtin_registry().unwrap();
        let parsed =
            SlaveArgs::parse(&args(&["--className=quadratic", "--classArgs=x=oops"])).unwrap();
        match run_slave(&registry, &parsed) {
            Err(HsError::Slave(SlaveError::EvaluationFailed { message })) => {
                assert!(message.contains("oops"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn report_writes_one_line_to_out_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job-0.out");
        report(-2.5, Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "-2.5\n");
        assert!(!dir.path().join("job-0.out.tmp").exists());

        report(f64::NEG_INFINITY, Some(&path)).unwrap();
        let line = std::fs::read_to_string(&path).unwrap();
        assert_eq!(line.trim().parse::<f64>().unwrap(), f64::NEG_INFINITY);
    }
}
