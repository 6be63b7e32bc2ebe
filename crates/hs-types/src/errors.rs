use thiserror::Error;

/// Main error type for the HyperSweep system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Escape error: {0}")]
    Escape(#[from] EscapeError),

    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Slave error: {0}")]
    Slave(#[from] SlaveError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Settings registry errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unknown setting: {name}")]
    UnknownSetting { name: String },

    #[error("Setting already registered: {name}")]
    DuplicateSetting { name: String },

    #[error("Argument is not a --name=value flag: {arg}")]
    MissingPrefix { arg: String },

    #[error("Invalid value for {name}: {value:?} is not a valid {expected}")]
    InvalidValue {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("Type mismatch for {name}: expected {expected}, found {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Argument escaping errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EscapeError {
    #[error("Flag does not start with --: {arg}")]
    MissingPrefix { arg: String },

    #[error("Flag contains the reserved :: delimiter: {arg}")]
    ContainsDelimiter { arg: String },

    #[error("Flag would not survive :: escaping unchanged: {arg}")]
    Ambiguous { arg: String },
}

/// Parameter sampler construction errors
#[derive(Error, Debug, PartialEq)]
pub enum SamplerError {
    #[error("Discrete sampler needs at least one value")]
    EmptyValues,

    #[error("Got {weights} weights for {values} values")]
    WeightCountMismatch { values: usize, weights: usize },

    #[error("Invalid weights: {message}")]
    InvalidWeights { message: String },

    #[error("Invalid range: lower {lower} must be finite and below upper {upper}")]
    InvalidRange { lower: f64, upper: f64 },

    #[error("Log-uniform lower bound must be positive, got {lower}")]
    NonPositiveLogBound { lower: f64 },

    #[error("Continuous sampler needs at least one bucket")]
    ZeroBuckets,

    #[error("Range {low}..={high} holds more than {max} values")]
    TooManyValues { low: i64, high: i64, max: usize },

    #[error("{buckets} buckets requested, at most {max} allowed")]
    TooManyBuckets { buckets: usize, max: usize },
}

/// Search setup and completion errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SearchError {
    #[error("numToFinish {num_to_finish} must be between 1 and numTrials {num_trials}")]
    InvalidThreshold {
        num_to_finish: usize,
        num_trials: usize,
    },

    #[error("Search needs at least one trial")]
    NoTrials,

    #[error("Search needs at least one hyperparameter")]
    NoParameters,

    #[error("Hyperparameter tuned twice: {name}")]
    DuplicateParameter { name: String },

    #[error("No trial completed before the search deadline of {deadline_ms} ms")]
    NoCompletedTrials { deadline_ms: u64 },
}

/// Trial execution errors. These resolve a single trial and never abort a search.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Job {job_id} produced malformed output {content:?}")]
    MalformedOutput { job_id: u64, content: String },

    #[error("Job {job_id} left no output at {path}")]
    OutputMissing { job_id: u64, path: String },

    #[error("Worker {worker} is no longer accepting jobs")]
    WorkerUnavailable { worker: String },

    #[error("Worker pool is empty")]
    EmptyPool,

    #[error("Trial task failed: {message}")]
    TaskFailed { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Slave-side protocol errors
#[derive(Error, Debug)]
pub enum SlaveError {
    #[error("Unknown entry point: {name}")]
    UnknownEntryPoint { name: String },

    #[error("Entry point already registered: {name}")]
    DuplicateEntryPoint { name: String },

    #[error("Missing required argument: --{name}")]
    MissingArgument { name: String },

    #[error("Evaluation failed: {message}")]
    EvaluationFailed { message: String },
}

/// Result type alias for HyperSweep operations
pub type HsResult<T> = Result<T, HsError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::HsError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HsError::Config(format!($($arg)*))
    };
}
