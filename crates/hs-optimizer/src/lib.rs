//! # hs-optimizer
//!
//! Random hyperparameter search for HyperSweep.
//!
//! Provides parameter samplers with per-bucket outcome statistics, typed
//! hyperparameters bound to the settings registry, the polling search driver,
//! and JSON search-job descriptions for the `hs-search` binary.

mod hyperparameter;
mod job;
mod sampler;
mod search;
mod space;
mod trial;

pub use hyperparameter::{BucketSummary, HyperParameter, ParameterReport, Tunable};
pub use job::{Backend, SearchJob, SettingDecl};
pub use sampler::{
    Bucket, ContinuousUniform, DiscreteUniform, DiscreteWeighted, LogUniform, ParameterSampler,
    MAX_BUCKETS, MAX_DISCRETE_VALUES,
};
pub use search::{HyperParameterSearcher, SearchConfig, SearchId, SearchOutcome};
pub use space::{ParameterDef, ParameterKind, SearchSpace};
pub use trial::{PollSummary, SearchPhase, Trial};
