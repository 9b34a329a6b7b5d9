//! Process-driving layer: argument construction, stderr classification, and
//! the recovery state machine that ties them together (spec.md §4.5).

pub mod args;
pub mod classifier;
pub mod pipeline;

pub use args::{build_args, RunSpec};
pub use pipeline::{spawn_perf_log, PipelineEvent, RecoveryReasonTag, TranscodePipeline};
