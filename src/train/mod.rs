//! Per-minibatch training: configuration, statistics, update policy, trainer.

mod config;
mod stats;
mod trainer;
mod update;

pub use config::TrainerConfig;
pub use stats::ObjectiveStats;
pub use trainer::Trainer;

pub(crate) use config::parse_objective_scales;
pub(crate) use update::UpdatePolicy;
