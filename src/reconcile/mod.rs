// Reconciliation - list, diff, query, settle, record
pub mod engine;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod fakes;

pub use engine::{Reconciler, ReconcilerConfig};
pub use scheduler::ReconcileScheduler;
