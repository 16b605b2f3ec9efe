/*
 * Scheduling Policies
 *
 * - PriorityPolicy: strict priority with donation (default)
 * - MlfqsPolicy: 4.4BSD multi-level feedback queue (`-o mlfqs`)
 */

pub mod mlfqs;
pub mod priority;

pub use mlfqs::MlfqsPolicy;
pub use priority::PriorityPolicy;
