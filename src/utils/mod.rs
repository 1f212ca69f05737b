//! Internal helpers shared by the governance components.

pub mod duration;
pub mod sweeper;

pub use sweeper::SweepTask;
