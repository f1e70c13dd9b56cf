//! Long-running services built on the core compile stages.

pub mod worker;
