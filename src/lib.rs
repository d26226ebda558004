//! Layout and migration-animation engine for data-center topology snapshots.
//!
//! A [`session::Visualization`] ingests snapshots, diffs container placement
//! against the previous one, lays the topology out with a tier-banded force
//! simulation and produces backend-neutral [`render::Frame`]s each tick.

pub mod animation;
pub mod classify;
pub mod config;
pub mod diff;
pub mod physics;
pub mod render;
pub mod scheduler;
pub mod series;
pub mod session;
pub mod source;
pub mod topology;
pub mod util;

pub use config::VizConfig;
pub use session::Visualization;
