//! fontpress command line: export font families from parameter files.

pub mod backends;
pub mod cli;
pub mod io;

pub use backends::{DirDownload, DirParameterStore, LocalWorkspace, StaticPlan};
