//! Command-line front end for the strata reduction pipeline.

pub mod cli;
pub mod logging;
