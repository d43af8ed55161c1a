use std::process::ExitCode;

use crate::cli::run;

pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod fetch;
mod logging;
pub mod pipeline;
pub mod playlist;
pub mod storage;
pub mod tagging;

fn main() -> ExitCode {
    run()
}
