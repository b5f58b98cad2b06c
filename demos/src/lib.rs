//! Segmetric examples
//!
//! This crate drives the IoU engine the way a data-parallel training loop
//! does: one accumulator per worker, an all-reduce at the end of every epoch,
//! and a report handed to a metrics sink.
//!
//! ## Usage
//!
//! ```bash
//! # Evaluate label files on four workers
//! cargo run --bin evaluate -- --predictions preds.json --targets labels.json --world-size 4
//!
//! # Use a configuration file and print the final report as JSON
//! cargo run --bin evaluate -- --config eval.json --predictions preds.json --targets labels.json --json
//! ```

pub mod config;
pub mod runner;

pub use config::EvalConfig;
pub use runner::{load_batches, run_phase, LabelBatches};
