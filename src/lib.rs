//! `rust-data-tabulate` turns heterogeneous open-data files into one standardized CSV column
//! schema, driven by a small JSON [`descriptor::Descriptor`] per dataset.
//!
//! Each descriptor says where the input lives, how to read it (delimited text or
//! element-tagged markup), how its attributes map onto the configured output columns and
//! which records to keep. The [`execution::Coordinator`] runs one job per descriptor on a
//! bounded worker pool and skips inputs whose content was already processed successfully,
//! using a content-digest keyed [`cache::CacheStore`].
//!
//! ## Binding expressions
//!
//! A schema entry binds an output column to:
//!
//! - an attribute name: `"name": "NAME"` copies the `NAME` attribute
//! - a literal: `"city": "force:Springfield"` emits `Springfield` on every row
//! - a list: `"street": ["STREET_NO", "STREET"]` joins the parts with single spaces; a missing
//!   attribute contributes an empty part, and a `force:` entry splices in a constant
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rust_data_tabulate::cache::FileCacheStore;
//! use rust_data_tabulate::config::Config;
//! use rust_data_tabulate::execution::{Coordinator, CoordinatorOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("tabulate.toml")?;
//! let layout = config.layout();
//! let opts = CoordinatorOptions {
//!     workers: 4,
//!     input_dir: layout.input_dir.clone(),
//!     output_dir: layout.output_dir.clone(),
//!     reader: config.reader_options(),
//!     transform: config.transform_options(),
//!     ..Default::default()
//! };
//! let cache = Arc::new(FileCacheStore::open(&layout.cache_path)?);
//! let coordinator = Coordinator::new(opts, cache)?;
//!
//! let report = coordinator.run_paths(&["sources/springfield.json"], &config.labels);
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`descriptor`]: descriptor parsing and validation
//! - [`reader`]: streaming record readers and input encoding detection
//! - [`transform`]: the per-record pipeline (filter, bind, clean, address split, encode) and the
//!   output writer
//! - [`cache`]: the redundancy cache
//! - [`execution`]: the job coordinator, worker bound, cancellation and metrics
//! - [`observability`]: job observers and the per-record error sink
//! - [`fetch`]: retrieval of remote datasets
//! - [`config`]: TOML run configuration
//! - [`logging`]: subscriber setup for applications
//! - [`error`]: error types

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod execution;
pub mod fetch;
pub mod logging;
pub mod observability;
pub mod reader;
pub mod transform;
pub mod types;

pub use error::{TabulateError, TabulateResult};
