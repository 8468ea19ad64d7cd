//! Command-line surface of `tabulate`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use rust_data_tabulate::config::RunOverrides;
use rust_data_tabulate::reader::MalformedRowPolicy;
use rust_data_tabulate::transform::{EncodingErrorPolicy, OutputEncoding};

#[derive(Parser)]
#[command(
    name = "tabulate",
    version,
    about = "Tabulate open datasets into one standardized CSV schema",
    long_about = "Read each SOURCE descriptor, map its dataset onto the configured output \
                  columns and write one CSV file per dataset to the output directory.\n\n\
                  Inputs whose content was already tabulated successfully are skipped \
                  unless --ignore-cache is given."
)]
pub struct Cli {
    /// Descriptor files; bare names are also looked up in the sources directory.
    #[arg(value_name = "SOURCE")]
    pub sources: Vec<PathBuf>,

    /// Configuration file (default: $TABULATE_CONFIG, else <config dir>/tabulate.toml).
    #[arg(short = 'c', long = "config", value_name = "PATH", env = "TABULATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of datasets processed concurrently.
    #[arg(short = 'j', long = "jobs", visible_alias = "threads", value_name = "N")]
    pub jobs: Option<usize>,

    /// Create the data/input, data/output and sources directories under the root directory.
    #[arg(long = "initialize")]
    pub initialize: bool,

    /// Write an example configuration file to the default location.
    #[arg(long = "copy-config")]
    pub copy_config: bool,

    /// Validate descriptors without processing any data.
    #[arg(short = 's', long = "verify-source")]
    pub verify_source: bool,

    /// Forget every previously tabulated input.
    #[arg(long = "clear-cache")]
    pub clear_cache: bool,

    /// Process inputs even when their content was tabulated before.
    #[arg(long = "ignore-cache")]
    pub ignore_cache: bool,

    /// Download datasets that name a url before processing them.
    #[arg(short = 'd', long = "fetch")]
    pub fetch: bool,

    /// Address-parsing service endpoint, used by descriptors with `parse_address`.
    #[cfg(feature = "remote")]
    #[arg(long = "address-parser", value_name = "URL", env = "TABULATE_ADDRESS_PARSER")]
    pub address_parser: Option<String>,

    /// Append job outcomes and record errors to this file.
    #[arg(long = "event-log", value_name = "PATH")]
    pub event_log: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Explicit log level (overrides -v/-q flags and the configuration file).
    #[arg(short = 'l', long = "log-level", value_enum)]
    pub log_level: Option<LogLevelArg>,

    #[arg(long = "log-format", value_enum, default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Per-run overrides of configuration file options.
#[derive(clap::Args)]
#[command(next_help_heading = "Configuration overrides")]
pub struct OverrideArgs {
    /// Insert an index column.
    #[arg(long = "add-index", value_name = "BOOL")]
    pub add_index: Option<bool>,

    /// Output character encoding (utf-8, cp1252).
    #[arg(long = "target-enc", value_name = "ENCODING")]
    pub target_encoding: Option<OutputEncoding>,

    /// Handling of characters the output encoding cannot represent (strict, replace, ignore).
    #[arg(long = "output-enc-errors", value_name = "HANDLER")]
    pub output_encoding_errors: Option<EncodingErrorPolicy>,

    /// Collapse runs of whitespace and trim values.
    #[arg(long = "clean-ws", value_name = "BOOL")]
    pub clean_whitespace: Option<bool>,

    #[arg(long = "lowercase", value_name = "BOOL")]
    pub lowercase: Option<bool>,

    #[arg(long = "titlecase", value_name = "BOOL")]
    pub titlecase: Option<bool>,

    #[arg(long = "uppercase", value_name = "BOOL")]
    pub uppercase: Option<bool>,

    /// What to do with delimited rows whose field count differs from the header (warn, count).
    #[arg(long = "malformed-rows", value_name = "POLICY")]
    pub malformed_rows: Option<MalformedRowPolicy>,
}

impl OverrideArgs {
    pub fn to_overrides(&self) -> RunOverrides {
        RunOverrides {
            target_encoding: self.target_encoding,
            output_encoding_errors: self.output_encoding_errors,
            add_index: self.add_index,
            clean_whitespace: self.clean_whitespace,
            lowercase_output: self.lowercase,
            titlecase_output: self.titlecase,
            uppercase_output: self.uppercase,
            malformed_rows: self.malformed_rows,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
