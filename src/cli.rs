//! Command line interface setup for the `uci` executable (§6).
//!
//! Grounded on the teacher's `desc::cli::{Cli, Command}` split: a `Parser`
//! struct carrying global flags plus a `Subcommand` enum, with per-command
//! argument structs flattened in where useful.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use strum::Display;

/// The command-line interface for `uci`.
#[derive(Clone, Debug, Parser)]
#[command(
    about = "Command line tool for the Unified Configuration Interface (UCI) format",
    author,
    name = "uci",
    version
)]
pub struct Cli {
    /// Override the config directory (default `/etc/config`).
    #[arg(short = 'c', long = "confdir", value_name = "DIR", global = true)]
    pub confdir: Option<PathBuf>,

    /// Add an additional delta search path, consulted before `savedir`. May
    /// be given multiple times.
    #[arg(short = 'p', long = "path", value_name = "DIR", global = true)]
    pub search_path: Vec<PathBuf>,

    /// Override the save directory; also disables real `commit` (changes
    /// are flushed to the save file but never written back to the
    /// canonical config).
    #[arg(short = 'P', long = "savedir", value_name = "DIR", global = true)]
    pub savedir: Option<PathBuf>,

    /// On `import`, merge into an already-loaded package instead of
    /// replacing it.
    #[arg(short = 'm', long = "merge", global = true)]
    pub merge: bool,

    /// Abort import on the first parse error (default).
    #[arg(short = 's', long = "strict", global = true, conflicts_with = "lenient")]
    pub strict: bool,

    /// Recover from parse errors by discarding the offending line/section
    /// and continuing.
    #[arg(short = 'S', long = "lenient", global = true)]
    pub lenient: bool,

    /// Emit anonymous sections' generated names on export.
    #[arg(short = 'n', long = "export-name", global = true, conflicts_with = "no_export_name")]
    pub export_name: bool,

    /// Suppress anonymous sections' generated names on export (default).
    #[arg(short = 'N', long = "no-export-name", global = true)]
    pub no_export_name: bool,

    /// Suppress error messages on stderr.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Read input from `FILE` instead of stdin (`import`) or instead of
    /// the managed config file (`show`/`export` with a single package).
    #[arg(short = 'f', long = "file", value_name = "FILE", global = true)]
    pub file: Option<PathBuf>,

    /// The `uci` subcommand.
    #[command(subcommand)]
    pub command: Command,
}

/// The `uci` subcommands (§6).
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Show the whole config tree, one package, a section, or an option.
    Show {
        /// A pointer (`pkg`, `pkg.section`, `pkg.section.option`), or
        /// omitted to show every package under the confdir.
        pointer: Option<String>,

        /// Provide the output format.
        #[arg(short = 'o', long = "output-format", value_name = "OUTPUT_FORMAT", default_value_t = OutputFormat::Uci)]
        output_format: OutputFormat,
    },

    /// Export one or all packages in canonical config-file text form.
    Export {
        /// A package name, or omitted to export every package under the
        /// confdir.
        package: Option<String>,

        /// Provide the output format.
        #[arg(short = 'o', long = "output-format", value_name = "OUTPUT_FORMAT", default_value_t = OutputFormat::Uci)]
        output_format: OutputFormat,
    },

    /// Import config text (from stdin or `-f`) as one or more packages.
    Import {
        /// The package to import into (required with `-m`; otherwise the
        /// input's own `package` directives name the packages).
        package: Option<String>,
    },

    /// List a package's pending and saved-but-uncommitted deltas.
    Changes {
        /// A package name, or omitted to list changes for every loaded
        /// package.
        package: Option<String>,
    },

    /// Commit a package's changes to its canonical config file.
    Commit {
        /// A package name, or omitted to commit every loaded package.
        package: Option<String>,
    },

    /// Discard uncommitted changes under a pointer, restoring it from the
    /// canonical file.
    Revert {
        /// A pointer naming the package, section, or option to revert.
        pointer: String,
    },

    /// Print the value a pointer resolves to.
    Get {
        /// A pointer (`pkg`, `pkg.section`, `pkg.section.option`).
        pointer: String,
    },

    /// Set an option's scalar value, or a section's type, creating either
    /// if missing.
    Set {
        /// A pointer suffixed with `=value` (`pkg.section.option=value`,
        /// or `pkg.section=type` to create a section).
        pointer: String,
    },

    /// Remove a section or option.
    Del {
        /// A pointer naming the section or option to remove.
        pointer: String,
    },

    /// Rename a section or option.
    Rename {
        /// A pointer suffixed with `=new_name`
        /// (`pkg.section=new_name`/`pkg.section.option=new_name`).
        pointer: String,
    },

    /// Append a value to a list option, creating it (or promoting an
    /// existing scalar) if necessary.
    AddList {
        /// A pointer suffixed with `=value`
        /// (`pkg.section.option=value`).
        pointer: String,
    },

    /// Add a new anonymous section of the given type.
    Add {
        /// The owning package.
        package: String,
        /// The new section's type.
        r#type: String,
    },

    /// Run pointer-style commands read one per line from stdin.
    Batch,
}

/// Output format for `show` and `export` (§6 EXPANDED).
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// The canonical UCI config-file text format.
    #[default]
    #[strum(to_string = "uci")]
    Uci,
    /// A JSON rendering of the same tree (see [`crate::json`]).
    #[strum(to_string = "json")]
    Json,
}
