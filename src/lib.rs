//! Library and command line interface for the Unified Configuration
//! Interface (UCI) format: a package/section/option tree backed by plain
//! text config files under a managed directory, with an append-only delta
//! log standing in for journaled, revertible writes.
//!
//! The [`Context`] type is the crate's main entry point: it owns loaded
//! [`Package`]s, registered [`Backend`]s, and the confdir/savedir paths,
//! and exposes the pointer-based `get`/`set`/`del`/`rename`/`add` mutation
//! API along with `save`/`commit`/`revert`.

pub mod backend;
#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod commands;
pub mod context;
pub mod delta;
pub mod error;
pub mod exporter;
pub mod importer;
#[cfg(feature = "cli")]
pub mod json;
pub mod model;
pub mod name;
pub mod resolver;
pub mod tokenizer;

// Initialize i18n support.
fluent_i18n::i18n!("locales");

pub use backend::{Backend, FileBackend, Paths};
pub use context::{Context, Flags, GetResult};
pub use error::{Error, ErrorKind, ParseDiagnostic};
pub use model::{BackendKind, DeltaCommand, DeltaEntry, Option_, Package, Section, Value};
pub use resolver::{Pointer, SectionRef};
