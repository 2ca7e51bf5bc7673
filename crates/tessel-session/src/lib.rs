//! Evaluation options and shared session state for Tessel.
//!
//! # Overview
//!
//! A [`Session`] carries the [`Options`] that control how tensor functions
//! are optimized and evaluated, plus running statistics about the rewrite
//! pass. Sessions are shared between threads through [`SessionRef`]; the
//! statistics sit behind a lock so any thread may record into them.
//!
//! Options can be built in code or loaded from a TOML file:
//!
//! ```toml
//! optimize = true
//! arena_capacity = 65536
//! trace_instructions = false
//!
//! [dump]
//! graph = true
//! ```

#![warn(missing_docs)]

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessel_arena::DEFAULT_ARENA_CAPACITY;

/// Options controlling optimization and evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Run the rewrite pass before compiling.
    pub optimize: bool,
    /// Initial capacity in bytes of each evaluation arena.
    pub arena_capacity: usize,
    /// Emit a `trace` event for every executed instruction.
    pub trace_instructions: bool,
    /// Intermediate forms to log at `debug` level.
    pub dump: DumpOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            optimize: true,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            trace_instructions: false,
            dump: DumpOptions::default(),
        }
    }
}

impl Options {
    /// Parses options from TOML. Missing keys take their default value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Toml`] if the text is not valid TOML or
    /// names an unknown option.
    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConfigNotFound`] if the file does not exist,
    /// [`SessionError::Io`] if it cannot be read, and [`SessionError::Toml`]
    /// if it does not parse.
    pub fn load(path: &Utf8Path) -> Result<Self, SessionError> {
        if !path.exists() {
            return Err(SessionError::ConfigNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Options for dumping intermediate forms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DumpOptions {
    /// Log the function graph before and after optimization.
    pub graph: bool,
    /// Log the compiled instruction list.
    pub program: bool,
}

/// Errors that can occur during session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    ConfigNotFound(Utf8PathBuf),
    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Running totals of the rewrite pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptStats {
    /// Functions passed through the rewrite pass.
    pub graphs_optimized: u64,
    /// Nodes replaced by a rule.
    pub nodes_rewritten: u64,
}

/// Options plus statistics shared by everything evaluated under them.
pub struct Session {
    /// Evaluation options.
    pub options: Options,
    stats: RwLock<OptStats>,
}

impl Session {
    /// Create a new session with the given options.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            options,
            stats: RwLock::new(OptStats::default()),
        }
    }

    /// Create a new session with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Options::default())
    }

    /// Create a session from a TOML options file.
    ///
    /// # Errors
    ///
    /// See [`Options::load`].
    pub fn from_config(path: &Utf8Path) -> Result<Self, SessionError> {
        Ok(Self::new(Options::load(path)?))
    }

    /// Records one pass of the optimizer.
    pub fn record_optimization(&self, nodes_rewritten: usize) {
        let mut stats = self.stats.write();
        stats.graphs_optimized += 1;
        stats.nodes_rewritten += nodes_rewritten as u64;
    }

    /// A snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> OptStats {
        *self.stats.read()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A shared, thread-safe reference to a session.
pub type SessionRef = Arc<Session>;

/// Create a shared session reference.
#[must_use]
pub fn create_session(options: Options) -> SessionRef {
    Arc::new(Session::new(options))
}
