//! Error types for the host runtime
//!
//! Only operational failures are modelled here. Protocol violations (wrong
//! thread, unknown parameter id, malformed rescan, gesture mismatch) are not
//! recoverable and panic at the site that observed them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Opening,
    Entry,
    Factory,
    Instantiation,
    Initialization,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::Entry => write!(f, "resolving entry point"),
            LoadStage::Factory => write!(f, "getting factory"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Initialization => write!(f, "initializing plugin"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Plugin load failed at {stage} stage: {path}\n  Reason: {reason}")]
    LoadFailed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("Incompatible CLAP version: plugin is {major}.{minor}.{revision}")]
    IncompatibleClapVersion {
        major: u32,
        minor: u32,
        revision: u32,
    },

    #[error("No plugin is loaded")]
    NotLoaded,

    #[error("Plugin rejected activation at {sample_rate} Hz, {block_size} frames")]
    ActivationFailed { sample_rate: f64, block_size: u32 },

    #[error("GUI negotiation failed: {0}")]
    GuiNegotiation(String),

    #[error("Plugin does not support loading native presets")]
    PresetLoadUnsupported,

    #[error("Plugin failed to load preset: {0}")]
    PresetLoadFailed(PathBuf),

    #[error("Plugin does not expose a state interface")]
    StateUnsupported,

    #[error("Failed to save plugin state: {0}")]
    StateSave(String),

    #[error("Failed to restore plugin state: {0}")]
    StateRestore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
