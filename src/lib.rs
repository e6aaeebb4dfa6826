//! # Attacca - CLAP plugin host runtime
//!
//! Umbrella crate re-exporting the hosting core.
//!
//! The interesting work lives in [`attacca_host`]: plugin module loading,
//! the activation state machine, the coalescing parameter transport between
//! the main and audio threads, the worker pool for plugin-parallel tasks,
//! and GUI embedding negotiation.
//!
//! ## Quick start
//!
//! ```ignore
//! use attacca::prelude::*;
//! use std::path::Path;
//!
//! // `shell_window` comes from the application shell and wraps the window
//! // that will contain the plugin's UI.
//! let (mut session, processor) = PluginSession::new(
//!     HostSettings::default(),
//!     Box::new(shell_window),
//! );
//!
//! session.load(Path::new("/usr/lib/clap/synth.clap"), 0)?;
//! session.activate(48_000.0, 256)?;
//!
//! // Hand `processor` to the audio callback; call `session.idle()` from the
//! // UI timer.
//! ```

/// Re-export of the hosting core for direct access.
pub use attacca_host as host;

pub use attacca_host::{
    AudioBlock, AudioProcessor, ControlPage, HostError, HostSettings, KeyEvent, KeySlots,
    ParamEntry, ParamInfo, ParamState, PluginDescriptor, PluginSession, Result, SessionNotice,
    SessionState, WindowHandle, WindowHost,
};

pub mod prelude {
    pub use attacca_host::{
        AudioBlock, AudioProcessor, HostError, HostSettings, PluginSession, Result,
        SessionNotice, SessionState, WindowHandle, WindowHost,
    };
}
