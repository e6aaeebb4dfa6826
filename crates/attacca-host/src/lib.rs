//! CLAP plugin hosting runtime for Attacca.
//!
//! This crate is the runtime core of the host: it loads a plugin module,
//! drives its lifecycle, and exchanges real-time audio, MIDI and parameter
//! data with it under strict threading rules.
//!
//! ## Architecture
//!
//! - [`PluginSession`] - the main-thread half: module loading, the
//!   activation state machine, parameter/page registries, GUI negotiation
//!   and the idle pass.
//! - [`AudioProcessor`] - the audio-thread half: per-block event draining,
//!   MIDI translation and the plugin's process call.
//! - [`ReducingQueue`] - the coalescing parameter transport between the two.
//! - [`WorkerPool`] - long-lived workers executing plugin-requested
//!   parallel tasks within a processing block.
//!
//! The two halves are created together and share state only through
//! atomics and the coalescing queues:
//!
//! ```ignore
//! use attacca_host::{HostSettings, PluginSession};
//!
//! let (mut session, processor) = PluginSession::new(
//!     HostSettings::default(),
//!     Box::new(shell_window),
//! );
//! session.load(Path::new("/usr/lib/clap/synth.clap"), 0)?;
//! session.activate(48_000.0, 256)?;
//! // move `processor` to the audio callback thread
//! ```
//!
//! Thread roles are tagged explicitly (see [`thread`]); calling a
//! role-sensitive operation from the wrong thread is a protocol violation
//! and panics rather than being silently serialized.

pub mod error;
pub use error::{HostError, LoadStage, Result};

mod session;
pub use session::{PluginSession, SessionState};

mod process;
pub use process::{AudioBlock, AudioProcessor};

mod plugin;
pub use plugin::{PluginDescriptor, PluginHandle, PluginModule};

mod params;
pub use params::{Cookie, ParamEntry, ParamInfo, ParamRegistry, ParamScanSource, ParamState};

mod pages;
pub use pages::{ControlPage, PageRegistry, PageScanSource};

mod gui;
pub use gui::{GuiNegotiator, WindowHandle, WindowHost};

mod host;
pub use host::{HostSettings, SessionNotice};

mod events;
pub use events::{EventList, EventRef};

mod midi;
pub use midi::{block_offset, KeyEvent, KeySlots, MidiMessage};

mod pool;
pub use pool::{PoolTask, WorkerPool};

mod queue;
pub use queue::{CoalesceValue, ReducingQueue, ReducingQueueProducer};

pub mod thread;
pub use thread::{RoleGuard, ThreadRole};

mod timers;

#[cfg(test)]
mod test_utils;
