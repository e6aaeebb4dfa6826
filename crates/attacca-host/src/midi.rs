//! Raw MIDI translation and the pending-key queue.
//!
//! The MIDI backend delivers raw 3-byte channel-voice messages with an
//! origin timestamp; the audio thread converts them to sample-accurate
//! offsets within the current block before handing them to the plugin.

use std::sync::atomic::{AtomicU32, Ordering};

/// A decoded channel-voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOff { channel: u8, key: u8, velocity: u8 },
    NoteOn { channel: u8, key: u8, velocity: u8 },
    PolyPressure { channel: u8, key: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Decode a raw 3-byte channel-voice message. Returns `None` for system
    /// messages and anything else outside the channel-voice range.
    pub fn parse(bytes: [u8; 3]) -> Option<Self> {
        let channel = bytes[0] & 0x0f;
        let data1 = bytes[1];
        let data2 = bytes[2];

        match bytes[0] >> 4 {
            0x8 => Some(Self::NoteOff {
                channel,
                key: data1,
                velocity: data2,
            }),
            0x9 => Some(Self::NoteOn {
                channel,
                key: data1,
                velocity: data2,
            }),
            0xa => Some(Self::PolyPressure {
                channel,
                key: data1,
                pressure: data2,
            }),
            0xb => Some(Self::ControlChange {
                channel,
                controller: data1,
                value: data2,
            }),
            0xc => Some(Self::ProgramChange {
                channel,
                program: data1,
            }),
            0xd => Some(Self::ChannelPressure {
                channel,
                pressure: data1,
            }),
            0xe => Some(Self::PitchBend {
                channel,
                value: u16::from(data1) | (u16::from(data2) << 7),
            }),
            _ => None,
        }
    }
}

/// Convert a message's age into an offset within the current block.
///
/// `callback_time_ms` and `message_time_ms` come from the MIDI backend's
/// clock; the result is clamped to `[0, frames - 1]`.
pub fn block_offset(
    callback_time_ms: f64,
    message_time_ms: f64,
    sample_rate: f64,
    frames: u32,
) -> u32 {
    debug_assert!(frames > 0);
    let delta_samples = ((callback_time_ms - message_time_ms) * sample_rate) / 1000.0;
    if !(delta_samples > 0.0) {
        return 0;
    }
    (delta_samples as u32).min(frames - 1)
}

/// A pending key event pushed by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: u8,
    pub velocity: u8,
    pub release: bool,
}

const SLOT_OCCUPIED: u32 = 1 << 31;
const SLOT_RELEASE: u32 = 1 << 15;

/// Fixed-capacity queue of pending key events.
///
/// Eight independently compare-and-swapped slots; `push` is callable from
/// the UI thread, `drain` from the audio thread. When every slot is occupied
/// the event is dropped and `push` reports it, so a burst of key chatter can
/// never stall either side.
#[derive(Default)]
pub struct KeySlots {
    slots: [AtomicU32; 8],
}

impl KeySlots {
    pub const CAPACITY: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a key event. Returns `false` if every slot was full and the
    /// event was dropped.
    pub fn push(&self, event: KeyEvent) -> bool {
        let encoded = SLOT_OCCUPIED
            | if event.release { SLOT_RELEASE } else { 0 }
            | (u32::from(event.velocity) << 8)
            | u32::from(event.key);
        for slot in &self.slots {
            if slot
                .compare_exchange(0, encoded, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
        false
    }

    /// Take every pending event, in slot order.
    pub fn drain(&self, mut f: impl FnMut(KeyEvent)) {
        for slot in &self.slots {
            let encoded = slot.swap(0, Ordering::AcqRel);
            if encoded == 0 {
                continue;
            }
            f(KeyEvent {
                key: (encoded & 0x7f) as u8,
                velocity: ((encoded >> 8) & 0x7f) as u8,
                release: encoded & SLOT_RELEASE != 0,
            });
        }
    }
}
