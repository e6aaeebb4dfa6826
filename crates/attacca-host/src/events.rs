//! Per-block CLAP event staging.
//!
//! `EventList` owns a flat buffer of CLAP events and exposes it through the
//! `clap_input_events` / `clap_output_events` ABI. Events are stored as a
//! union of the concrete event structs so the header pointer handed to the
//! plugin is the start of a complete, correctly laid out event.

use clap_sys::events::{
    clap_event_header, clap_event_midi, clap_event_note, clap_event_param_gesture,
    clap_event_param_mod, clap_event_param_value, clap_input_events, clap_output_events,
    CLAP_CORE_EVENT_SPACE_ID, CLAP_EVENT_MIDI, CLAP_EVENT_NOTE_OFF, CLAP_EVENT_NOTE_ON,
    CLAP_EVENT_PARAM_GESTURE_BEGIN, CLAP_EVENT_PARAM_GESTURE_END, CLAP_EVENT_PARAM_MOD,
    CLAP_EVENT_PARAM_VALUE,
};
use clap_sys::id::clap_id;
use smallvec::SmallVec;
use std::ffi::c_void;
use std::ptr;

#[derive(Clone, Copy)]
#[repr(C)]
union EventBuf {
    header: clap_event_header,
    note: clap_event_note,
    midi: clap_event_midi,
    param_value: clap_event_param_value,
    param_mod: clap_event_param_mod,
    param_gesture: clap_event_param_gesture,
}

// Safety: the buffers are plain C event payloads. The cookie pointer inside
// param events is an opaque token owned by the plugin and is never
// dereferenced by the host.
unsafe impl Send for EventBuf {}

/// A typed view of one stored event.
pub enum EventRef<'a> {
    NoteOn(&'a clap_event_note),
    NoteOff(&'a clap_event_note),
    Midi(&'a clap_event_midi),
    ParamValue(&'a clap_event_param_value),
    ParamMod(&'a clap_event_param_mod),
    ParamGestureBegin(&'a clap_event_param_gesture),
    ParamGestureEnd(&'a clap_event_param_gesture),
}

#[derive(Default)]
pub struct EventList {
    events: SmallVec<[EventBuf; 32]>,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn header(&self, index: usize) -> Option<&clap_event_header> {
        // Safety: every stored union variant starts with a header.
        self.events.get(index).map(|ev| unsafe { &ev.header })
    }

    /// Typed access to one stored event.
    pub fn get(&self, index: usize) -> Option<EventRef<'_>> {
        let ev = self.events.get(index)?;
        // Safety: the header's type tag selects the variant that was stored.
        unsafe {
            if ev.header.space_id != CLAP_CORE_EVENT_SPACE_ID {
                return None;
            }
            match ev.header.type_ {
                CLAP_EVENT_NOTE_ON => Some(EventRef::NoteOn(&ev.note)),
                CLAP_EVENT_NOTE_OFF => Some(EventRef::NoteOff(&ev.note)),
                CLAP_EVENT_MIDI => Some(EventRef::Midi(&ev.midi)),
                CLAP_EVENT_PARAM_VALUE => Some(EventRef::ParamValue(&ev.param_value)),
                CLAP_EVENT_PARAM_MOD => Some(EventRef::ParamMod(&ev.param_mod)),
                CLAP_EVENT_PARAM_GESTURE_BEGIN => {
                    Some(EventRef::ParamGestureBegin(&ev.param_gesture))
                }
                CLAP_EVENT_PARAM_GESTURE_END => Some(EventRef::ParamGestureEnd(&ev.param_gesture)),
                _ => None,
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = EventRef<'_>> {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    fn header_at(size: u32, time: u32, type_: u16) -> clap_event_header {
        clap_event_header {
            size,
            time,
            space_id: CLAP_CORE_EVENT_SPACE_ID,
            type_,
            flags: 0,
        }
    }

    fn push_note(&mut self, type_: u16, time: u32, channel: i16, key: i16, velocity: f64) {
        self.events.push(EventBuf {
            note: clap_event_note {
                header: Self::header_at(
                    std::mem::size_of::<clap_event_note>() as u32,
                    time,
                    type_,
                ),
                note_id: -1,
                port_index: 0,
                channel,
                key,
                velocity,
            },
        });
    }

    pub fn push_note_on(&mut self, time: u32, channel: i16, key: i16, velocity: f64) {
        self.push_note(CLAP_EVENT_NOTE_ON, time, channel, key, velocity);
    }

    pub fn push_note_off(&mut self, time: u32, channel: i16, key: i16, velocity: f64) {
        self.push_note(CLAP_EVENT_NOTE_OFF, time, channel, key, velocity);
    }

    pub fn push_midi(&mut self, time: u32, data: [u8; 3]) {
        self.events.push(EventBuf {
            midi: clap_event_midi {
                header: Self::header_at(
                    std::mem::size_of::<clap_event_midi>() as u32,
                    time,
                    CLAP_EVENT_MIDI,
                ),
                port_index: 0,
                data,
            },
        });
    }

    pub fn push_param_value(
        &mut self,
        time: u32,
        param_id: clap_id,
        cookie: *mut c_void,
        value: f64,
    ) {
        self.events.push(EventBuf {
            param_value: clap_event_param_value {
                header: Self::header_at(
                    std::mem::size_of::<clap_event_param_value>() as u32,
                    time,
                    CLAP_EVENT_PARAM_VALUE,
                ),
                param_id,
                cookie,
                note_id: -1,
                port_index: -1,
                channel: -1,
                key: -1,
                value,
            },
        });
    }

    pub fn push_param_mod(
        &mut self,
        time: u32,
        param_id: clap_id,
        cookie: *mut c_void,
        amount: f64,
    ) {
        self.events.push(EventBuf {
            param_mod: clap_event_param_mod {
                header: Self::header_at(
                    std::mem::size_of::<clap_event_param_mod>() as u32,
                    time,
                    CLAP_EVENT_PARAM_MOD,
                ),
                param_id,
                cookie,
                note_id: -1,
                port_index: -1,
                channel: -1,
                key: -1,
                amount,
            },
        });
    }

    pub fn push_param_gesture(&mut self, time: u32, param_id: clap_id, is_begin: bool) {
        let type_ = if is_begin {
            CLAP_EVENT_PARAM_GESTURE_BEGIN
        } else {
            CLAP_EVENT_PARAM_GESTURE_END
        };
        self.events.push(EventBuf {
            param_gesture: clap_event_param_gesture {
                header: Self::header_at(
                    std::mem::size_of::<clap_event_param_gesture>() as u32,
                    time,
                    type_,
                ),
                param_id,
            },
        });
    }

    /// Build the input-events ABI view.
    ///
    /// The returned struct borrows `self` through its `ctx` pointer: the list
    /// must stay alive and unmoved for as long as the view is in use.
    pub fn as_input(&self) -> clap_input_events {
        clap_input_events {
            ctx: self as *const Self as *mut c_void,
            size: Some(input_events_size),
            get: Some(input_events_get),
        }
    }

    /// Build the output-events ABI view. Same aliasing contract as
    /// [`EventList::as_input`].
    pub fn as_output(&mut self) -> clap_output_events {
        clap_output_events {
            ctx: self as *mut Self as *mut c_void,
            try_push: Some(output_events_try_push),
        }
    }
}

unsafe extern "C" fn input_events_size(list: *const clap_input_events) -> u32 {
    let list = &*((*list).ctx as *const EventList);
    list.len() as u32
}

unsafe extern "C" fn input_events_get(
    list: *const clap_input_events,
    index: u32,
) -> *const clap_event_header {
    let list = &*((*list).ctx as *const EventList);
    match list.header(index as usize) {
        Some(header) => header as *const clap_event_header,
        None => ptr::null(),
    }
}

unsafe extern "C" fn output_events_try_push(
    list: *const clap_output_events,
    event: *const clap_event_header,
) -> bool {
    if list.is_null() || event.is_null() {
        return false;
    }
    let list = &mut *((*list).ctx as *mut EventList);
    let header = &*event;
    if header.space_id != CLAP_CORE_EVENT_SPACE_ID {
        return false;
    }

    match header.type_ {
        CLAP_EVENT_NOTE_ON | CLAP_EVENT_NOTE_OFF => {
            list.events.push(EventBuf {
                note: *(event as *const clap_event_note),
            });
            true
        }
        CLAP_EVENT_MIDI => {
            list.events.push(EventBuf {
                midi: *(event as *const clap_event_midi),
            });
            true
        }
        CLAP_EVENT_PARAM_VALUE => {
            list.events.push(EventBuf {
                param_value: *(event as *const clap_event_param_value),
            });
            true
        }
        CLAP_EVENT_PARAM_MOD => {
            list.events.push(EventBuf {
                param_mod: *(event as *const clap_event_param_mod),
            });
            true
        }
        CLAP_EVENT_PARAM_GESTURE_BEGIN | CLAP_EVENT_PARAM_GESTURE_END => {
            list.events.push(EventBuf {
                param_gesture: *(event as *const clap_event_param_gesture),
            });
            true
        }
        _ => false,
    }
}
