//! Test fixtures: an in-process fake CLAP plugin built from static vtables,
//! plus a recording window host.
//!
//! The fake records every call it receives so tests can assert on the exact
//! traffic that crossed the ABI.

use crate::gui::WindowHost;

use clap_sys::events::{
    clap_event_header, clap_event_midi, clap_event_note, clap_event_param_gesture,
    clap_event_param_mod, clap_event_param_value, clap_input_events, clap_output_events,
    CLAP_CORE_EVENT_SPACE_ID, CLAP_EVENT_MIDI, CLAP_EVENT_NOTE_OFF, CLAP_EVENT_NOTE_ON,
    CLAP_EVENT_PARAM_GESTURE_BEGIN, CLAP_EVENT_PARAM_GESTURE_END, CLAP_EVENT_PARAM_MOD,
    CLAP_EVENT_PARAM_VALUE,
};
use clap_sys::ext::draft::preset_load::{clap_plugin_preset_load, CLAP_EXT_PRESET_LOAD};
use clap_sys::ext::draft::remote_controls::{
    clap_plugin_remote_controls, clap_remote_controls_page, CLAP_EXT_REMOTE_CONTROLS,
    CLAP_REMOTE_CONTROLS_COUNT,
};
use clap_sys::ext::gui::{clap_plugin_gui, clap_window, CLAP_EXT_GUI};
use clap_sys::ext::params::{
    clap_param_info, clap_plugin_params, CLAP_EXT_PARAMS, CLAP_PARAM_IS_AUTOMATABLE,
    CLAP_PARAM_IS_MODULATABLE,
};
use clap_sys::ext::posix_fd_support::{clap_plugin_posix_fd_support, CLAP_EXT_POSIX_FD_SUPPORT};
use clap_sys::ext::state::{clap_plugin_state, CLAP_EXT_STATE};
use clap_sys::ext::thread_pool::{clap_plugin_thread_pool, CLAP_EXT_THREAD_POOL};
use clap_sys::ext::timer_support::{clap_plugin_timer_support, CLAP_EXT_TIMER_SUPPORT};
use clap_sys::id::{clap_id, CLAP_INVALID_ID};
use clap_sys::plugin::clap_plugin;
use clap_sys::process::{clap_process, clap_process_status, CLAP_PROCESS_CONTINUE};
use clap_sys::stream::{clap_istream, clap_ostream};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Route `tracing` output through the test harness so failures show logs.
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub(crate) fn write_cbuf(dst: &mut [c_char], src: &str) {
    let bytes = src.as_bytes();
    let len = bytes.len().min(dst.len() - 1);
    for (slot, byte) in dst[..len].iter_mut().zip(bytes) {
        *slot = *byte as c_char;
    }
    dst[len] = 0;
}

#[derive(Clone)]
pub(crate) struct FakeParam {
    pub id: clap_id,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub flags: u32,
    pub cookie: usize,
}

pub(crate) fn fake_param(id: clap_id, name: &str) -> FakeParam {
    FakeParam {
        id,
        name: name.to_string(),
        min: 0.0,
        max: 1.0,
        default: 0.5,
        flags: CLAP_PARAM_IS_AUTOMATABLE | CLAP_PARAM_IS_MODULATABLE,
        cookie: 0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum OutEvent {
    ParamValue { id: clap_id, value: f64 },
    GestureBegin { id: clap_id },
    GestureEnd { id: clap_id },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ReceivedEvent {
    NoteOn {
        time: u32,
        channel: i16,
        key: i16,
    },
    NoteOff {
        time: u32,
        channel: i16,
        key: i16,
    },
    Midi {
        time: u32,
        data: [u8; 3],
    },
    ParamValue {
        time: u32,
        id: clap_id,
        value: f64,
        cookie: usize,
    },
    ParamMod {
        time: u32,
        id: clap_id,
        amount: f64,
        cookie: usize,
    },
}

#[derive(Default, Clone)]
pub(crate) struct FakeState {
    pub init_calls: usize,
    pub destroy_calls: usize,
    pub activated: bool,
    pub activate_args: Option<(f64, u32, u32)>,
    pub deactivate_calls: usize,
    pub processing: bool,
    pub start_processing_calls: usize,
    pub stop_processing_calls: usize,
    pub process_calls: usize,
    pub last_steady_time: i64,
    pub received_events: Vec<ReceivedEvent>,
    pub flush_calls: usize,
    pub on_main_thread_calls: usize,
    pub timer_fires: Vec<clap_id>,
    pub fd_events: Vec<(i32, u32)>,
    pub thread_pool_tasks: Vec<u32>,
    pub gui_created: bool,
    pub gui_visible: bool,
    pub gui_parent_set: bool,
    pub gui_transient_set: bool,
    pub gui_show_calls: usize,
    pub gui_hide_calls: usize,
    pub gui_destroy_calls: usize,
    pub loaded_preset: Option<String>,
    pub loaded_state: Vec<u8>,
    pub param_values: HashMap<clap_id, f64>,
}

pub(crate) struct FakeConfig {
    pub params: Vec<FakeParam>,
    pub fail_activate: bool,
    pub fail_start_processing: bool,
    pub with_params: bool,
    pub with_gui: bool,
    pub gui_embedded_supported: bool,
    pub gui_floating_supported: bool,
    pub gui_size: (u32, u32),
    pub gui_size_fails: bool,
    pub gui_set_parent_fails: bool,
    pub with_state: bool,
    pub state_payload: Vec<u8>,
    pub with_timer_support: bool,
    pub with_posix_fd_support: bool,
    pub with_thread_pool: bool,
    pub with_preset_load: bool,
    pub preset_load_fails: bool,
    pub with_remote_controls: bool,
    pub pages: Vec<(clap_id, String, Vec<clap_id>)>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            fail_activate: false,
            fail_start_processing: false,
            with_params: true,
            with_gui: true,
            gui_embedded_supported: true,
            gui_floating_supported: true,
            gui_size: (400, 300),
            gui_size_fails: false,
            gui_set_parent_fails: false,
            with_state: true,
            state_payload: b"fake-state".to_vec(),
            with_timer_support: true,
            with_posix_fd_support: true,
            with_thread_pool: true,
            with_preset_load: true,
            preset_load_fails: false,
            with_remote_controls: true,
            pages: Vec::new(),
        }
    }
}

struct FakeInner {
    config: FakeConfig,
    state: Mutex<FakeState>,
    queued_out: Mutex<Vec<OutEvent>>,
}

pub(crate) struct FakePlugin {
    // Boxed for address stability; `plugin.plugin_data` points into `inner`.
    inner: Box<FakeInner>,
    plugin: Box<clap_plugin>,
}

pub(crate) struct FakePluginBuilder {
    config: FakeConfig,
}

impl FakePlugin {
    pub fn builder() -> FakePluginBuilder {
        FakePluginBuilder {
            config: FakeConfig::default(),
        }
    }

    pub fn as_clap_plugin(&self) -> *const clap_plugin {
        &*self.plugin
    }

    pub fn state(&self) -> FakeState {
        self.inner.state.lock().clone()
    }

    /// Queue an event the fake emits through `out_events` on its next
    /// process or flush call.
    pub fn queue_output_event(&self, event: OutEvent) {
        self.inner.queued_out.lock().push(event);
    }

    /// Change a parameter's internal value, as if a preset tweaked it.
    pub fn set_internal_param_value(&self, id: clap_id, value: f64) {
        self.inner.state.lock().param_values.insert(id, value);
    }
}

impl FakePluginBuilder {
    pub fn param(mut self, param: FakeParam) -> Self {
        self.config.params.push(param);
        self
    }

    pub fn fail_activate(mut self, fail: bool) -> Self {
        self.config.fail_activate = fail;
        self
    }

    pub fn fail_start_processing(mut self, fail: bool) -> Self {
        self.config.fail_start_processing = fail;
        self
    }

    pub fn without_params(mut self) -> Self {
        self.config.with_params = false;
        self
    }

    pub fn without_thread_pool(mut self) -> Self {
        self.config.with_thread_pool = false;
        self
    }

    pub fn without_state(mut self) -> Self {
        self.config.with_state = false;
        self
    }

    pub fn without_preset_load(mut self) -> Self {
        self.config.with_preset_load = false;
        self
    }

    pub fn preset_load_fails(mut self, fails: bool) -> Self {
        self.config.preset_load_fails = fails;
        self
    }

    pub fn state_payload(mut self, payload: Vec<u8>) -> Self {
        self.config.state_payload = payload;
        self
    }

    pub fn gui_size(mut self, width: u32, height: u32) -> Self {
        self.config.gui_size = (width, height);
        self
    }

    pub fn gui_embedded_supported(mut self, supported: bool) -> Self {
        self.config.gui_embedded_supported = supported;
        self
    }

    pub fn gui_floating_supported(mut self, supported: bool) -> Self {
        self.config.gui_floating_supported = supported;
        self
    }

    pub fn gui_size_fails(mut self, fails: bool) -> Self {
        self.config.gui_size_fails = fails;
        self
    }

    pub fn gui_set_parent_fails(mut self, fails: bool) -> Self {
        self.config.gui_set_parent_fails = fails;
        self
    }

    pub fn page(mut self, id: clap_id, name: &str, param_ids: Vec<clap_id>) -> Self {
        self.config.pages.push((id, name.to_string(), param_ids));
        self
    }

    pub fn build(self) -> FakePlugin {
        let mut state = FakeState::default();
        for param in &self.config.params {
            state.param_values.insert(param.id, param.default);
        }

        let inner = Box::new(FakeInner {
            config: self.config,
            state: Mutex::new(state),
            queued_out: Mutex::new(Vec::new()),
        });

        let plugin = Box::new(clap_plugin {
            desc: ptr::null(),
            plugin_data: &*inner as *const FakeInner as *mut c_void,
            init: Some(fake_init),
            destroy: Some(fake_destroy),
            activate: Some(fake_activate),
            deactivate: Some(fake_deactivate),
            start_processing: Some(fake_start_processing),
            stop_processing: Some(fake_stop_processing),
            reset: Some(fake_reset),
            process: Some(fake_process),
            get_extension: Some(fake_get_extension),
            on_main_thread: Some(fake_on_main_thread),
        });

        FakePlugin { inner, plugin }
    }
}

unsafe fn inner_of<'a>(plugin: *const clap_plugin) -> &'a FakeInner {
    &*((*plugin).plugin_data as *const FakeInner)
}

unsafe extern "C" fn fake_init(plugin: *const clap_plugin) -> bool {
    inner_of(plugin).state.lock().init_calls += 1;
    true
}

unsafe extern "C" fn fake_destroy(plugin: *const clap_plugin) {
    inner_of(plugin).state.lock().destroy_calls += 1;
}

unsafe extern "C" fn fake_activate(
    plugin: *const clap_plugin,
    sample_rate: f64,
    min_frames: u32,
    max_frames: u32,
) -> bool {
    let inner = inner_of(plugin);
    if inner.config.fail_activate {
        return false;
    }
    let mut state = inner.state.lock();
    state.activated = true;
    state.activate_args = Some((sample_rate, min_frames, max_frames));
    true
}

unsafe extern "C" fn fake_deactivate(plugin: *const clap_plugin) {
    let mut state = inner_of(plugin).state.lock();
    state.activated = false;
    state.deactivate_calls += 1;
}

unsafe extern "C" fn fake_start_processing(plugin: *const clap_plugin) -> bool {
    let inner = inner_of(plugin);
    if inner.config.fail_start_processing {
        return false;
    }
    let mut state = inner.state.lock();
    state.processing = true;
    state.start_processing_calls += 1;
    true
}

unsafe extern "C" fn fake_stop_processing(plugin: *const clap_plugin) {
    let mut state = inner_of(plugin).state.lock();
    state.processing = false;
    state.stop_processing_calls += 1;
}

unsafe extern "C" fn fake_reset(_plugin: *const clap_plugin) {}

unsafe fn record_in_events(inner: &FakeInner, in_events: *const clap_input_events) {
    if in_events.is_null() {
        return;
    }
    let list = &*in_events;
    let size = list.size.unwrap()(list);
    let mut state = inner.state.lock();
    for i in 0..size {
        let header = list.get.unwrap()(list, i);
        if header.is_null() {
            continue;
        }
        let header = &*header;
        let received = match header.type_ {
            CLAP_EVENT_NOTE_ON => {
                let ev = &*(header as *const clap_event_header as *const clap_event_note);
                ReceivedEvent::NoteOn {
                    time: header.time,
                    channel: ev.channel,
                    key: ev.key,
                }
            }
            CLAP_EVENT_NOTE_OFF => {
                let ev = &*(header as *const clap_event_header as *const clap_event_note);
                ReceivedEvent::NoteOff {
                    time: header.time,
                    channel: ev.channel,
                    key: ev.key,
                }
            }
            CLAP_EVENT_MIDI => {
                let ev = &*(header as *const clap_event_header as *const clap_event_midi);
                ReceivedEvent::Midi {
                    time: header.time,
                    data: ev.data,
                }
            }
            CLAP_EVENT_PARAM_VALUE => {
                let ev = &*(header as *const clap_event_header as *const clap_event_param_value);
                ReceivedEvent::ParamValue {
                    time: header.time,
                    id: ev.param_id,
                    value: ev.value,
                    cookie: ev.cookie as usize,
                }
            }
            CLAP_EVENT_PARAM_MOD => {
                let ev = &*(header as *const clap_event_header as *const clap_event_param_mod);
                ReceivedEvent::ParamMod {
                    time: header.time,
                    id: ev.param_id,
                    amount: ev.amount,
                    cookie: ev.cookie as usize,
                }
            }
            _ => continue,
        };
        state.received_events.push(received);
    }
}

unsafe fn emit_out_events(inner: &FakeInner, out_events: *const clap_output_events) {
    if out_events.is_null() {
        return;
    }
    let list = &*out_events;
    let Some(try_push) = list.try_push else {
        return;
    };

    for event in inner.queued_out.lock().drain(..) {
        match event {
            OutEvent::ParamValue { id, value } => {
                let ev = clap_event_param_value {
                    header: clap_event_header {
                        size: std::mem::size_of::<clap_event_param_value>() as u32,
                        time: 0,
                        space_id: CLAP_CORE_EVENT_SPACE_ID,
                        type_: CLAP_EVENT_PARAM_VALUE,
                        flags: 0,
                    },
                    param_id: id,
                    cookie: ptr::null_mut(),
                    note_id: -1,
                    port_index: -1,
                    channel: -1,
                    key: -1,
                    value,
                };
                try_push(list, &ev.header);
            }
            OutEvent::GestureBegin { id } | OutEvent::GestureEnd { id } => {
                let type_ = if matches!(event, OutEvent::GestureBegin { .. }) {
                    CLAP_EVENT_PARAM_GESTURE_BEGIN
                } else {
                    CLAP_EVENT_PARAM_GESTURE_END
                };
                let ev = clap_event_param_gesture {
                    header: clap_event_header {
                        size: std::mem::size_of::<clap_event_param_gesture>() as u32,
                        time: 0,
                        space_id: CLAP_CORE_EVENT_SPACE_ID,
                        type_,
                        flags: 0,
                    },
                    param_id: id,
                };
                try_push(list, &ev.header);
            }
        }
    }
}

unsafe extern "C" fn fake_process(
    plugin: *const clap_plugin,
    process: *const clap_process,
) -> clap_process_status {
    let inner = inner_of(plugin);
    let process = &*process;
    {
        let mut state = inner.state.lock();
        state.process_calls += 1;
        state.last_steady_time = process.steady_time;
    }
    record_in_events(inner, process.in_events);
    emit_out_events(inner, process.out_events);
    CLAP_PROCESS_CONTINUE
}

unsafe extern "C" fn fake_on_main_thread(plugin: *const clap_plugin) {
    inner_of(plugin).state.lock().on_main_thread_calls += 1;
}

unsafe extern "C" fn fake_get_extension(
    plugin: *const clap_plugin,
    id: *const c_char,
) -> *const c_void {
    let inner = inner_of(plugin);
    if id.is_null() {
        return ptr::null();
    }
    let id = CStr::from_ptr(id);

    if id == CLAP_EXT_PARAMS && inner.config.with_params {
        &FAKE_PARAMS as *const clap_plugin_params as *const c_void
    } else if id == CLAP_EXT_GUI && inner.config.with_gui {
        &FAKE_GUI as *const clap_plugin_gui as *const c_void
    } else if id == CLAP_EXT_STATE && inner.config.with_state {
        &FAKE_STATE as *const clap_plugin_state as *const c_void
    } else if id == CLAP_EXT_TIMER_SUPPORT && inner.config.with_timer_support {
        &FAKE_TIMER_SUPPORT as *const clap_plugin_timer_support as *const c_void
    } else if id == CLAP_EXT_POSIX_FD_SUPPORT && inner.config.with_posix_fd_support {
        &FAKE_POSIX_FD_SUPPORT as *const clap_plugin_posix_fd_support as *const c_void
    } else if id == CLAP_EXT_THREAD_POOL && inner.config.with_thread_pool {
        &FAKE_THREAD_POOL as *const clap_plugin_thread_pool as *const c_void
    } else if id == CLAP_EXT_PRESET_LOAD && inner.config.with_preset_load {
        &FAKE_PRESET_LOAD as *const clap_plugin_preset_load as *const c_void
    } else if id == CLAP_EXT_REMOTE_CONTROLS && inner.config.with_remote_controls {
        &FAKE_REMOTE_CONTROLS as *const clap_plugin_remote_controls as *const c_void
    } else {
        ptr::null()
    }
}

// ----------------------------------------------------------------------
// params
// ----------------------------------------------------------------------

static FAKE_PARAMS: clap_plugin_params = clap_plugin_params {
    count: Some(fake_params_count),
    get_info: Some(fake_params_get_info),
    get_value: Some(fake_params_get_value),
    value_to_text: Some(fake_params_value_to_text),
    text_to_value: Some(fake_params_text_to_value),
    flush: Some(fake_params_flush),
};

unsafe extern "C" fn fake_params_count(plugin: *const clap_plugin) -> u32 {
    inner_of(plugin).config.params.len() as u32
}

unsafe extern "C" fn fake_params_get_info(
    plugin: *const clap_plugin,
    index: u32,
    info: *mut clap_param_info,
) -> bool {
    let inner = inner_of(plugin);
    let Some(param) = inner.config.params.get(index as usize) else {
        return false;
    };
    let info = &mut *info;
    *info = std::mem::zeroed();
    info.id = param.id;
    info.flags = param.flags;
    info.cookie = param.cookie as *mut c_void;
    info.min_value = param.min;
    info.max_value = param.max;
    info.default_value = param.default;
    write_cbuf(&mut info.name, &param.name);
    write_cbuf(&mut info.module, "fake");
    true
}

unsafe extern "C" fn fake_params_get_value(
    plugin: *const clap_plugin,
    id: clap_id,
    value: *mut f64,
) -> bool {
    let inner = inner_of(plugin);
    match inner.state.lock().param_values.get(&id) {
        Some(v) => {
            *value = *v;
            true
        }
        None => false,
    }
}

unsafe extern "C" fn fake_params_value_to_text(
    _plugin: *const clap_plugin,
    _id: clap_id,
    value: f64,
    display: *mut c_char,
    size: u32,
) -> bool {
    let text = format!("{value:.1} fake");
    let dst = std::slice::from_raw_parts_mut(display, size as usize);
    write_cbuf(dst, &text);
    true
}

unsafe extern "C" fn fake_params_text_to_value(
    _plugin: *const clap_plugin,
    _id: clap_id,
    _text: *const c_char,
    _value: *mut f64,
) -> bool {
    false
}

unsafe extern "C" fn fake_params_flush(
    plugin: *const clap_plugin,
    in_events: *const clap_input_events,
    out_events: *const clap_output_events,
) {
    let inner = inner_of(plugin);
    inner.state.lock().flush_calls += 1;
    record_in_events(inner, in_events);
    emit_out_events(inner, out_events);
}

// ----------------------------------------------------------------------
// gui
// ----------------------------------------------------------------------

static FAKE_GUI: clap_plugin_gui = clap_plugin_gui {
    is_api_supported: Some(fake_gui_is_api_supported),
    get_preferred_api: Some(fake_gui_get_preferred_api),
    create: Some(fake_gui_create),
    destroy: Some(fake_gui_destroy),
    set_scale: Some(fake_gui_set_scale),
    get_size: Some(fake_gui_get_size),
    can_resize: Some(fake_gui_can_resize),
    get_resize_hints: Some(fake_gui_get_resize_hints),
    adjust_size: Some(fake_gui_adjust_size),
    set_size: Some(fake_gui_set_size),
    set_parent: Some(fake_gui_set_parent),
    set_transient: Some(fake_gui_set_transient),
    suggest_title: Some(fake_gui_suggest_title),
    show: Some(fake_gui_show),
    hide: Some(fake_gui_hide),
};

unsafe extern "C" fn fake_gui_is_api_supported(
    plugin: *const clap_plugin,
    _api: *const c_char,
    is_floating: bool,
) -> bool {
    let config = &inner_of(plugin).config;
    if is_floating {
        config.gui_floating_supported
    } else {
        config.gui_embedded_supported
    }
}

unsafe extern "C" fn fake_gui_get_preferred_api(
    _plugin: *const clap_plugin,
    _api: *mut *const c_char,
    _is_floating: *mut bool,
) -> bool {
    false
}

unsafe extern "C" fn fake_gui_create(
    plugin: *const clap_plugin,
    _api: *const c_char,
    _is_floating: bool,
) -> bool {
    inner_of(plugin).state.lock().gui_created = true;
    true
}

unsafe extern "C" fn fake_gui_destroy(plugin: *const clap_plugin) {
    let mut state = inner_of(plugin).state.lock();
    state.gui_created = false;
    state.gui_visible = false;
    state.gui_destroy_calls += 1;
}

unsafe extern "C" fn fake_gui_set_scale(_plugin: *const clap_plugin, _scale: f64) -> bool {
    true
}

unsafe extern "C" fn fake_gui_get_size(
    plugin: *const clap_plugin,
    width: *mut u32,
    height: *mut u32,
) -> bool {
    let config = &inner_of(plugin).config;
    if config.gui_size_fails {
        return false;
    }
    *width = config.gui_size.0;
    *height = config.gui_size.1;
    true
}

unsafe extern "C" fn fake_gui_can_resize(_plugin: *const clap_plugin) -> bool {
    false
}

unsafe extern "C" fn fake_gui_get_resize_hints(
    _plugin: *const clap_plugin,
    _hints: *mut clap_sys::ext::gui::clap_gui_resize_hints,
) -> bool {
    false
}

unsafe extern "C" fn fake_gui_adjust_size(
    _plugin: *const clap_plugin,
    _width: *mut u32,
    _height: *mut u32,
) -> bool {
    false
}

unsafe extern "C" fn fake_gui_set_size(
    _plugin: *const clap_plugin,
    _width: u32,
    _height: u32,
) -> bool {
    true
}

unsafe extern "C" fn fake_gui_set_parent(
    plugin: *const clap_plugin,
    _window: *const clap_window,
) -> bool {
    let inner = inner_of(plugin);
    if inner.config.gui_set_parent_fails {
        return false;
    }
    inner.state.lock().gui_parent_set = true;
    true
}

unsafe extern "C" fn fake_gui_set_transient(
    plugin: *const clap_plugin,
    _window: *const clap_window,
) -> bool {
    inner_of(plugin).state.lock().gui_transient_set = true;
    true
}

unsafe extern "C" fn fake_gui_suggest_title(_plugin: *const clap_plugin, _title: *const c_char) {}

unsafe extern "C" fn fake_gui_show(plugin: *const clap_plugin) -> bool {
    let mut state = inner_of(plugin).state.lock();
    state.gui_visible = true;
    state.gui_show_calls += 1;
    true
}

unsafe extern "C" fn fake_gui_hide(plugin: *const clap_plugin) -> bool {
    let mut state = inner_of(plugin).state.lock();
    state.gui_visible = false;
    state.gui_hide_calls += 1;
    true
}

// ----------------------------------------------------------------------
// state
// ----------------------------------------------------------------------

static FAKE_STATE: clap_plugin_state = clap_plugin_state {
    save: Some(fake_state_save),
    load: Some(fake_state_load),
};

unsafe extern "C" fn fake_state_save(
    plugin: *const clap_plugin,
    stream: *const clap_ostream,
) -> bool {
    let inner = inner_of(plugin);
    let stream = &*stream;
    let Some(write) = stream.write else {
        return false;
    };
    let payload = &inner.config.state_payload;
    let mut written = 0;
    while written < payload.len() {
        let n = write(
            stream,
            payload[written..].as_ptr() as *const c_void,
            (payload.len() - written) as u64,
        );
        if n <= 0 {
            return false;
        }
        written += n as usize;
    }
    true
}

unsafe extern "C" fn fake_state_load(
    plugin: *const clap_plugin,
    stream: *const clap_istream,
) -> bool {
    let inner = inner_of(plugin);
    let stream = &*stream;
    let Some(read) = stream.read else {
        return false;
    };
    let mut data = Vec::new();
    let mut chunk = [0u8; 64];
    loop {
        let n = read(stream, chunk.as_mut_ptr() as *mut c_void, chunk.len() as u64);
        if n < 0 {
            return false;
        }
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n as usize]);
    }
    inner.state.lock().loaded_state = data;
    true
}

// ----------------------------------------------------------------------
// timer / fd / thread pool / preset load / remote controls
// ----------------------------------------------------------------------

static FAKE_TIMER_SUPPORT: clap_plugin_timer_support = clap_plugin_timer_support {
    on_timer: Some(fake_on_timer),
};

unsafe extern "C" fn fake_on_timer(plugin: *const clap_plugin, timer_id: clap_id) {
    inner_of(plugin).state.lock().timer_fires.push(timer_id);
}

static FAKE_POSIX_FD_SUPPORT: clap_plugin_posix_fd_support = clap_plugin_posix_fd_support {
    on_fd: Some(fake_on_fd),
};

unsafe extern "C" fn fake_on_fd(plugin: *const clap_plugin, fd: i32, flags: u32) {
    inner_of(plugin).state.lock().fd_events.push((fd, flags));
}

static FAKE_THREAD_POOL: clap_plugin_thread_pool = clap_plugin_thread_pool {
    exec: Some(fake_thread_pool_exec),
};

unsafe extern "C" fn fake_thread_pool_exec(plugin: *const clap_plugin, task_index: u32) {
    inner_of(plugin)
        .state
        .lock()
        .thread_pool_tasks
        .push(task_index);
}

static FAKE_PRESET_LOAD: clap_plugin_preset_load = clap_plugin_preset_load {
    from_file: Some(fake_preset_from_file),
};

unsafe extern "C" fn fake_preset_from_file(
    plugin: *const clap_plugin,
    path: *const c_char,
) -> bool {
    let inner = inner_of(plugin);
    if inner.config.preset_load_fails {
        return false;
    }
    let path = CStr::from_ptr(path).to_string_lossy().into_owned();
    inner.state.lock().loaded_preset = Some(path);
    true
}

static FAKE_REMOTE_CONTROLS: clap_plugin_remote_controls = clap_plugin_remote_controls {
    count: Some(fake_remote_controls_count),
    get: Some(fake_remote_controls_get),
};

unsafe extern "C" fn fake_remote_controls_count(plugin: *const clap_plugin) -> u32 {
    inner_of(plugin).config.pages.len() as u32
}

unsafe extern "C" fn fake_remote_controls_get(
    plugin: *const clap_plugin,
    index: u32,
    page: *mut clap_remote_controls_page,
) -> bool {
    let inner = inner_of(plugin);
    let Some((id, name, param_ids)) = inner.config.pages.get(index as usize) else {
        return false;
    };
    let page = &mut *page;
    *page = std::mem::zeroed();
    page.page_id = *id;
    write_cbuf(&mut page.section_name, "fake");
    write_cbuf(&mut page.page_name, name);
    for (slot, value) in page
        .param_ids
        .iter_mut()
        .zip(param_ids.iter().chain(std::iter::repeat(&CLAP_INVALID_ID)))
        .take(CLAP_REMOTE_CONTROLS_COUNT as usize)
    {
        *slot = *value;
    }
    true
}

// ----------------------------------------------------------------------
// window host
// ----------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct RecordingWindowHost {
    resizes: Mutex<Vec<(u32, u32)>>,
    shows: AtomicUsize,
    hides: AtomicUsize,
}

impl RecordingWindowHost {
    pub fn resizes(&self) -> Vec<(u32, u32)> {
        self.resizes.lock().clone()
    }

    pub fn show_calls(&self) -> usize {
        self.shows.load(Ordering::SeqCst)
    }

    pub fn hide_calls(&self) -> usize {
        self.hides.load(Ordering::SeqCst)
    }
}

impl WindowHost for RecordingWindowHost {
    fn resize_plugin_view(&self, width: u32, height: u32) {
        self.resizes.lock().push((width, height));
    }

    fn show_plugin_window(&self) {
        self.shows.fetch_add(1, Ordering::SeqCst);
    }

    fn hide_plugin_window(&self) {
        self.hides.fetch_add(1, Ordering::SeqCst);
    }
}

impl WindowHost for std::sync::Arc<RecordingWindowHost> {
    fn resize_plugin_view(&self, width: u32, height: u32) {
        self.resizes.lock().push((width, height));
    }

    fn show_plugin_window(&self) {
        self.shows.fetch_add(1, Ordering::SeqCst);
    }

    fn hide_plugin_window(&self) {
        self.hides.fetch_add(1, Ordering::SeqCst);
    }
}
