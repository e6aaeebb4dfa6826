//! The host side of the CLAP ABI.
//!
//! `HostShared` is the state reachable from the `clap_host` pointer handed
//! to the plugin: the session state machine word, the schedule flags, the
//! parameter transport queues, and the main-thread registries. The extension
//! vtables below marshal plugin requests onto it.

use crate::events::{EventList, EventRef};
use crate::pages::PageRegistry;
use crate::params::{Cookie, ParamRegistry};
use crate::plugin::PluginHandle;
use crate::pool::WorkerPool;
use crate::queue::{CoalesceValue, ReducingQueue, ReducingQueueProducer};
use crate::session::SessionState;
use crate::thread;
use crate::timers::{FdWatches, TimerRegistry};

use arc_swap::ArcSwapOption;
use clap_sys::ext::draft::remote_controls::{clap_host_remote_controls, CLAP_EXT_REMOTE_CONTROLS};
use clap_sys::ext::gui::{clap_host_gui, CLAP_EXT_GUI};
use clap_sys::ext::log::{
    clap_host_log, clap_log_severity, CLAP_EXT_LOG, CLAP_LOG_DEBUG, CLAP_LOG_ERROR,
    CLAP_LOG_FATAL, CLAP_LOG_HOST_MISBEHAVING, CLAP_LOG_INFO, CLAP_LOG_PLUGIN_MISBEHAVING,
    CLAP_LOG_WARNING,
};
use clap_sys::ext::params::{
    clap_host_params, clap_param_clear_flags, clap_param_rescan_flags, CLAP_EXT_PARAMS,
};
use clap_sys::ext::posix_fd_support::{
    clap_host_posix_fd_support, clap_posix_fd_flags as clap_posix_fd_flags_t,
    CLAP_EXT_POSIX_FD_SUPPORT,
};
use clap_sys::ext::state::{clap_host_state, CLAP_EXT_STATE};
use clap_sys::ext::thread_check::{clap_host_thread_check, CLAP_EXT_THREAD_CHECK};
use clap_sys::ext::thread_pool::{clap_host_thread_pool, CLAP_EXT_THREAD_POOL};
use clap_sys::ext::timer_support::{clap_host_timer_support, CLAP_EXT_TIMER_SUPPORT};
use clap_sys::host::clap_host;
use clap_sys::id::clap_id;
use clap_sys::version::CLAP_VERSION;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// User-editable host policy flags.
#[derive(Debug, Clone, Copy)]
pub struct HostSettings {
    /// Attach the plugin-supplied cookie to synthesized parameter events.
    pub provide_cookie: bool,
    /// Treat parameter cookies as absent: store null and skip comparisons.
    pub zero_cookies: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            provide_cookie: true,
            zero_cookies: false,
        }
    }
}

/// Notifications drained by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// The parameter set changed wholesale.
    ParamsChanged,
    /// One parameter's value, modulation or gesture state changed.
    ParamAdjusted(clap_id),
    ControlPagesChanged,
    SelectedPageChanged(Option<clap_id>),
    StateMarkedDirty,
}

/// GUI requests the plugin raised from an arbitrary thread; fulfilled on the
/// main thread's idle pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuiRequest {
    Resize { width: u32, height: u32 },
    Show,
    Hide,
}

/// A main-to-audio parameter update.
#[derive(Clone, Copy)]
pub(crate) struct HostParamUpdate {
    pub cookie: Cookie,
    pub value: f64,
}

impl CoalesceValue for HostParamUpdate {}

/// An audio-to-main update whose value and gesture components merge
/// independently: a value change and a gesture notification for the same
/// parameter never overwrite each other.
#[derive(Clone, Copy, Default)]
pub(crate) struct PluginParamUpdate {
    pub value: Option<f64>,
    /// `Some(true)` for gesture begin, `Some(false)` for gesture end.
    pub gesture: Option<bool>,
}

impl CoalesceValue for PluginParamUpdate {
    fn update(&mut self, newer: &Self) {
        if newer.value.is_some() {
            self.value = newer.value;
        }
        if newer.gesture.is_some() {
            self.gesture = newer.gesture;
        }
    }
}

pub(crate) struct HostShared {
    pub state: AtomicU8,

    pub schedule_restart: AtomicBool,
    pub schedule_deactivate: AtomicBool,
    pub schedule_process: AtomicBool,
    pub schedule_param_flush: AtomicBool,
    pub schedule_main_thread_callback: AtomicBool,
    pub state_dirty: AtomicBool,

    pub provide_cookie: AtomicBool,
    pub zero_cookies: AtomicBool,

    /// The live plugin, published at load and cleared at unload.
    pub plugin: ArcSwapOption<PluginHandle>,
    pub pool: WorkerPool,

    pub value_queue: Arc<ReducingQueue<HostParamUpdate>>,
    pub mod_queue: Arc<ReducingQueue<HostParamUpdate>>,
    pub output_queue: Arc<ReducingQueue<PluginParamUpdate>>,

    /// Gesture bookkeeping for plugin output events. Only contended between
    /// the audio thread (while processing) and the main thread (flush while
    /// inactive), which the state machine makes mutually exclusive.
    pub adjusting: Mutex<HashMap<clap_id, bool>>,

    pub params: Mutex<ParamRegistry>,
    pub pages: Mutex<PageRegistry>,
    pub timers: Mutex<TimerRegistry>,
    pub fds: Mutex<FdWatches>,

    pub gui_requests_tx: Sender<GuiRequest>,
    pub gui_requests_rx: Receiver<GuiRequest>,
    notices_tx: Sender<SessionNotice>,
}

pub(crate) struct SharedHandles {
    pub shared: Arc<HostShared>,
    pub value_producer: ReducingQueueProducer<HostParamUpdate>,
    pub mod_producer: ReducingQueueProducer<HostParamUpdate>,
    pub output_producer: ReducingQueueProducer<PluginParamUpdate>,
    pub notices_rx: Receiver<SessionNotice>,
}

const QUEUE_CAPACITY: usize = 256;

pub(crate) fn create_shared(settings: HostSettings, pool: WorkerPool) -> SharedHandles {
    let (value_producer, value_queue) = ReducingQueue::with_capacity(QUEUE_CAPACITY);
    let (mod_producer, mod_queue) = ReducingQueue::with_capacity(QUEUE_CAPACITY);
    let (output_producer, output_queue) = ReducingQueue::with_capacity(QUEUE_CAPACITY);
    let (gui_requests_tx, gui_requests_rx) = crossbeam_channel::unbounded();
    let (notices_tx, notices_rx) = crossbeam_channel::unbounded();

    let shared = Arc::new(HostShared {
        state: AtomicU8::new(SessionState::Inactive as u8),
        schedule_restart: AtomicBool::new(false),
        schedule_deactivate: AtomicBool::new(false),
        schedule_process: AtomicBool::new(true),
        schedule_param_flush: AtomicBool::new(false),
        schedule_main_thread_callback: AtomicBool::new(false),
        state_dirty: AtomicBool::new(false),
        provide_cookie: AtomicBool::new(settings.provide_cookie),
        zero_cookies: AtomicBool::new(settings.zero_cookies),
        plugin: ArcSwapOption::empty(),
        pool,
        value_queue,
        mod_queue,
        output_queue,
        adjusting: Mutex::new(HashMap::new()),
        params: Mutex::new(ParamRegistry::new()),
        pages: Mutex::new(PageRegistry::new()),
        timers: Mutex::new(TimerRegistry::new()),
        fds: Mutex::new(FdWatches::new()),
        gui_requests_tx,
        gui_requests_rx,
        notices_tx,
    });

    SharedHandles {
        shared,
        value_producer,
        mod_producer,
        output_producer,
        notices_rx,
    }
}

impl HostShared {
    pub fn session_state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Advance the state machine, asserting the transition's precondition.
    pub fn set_session_state(&self, next: SessionState) {
        let current = self.session_state();
        next.assert_entered_from(current);
        self.state.store(next as u8, Ordering::SeqCst);
    }

    pub fn is_plugin_active(&self) -> bool {
        self.session_state().is_active()
    }

    pub fn is_plugin_processing(&self) -> bool {
        self.session_state() == SessionState::ActiveAndProcessing
    }

    pub fn is_plugin_sleeping(&self) -> bool {
        self.session_state() == SessionState::ActiveAndSleeping
    }

    pub fn plugin(&self) -> Option<Arc<PluginHandle>> {
        self.plugin.load_full()
    }

    pub fn notify(&self, notice: SessionNotice) {
        let _ = self.notices_tx.send(notice);
    }

    /// Record one side of a gesture bracket; mismatched brackets are a
    /// protocol violation.
    pub fn note_gesture(&self, param_id: clap_id, is_begin: bool) {
        let mut adjusting = self.adjusting.lock();
        let entry = adjusting.entry(param_id).or_insert(false);
        if is_begin {
            if *entry {
                panic!("the plugin sent GESTURE_BEGIN twice for parameter {param_id}");
            }
            *entry = true;
        } else {
            if !*entry {
                panic!(
                    "the plugin sent GESTURE_END without a preceding GESTURE_BEGIN \
                     for parameter {param_id}"
                );
            }
            *entry = false;
        }
    }

    /// Drain pending main-to-audio updates into a per-block input event
    /// list, one event per entry, timestamped at the start of the block.
    pub fn drain_param_queues_into(&self, list: &mut EventList) {
        let provide_cookie = self.provide_cookie.load(Ordering::Relaxed);
        let cookie_of = |cookie: Cookie| {
            if provide_cookie {
                cookie.as_ptr()
            } else {
                ptr::null_mut()
            }
        };

        self.value_queue.consume(|id, update| {
            list.push_param_value(0, id, cookie_of(update.cookie), update.value);
        });
        self.mod_queue.consume(|id, update| {
            list.push_param_mod(0, id, cookie_of(update.cookie), update.value);
        });
    }

    /// Audio-thread half of output-event routing: check gesture brackets and
    /// coalesce the updates toward the main thread.
    pub fn collect_output_events(
        &self,
        list: &EventList,
        producer: &mut ReducingQueueProducer<PluginParamUpdate>,
    ) {
        for event in list.iter() {
            match event {
                EventRef::ParamGestureBegin(ev) => {
                    self.note_gesture(ev.param_id, true);
                    producer.set_or_update(
                        ev.param_id,
                        PluginParamUpdate {
                            value: None,
                            gesture: Some(true),
                        },
                    );
                }
                EventRef::ParamGestureEnd(ev) => {
                    self.note_gesture(ev.param_id, false);
                    producer.set_or_update(
                        ev.param_id,
                        PluginParamUpdate {
                            value: None,
                            gesture: Some(false),
                        },
                    );
                }
                EventRef::ParamValue(ev) => {
                    producer.set_or_update(
                        ev.param_id,
                        PluginParamUpdate {
                            value: Some(ev.value),
                            gesture: None,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    /// Apply one coalesced update to the registry. Referencing an id the
    /// registry does not know is a protocol violation.
    pub fn apply_param_update(&self, param_id: clap_id, update: PluginParamUpdate) {
        let mut params = self.params.lock();
        let entry = params.get_mut(param_id).unwrap_or_else(|| {
            panic!("the plugin produced a parameter event with an unknown id: {param_id}")
        });
        if let Some(value) = update.value {
            entry.state.value = value;
        }
        if let Some(is_begin) = update.gesture {
            entry.state.is_adjusting = is_begin;
        }
        drop(params);
        self.notify(SessionNotice::ParamAdjusted(param_id));
    }

    /// Main-thread half of output-event routing, used by the inactive param
    /// flush: the updates go straight into the registry.
    pub fn apply_output_events_on_main_thread(&self, list: &EventList) {
        for event in list.iter() {
            match event {
                EventRef::ParamGestureBegin(ev) => {
                    self.note_gesture(ev.param_id, true);
                    self.apply_param_update(
                        ev.param_id,
                        PluginParamUpdate {
                            value: None,
                            gesture: Some(true),
                        },
                    );
                }
                EventRef::ParamGestureEnd(ev) => {
                    self.note_gesture(ev.param_id, false);
                    self.apply_param_update(
                        ev.param_id,
                        PluginParamUpdate {
                            value: None,
                            gesture: Some(false),
                        },
                    );
                }
                EventRef::ParamValue(ev) => {
                    self.apply_param_update(
                        ev.param_id,
                        PluginParamUpdate {
                            value: Some(ev.value),
                            gesture: None,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    /// Flush pending parameter updates through `params.flush` while the
    /// plugin is inactive.
    pub fn param_flush_on_main_thread(&self) {
        thread::assert_main_thread();
        assert!(
            !self.is_plugin_active(),
            "parameter flush on the main thread requires an inactive plugin"
        );
        self.schedule_param_flush.store(false, Ordering::SeqCst);

        let Some(plugin) = self.plugin() else {
            return;
        };

        let mut ev_in = EventList::new();
        let mut ev_out = EventList::new();
        self.drain_param_queues_into(&mut ev_in);

        if plugin.can_use_params() {
            let input = ev_in.as_input();
            let output = ev_out.as_output();
            plugin.params_flush(&input, &output);
        }
        self.apply_output_events_on_main_thread(&ev_out);
    }

    /// Flush now if legal, otherwise leave it to the process step (or to the
    /// idle pass once the plugin goes inactive).
    pub fn request_param_flush(&self) {
        if !self.is_plugin_active() && thread::is_main_thread() {
            self.param_flush_on_main_thread();
            return;
        }
        self.schedule_param_flush.store(true, Ordering::SeqCst);
    }

    /// Re-enumerate parameters under `flags`. A full rescan raises the bulk
    /// notification and refreshes the control pages.
    pub fn rescan_params(&self, flags: clap_param_rescan_flags) {
        thread::assert_main_thread();
        let Some(plugin) = self.plugin() else {
            return;
        };
        if !plugin.can_use_params() {
            return;
        }

        let zero_cookies = self.zero_cookies.load(Ordering::Relaxed);
        let bulk = self.params.lock().rescan(
            &*plugin,
            flags,
            self.is_plugin_active(),
            zero_cookies,
        );

        if bulk {
            self.notify(SessionNotice::ParamsChanged);
            if plugin.can_use_remote_controls() {
                self.rescan_pages(&plugin);
            }
        }
    }

    /// Wholesale replace the control pages from a fresh scan.
    pub fn rescan_pages(&self, plugin: &PluginHandle) {
        thread::assert_main_thread();
        let mut pages = self.pages.lock();
        pages.rescan(plugin);
        let selected = pages.selected();
        drop(pages);
        self.notify(SessionNotice::ControlPagesChanged);
        self.notify(SessionNotice::SelectedPageChanged(selected));
    }
}

/// The `clap_host` vtable handed to `create_plugin`, plus the shared state
/// it points at. Kept alive for the whole lifetime of the instance.
pub(crate) struct ClapHostHandle {
    host: Box<clap_host>,
    _shared: Arc<HostShared>,
}

impl ClapHostHandle {
    pub fn new(shared: Arc<HostShared>) -> Self {
        let host = Box::new(clap_host {
            clap_version: CLAP_VERSION,
            host_data: Arc::as_ptr(&shared) as *mut c_void,
            name: c"Attacca".as_ptr(),
            vendor: c"Attacca Project".as_ptr(),
            url: c"https://github.com/attacca-audio/attacca".as_ptr(),
            version: c"0.1.0".as_ptr(),
            get_extension: Some(host_get_extension),
            request_restart: Some(host_request_restart),
            request_process: Some(host_request_process),
            request_callback: Some(host_request_callback),
        });
        Self {
            host,
            _shared: shared,
        }
    }

    pub fn as_ptr(&self) -> *const clap_host {
        &*self.host
    }
}

/// Recover the shared state behind a `clap_host` pointer.
///
/// # Safety
/// `host` must be a pointer produced by [`ClapHostHandle`], and the handle
/// must still be alive.
unsafe fn shared_from<'a>(host: *const clap_host) -> &'a HostShared {
    &*((*host).host_data as *const HostShared)
}

unsafe extern "C" fn host_get_extension(
    host: *const clap_host,
    extension_id: *const c_char,
) -> *const c_void {
    let _ = host;
    if extension_id.is_null() {
        return ptr::null();
    }
    let id = CStr::from_ptr(extension_id);

    if id == CLAP_EXT_LOG {
        &HOST_LOG as *const clap_host_log as *const c_void
    } else if id == CLAP_EXT_THREAD_CHECK {
        &HOST_THREAD_CHECK as *const clap_host_thread_check as *const c_void
    } else if id == CLAP_EXT_PARAMS {
        &HOST_PARAMS as *const clap_host_params as *const c_void
    } else if id == CLAP_EXT_GUI {
        &HOST_GUI as *const clap_host_gui as *const c_void
    } else if id == CLAP_EXT_STATE {
        &HOST_STATE as *const clap_host_state as *const c_void
    } else if id == CLAP_EXT_TIMER_SUPPORT {
        &HOST_TIMER_SUPPORT as *const clap_host_timer_support as *const c_void
    } else if id == CLAP_EXT_POSIX_FD_SUPPORT {
        &HOST_POSIX_FD_SUPPORT as *const clap_host_posix_fd_support as *const c_void
    } else if id == CLAP_EXT_THREAD_POOL {
        &HOST_THREAD_POOL as *const clap_host_thread_pool as *const c_void
    } else if id == CLAP_EXT_REMOTE_CONTROLS {
        &HOST_REMOTE_CONTROLS as *const clap_host_remote_controls as *const c_void
    } else {
        ptr::null()
    }
}

unsafe extern "C" fn host_request_restart(host: *const clap_host) {
    shared_from(host)
        .schedule_restart
        .store(true, Ordering::SeqCst);
}

unsafe extern "C" fn host_request_process(host: *const clap_host) {
    shared_from(host)
        .schedule_process
        .store(true, Ordering::SeqCst);
}

unsafe extern "C" fn host_request_callback(host: *const clap_host) {
    shared_from(host)
        .schedule_main_thread_callback
        .store(true, Ordering::SeqCst);
}

// ----------------------------------------------------------------------
// clap_host_log
// ----------------------------------------------------------------------

static HOST_LOG: clap_host_log = clap_host_log {
    log: Some(host_log_log),
};

unsafe extern "C" fn host_log_log(
    _host: *const clap_host,
    severity: clap_log_severity,
    message: *const c_char,
) {
    let message = if message.is_null() {
        String::new()
    } else {
        CStr::from_ptr(message).to_string_lossy().into_owned()
    };
    match severity {
        CLAP_LOG_DEBUG => tracing::debug!(target: "plugin", "{message}"),
        CLAP_LOG_INFO => tracing::info!(target: "plugin", "{message}"),
        CLAP_LOG_WARNING => tracing::warn!(target: "plugin", "{message}"),
        CLAP_LOG_ERROR | CLAP_LOG_FATAL => tracing::error!(target: "plugin", "{message}"),
        CLAP_LOG_HOST_MISBEHAVING | CLAP_LOG_PLUGIN_MISBEHAVING => {
            tracing::error!(target: "plugin", "misbehaving: {message}")
        }
        _ => tracing::warn!(target: "plugin", "{message}"),
    }
}

// ----------------------------------------------------------------------
// clap_host_thread_check
// ----------------------------------------------------------------------

static HOST_THREAD_CHECK: clap_host_thread_check = clap_host_thread_check {
    is_main_thread: Some(host_is_main_thread),
    is_audio_thread: Some(host_is_audio_thread),
};

unsafe extern "C" fn host_is_main_thread(_host: *const clap_host) -> bool {
    thread::is_main_thread()
}

unsafe extern "C" fn host_is_audio_thread(_host: *const clap_host) -> bool {
    thread::is_audio_thread()
}

// ----------------------------------------------------------------------
// clap_host_params
// ----------------------------------------------------------------------

static HOST_PARAMS: clap_host_params = clap_host_params {
    rescan: Some(host_params_rescan),
    clear: Some(host_params_clear),
    request_flush: Some(host_params_request_flush),
};

unsafe extern "C" fn host_params_rescan(
    host: *const clap_host,
    flags: clap_param_rescan_flags,
) {
    thread::assert_main_thread();
    shared_from(host).rescan_params(flags);
}

unsafe extern "C" fn host_params_clear(
    _host: *const clap_host,
    _param_id: clap_id,
    _flags: clap_param_clear_flags,
) {
    thread::assert_main_thread();
}

unsafe extern "C" fn host_params_request_flush(host: *const clap_host) {
    shared_from(host).request_param_flush();
}

// ----------------------------------------------------------------------
// clap_host_gui
// ----------------------------------------------------------------------

static HOST_GUI: clap_host_gui = clap_host_gui {
    resize_hints_changed: Some(host_gui_resize_hints_changed),
    request_resize: Some(host_gui_request_resize),
    request_show: Some(host_gui_request_show),
    request_hide: Some(host_gui_request_hide),
    closed: Some(host_gui_closed),
};

unsafe extern "C" fn host_gui_resize_hints_changed(_host: *const clap_host) {}

unsafe extern "C" fn host_gui_request_resize(
    host: *const clap_host,
    width: u32,
    height: u32,
) -> bool {
    shared_from(host)
        .gui_requests_tx
        .send(GuiRequest::Resize { width, height })
        .is_ok()
}

unsafe extern "C" fn host_gui_request_show(host: *const clap_host) -> bool {
    shared_from(host).gui_requests_tx.send(GuiRequest::Show).is_ok()
}

unsafe extern "C" fn host_gui_request_hide(host: *const clap_host) -> bool {
    shared_from(host).gui_requests_tx.send(GuiRequest::Hide).is_ok()
}

unsafe extern "C" fn host_gui_closed(_host: *const clap_host, _was_destroyed: bool) {
    thread::assert_main_thread();
}

// ----------------------------------------------------------------------
// clap_host_state
// ----------------------------------------------------------------------

static HOST_STATE: clap_host_state = clap_host_state {
    mark_dirty: Some(host_state_mark_dirty),
};

unsafe extern "C" fn host_state_mark_dirty(host: *const clap_host) {
    thread::assert_main_thread();
    let shared = shared_from(host);
    assert!(
        shared.plugin().is_some_and(|p| p.can_use_state()),
        "the plugin called state.mark_dirty() without providing clap_plugin_state"
    );
    shared.state_dirty.store(true, Ordering::SeqCst);
    shared.notify(SessionNotice::StateMarkedDirty);
}

// ----------------------------------------------------------------------
// clap_host_timer_support
// ----------------------------------------------------------------------

static HOST_TIMER_SUPPORT: clap_host_timer_support = clap_host_timer_support {
    register_timer: Some(host_register_timer),
    unregister_timer: Some(host_unregister_timer),
};

unsafe extern "C" fn host_register_timer(
    host: *const clap_host,
    period_ms: u32,
    timer_id: *mut clap_id,
) -> bool {
    thread::assert_main_thread();
    let shared = shared_from(host);
    assert!(
        shared.plugin().is_some_and(|p| p.can_use_timer_support()),
        "the plugin called register_timer() without providing clap_plugin_timer_support"
    );
    if timer_id.is_null() {
        return false;
    }
    *timer_id = shared.timers.lock().register(period_ms, Instant::now());
    true
}

unsafe extern "C" fn host_unregister_timer(host: *const clap_host, timer_id: clap_id) -> bool {
    thread::assert_main_thread();
    let shared = shared_from(host);
    assert!(
        shared.plugin().is_some_and(|p| p.can_use_timer_support()),
        "the plugin called unregister_timer() without providing clap_plugin_timer_support"
    );
    shared.timers.lock().unregister(timer_id);
    true
}

// ----------------------------------------------------------------------
// clap_host_posix_fd_support
// ----------------------------------------------------------------------

static HOST_POSIX_FD_SUPPORT: clap_host_posix_fd_support = clap_host_posix_fd_support {
    register_fd: Some(host_register_fd),
    modify_fd: Some(host_modify_fd),
    unregister_fd: Some(host_unregister_fd),
};

unsafe extern "C" fn host_register_fd(
    host: *const clap_host,
    fd: i32,
    flags: clap_posix_fd_flags_t,
) -> bool {
    thread::assert_main_thread();
    let shared = shared_from(host);
    assert!(
        shared.plugin().is_some_and(|p| p.can_use_posix_fd_support()),
        "the plugin called register_fd() without providing clap_plugin_posix_fd_support"
    );
    shared.fds.lock().register(fd, flags);
    true
}

unsafe extern "C" fn host_modify_fd(
    host: *const clap_host,
    fd: i32,
    flags: clap_posix_fd_flags_t,
) -> bool {
    thread::assert_main_thread();
    let shared = shared_from(host);
    assert!(
        shared.plugin().is_some_and(|p| p.can_use_posix_fd_support()),
        "the plugin called modify_fd() without providing clap_plugin_posix_fd_support"
    );
    shared.fds.lock().modify(fd, flags);
    true
}

unsafe extern "C" fn host_unregister_fd(host: *const clap_host, fd: i32) -> bool {
    thread::assert_main_thread();
    let shared = shared_from(host);
    assert!(
        shared.plugin().is_some_and(|p| p.can_use_posix_fd_support()),
        "the plugin called unregister_fd() without providing clap_plugin_posix_fd_support"
    );
    shared.fds.lock().unregister(fd);
    true
}

// ----------------------------------------------------------------------
// clap_host_thread_pool
// ----------------------------------------------------------------------

static HOST_THREAD_POOL: clap_host_thread_pool = clap_host_thread_pool {
    request_exec: Some(host_thread_pool_request_exec),
};

unsafe extern "C" fn host_thread_pool_request_exec(
    host: *const clap_host,
    num_tasks: u32,
) -> bool {
    thread::assert_audio_thread();
    let shared = shared_from(host);
    assert!(
        shared.plugin().is_some_and(|p| p.can_use_thread_pool()),
        "the plugin called request_exec() without providing clap_plugin_thread_pool"
    );
    shared.pool.request_exec(num_tasks);
    true
}

// ----------------------------------------------------------------------
// clap_host_remote_controls
// ----------------------------------------------------------------------

static HOST_REMOTE_CONTROLS: clap_host_remote_controls = clap_host_remote_controls {
    changed: Some(host_remote_controls_changed),
    suggest_page: Some(host_remote_controls_suggest_page),
};

unsafe extern "C" fn host_remote_controls_changed(host: *const clap_host) {
    thread::assert_main_thread();
    let shared = shared_from(host);
    let plugin = shared
        .plugin()
        .filter(|p| p.can_use_remote_controls())
        .unwrap_or_else(|| {
            panic!(
                "the plugin called remote_controls.changed() without providing \
                 clap_plugin_remote_controls"
            )
        });
    shared.rescan_pages(&plugin);
}

unsafe extern "C" fn host_remote_controls_suggest_page(
    host: *const clap_host,
    page_id: clap_id,
) {
    thread::assert_main_thread();
    let shared = shared_from(host);
    assert!(
        shared.plugin().is_some_and(|p| p.can_use_remote_controls()),
        "the plugin called remote_controls.suggest_page() without providing \
         clap_plugin_remote_controls"
    );
    tracing::debug!("plugin suggested control page {page_id}");
}
