//! The plugin session: main-thread lifecycle and the state machine.
//!
//! A session owns the loaded module, the live plugin instance and the
//! activation state, and mediates every cross-thread request. Its audio
//! counterpart is [`crate::process::AudioProcessor`]; the two halves share
//! state only through atomics and the coalescing queues.

use crate::error::{HostError, LoadStage, Result};
use crate::gui::{GuiNegotiator, WindowHandle, WindowHost};
use crate::host::{
    create_shared, ClapHostHandle, GuiRequest, HostParamUpdate, HostSettings, HostShared,
    SessionNotice,
};
use crate::pages::ControlPage;
use crate::params::ParamEntry;
use crate::plugin::{PluginDescriptor, PluginHandle, PluginModule};
use crate::pool::{PoolTask, WorkerPool};
use crate::process::AudioProcessor;
use crate::queue::ReducingQueueProducer;
use crate::thread::{self, ThreadRole};

use clap_sys::ext::params::CLAP_PARAM_RESCAN_ALL;
use clap_sys::id::clap_id;
use clap_sys::stream::{clap_istream, clap_ostream};
use crossbeam_channel::Receiver;
use std::ffi::CString;
use std::os::raw::c_void;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the session is in the activation/processing lifecycle.
///
/// Every transition asserts its precondition; an undeclared transition is a
/// programming-contract failure, not a recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Only the main thread uses the plugin.
    Inactive = 0,
    /// Activation failed.
    InactiveWithError = 1,
    /// Active; the audio thread may start processing.
    ActiveAndSleeping = 2,
    ActiveAndProcessing = 3,
    /// Processing could not start; rendering is skipped until reactivation.
    ActiveWithError = 4,
    /// The audio thread acknowledged a stop request; the main thread may
    /// finalize deactivation.
    ActiveAndReadyToDeactivate = 5,
}

impl SessionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Inactive,
            1 => Self::InactiveWithError,
            2 => Self::ActiveAndSleeping,
            3 => Self::ActiveAndProcessing,
            4 => Self::ActiveWithError,
            5 => Self::ActiveAndReadyToDeactivate,
            _ => unreachable!("corrupt session state value {value}"),
        }
    }

    pub fn is_active(self) -> bool {
        !matches!(self, Self::Inactive | Self::InactiveWithError)
    }

    pub(crate) fn assert_entered_from(self, current: SessionState) {
        use SessionState::*;
        let legal = match self {
            Inactive => current == ActiveAndReadyToDeactivate,
            InactiveWithError => matches!(current, Inactive | InactiveWithError),
            ActiveAndSleeping => {
                matches!(current, Inactive | InactiveWithError | ActiveAndProcessing)
            }
            ActiveAndProcessing => current == ActiveAndSleeping,
            ActiveWithError => current == ActiveAndSleeping,
            ActiveAndReadyToDeactivate => {
                matches!(current, ActiveAndProcessing | ActiveAndSleeping | ActiveWithError)
            }
        };
        assert!(legal, "illegal session state transition: {current:?} -> {self:?}");
    }
}

const DEACTIVATE_POLL: Duration = Duration::from_millis(10);

pub struct PluginSession {
    // Field order doubles as drop order: plugin resources go down before the
    // host vtable and shared state they point into.
    module: Option<PluginModule>,
    handle: Option<Arc<PluginHandle>>,
    descriptor: Option<PluginDescriptor>,
    gui: GuiNegotiator,
    window_host: Box<dyn WindowHost>,
    parent_window: Option<WindowHandle>,
    value_producer: ReducingQueueProducer<HostParamUpdate>,
    mod_producer: ReducingQueueProducer<HostParamUpdate>,
    last_sample_rate: f64,
    last_block_size: u32,
    notices_rx: Receiver<SessionNotice>,
    clap_host: ClapHostHandle,
    shared: Arc<HostShared>,
}

impl PluginSession {
    /// Create the session and its audio-thread counterpart.
    ///
    /// The calling thread becomes the main thread; the worker pool is sized
    /// to the hardware and lives until the session is dropped.
    pub fn new(
        settings: HostSettings,
        window_host: Box<dyn WindowHost>,
    ) -> (Self, AudioProcessor) {
        thread::set_role(ThreadRole::Main);

        let handles = create_shared(settings, WorkerPool::new());
        let clap_host = ClapHostHandle::new(Arc::clone(&handles.shared));
        let processor = AudioProcessor::new(Arc::clone(&handles.shared), handles.output_producer);

        let session = Self {
            module: None,
            handle: None,
            descriptor: None,
            gui: GuiNegotiator::new(),
            window_host,
            parent_window: None,
            value_producer: handles.value_producer,
            mod_producer: handles.mod_producer,
            last_sample_rate: 0.0,
            last_block_size: 0,
            notices_rx: handles.notices_rx,
            clap_host,
            shared: handles.shared,
        };
        (session, processor)
    }

    /// The notification stream the UI layer drains.
    pub fn notices(&self) -> Receiver<SessionNotice> {
        self.notices_rx.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.shared.session_state()
    }

    pub fn descriptor(&self) -> Option<&PluginDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_state_dirty(&self) -> bool {
        self.shared.state_dirty.load(Ordering::SeqCst)
    }

    pub fn set_provide_cookie(&self, provide: bool) {
        self.shared.provide_cookie.store(provide, Ordering::Relaxed);
    }

    pub fn set_zero_cookies(&self, zero: bool) {
        self.shared.zero_cookies.store(zero, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // Load / unload
    // ------------------------------------------------------------------

    /// Load a plugin module and instantiate the descriptor at
    /// `plugin_index`. Replaces any plugin already loaded.
    pub fn load(&mut self, path: &Path, plugin_index: u32) -> Result<()> {
        thread::assert_main_thread();

        if self.module.is_some() {
            self.unload();
        }

        let module = PluginModule::open(path)?;
        let descriptor = module.descriptor(plugin_index)?;
        let handle = Arc::new(module.create_instance(self.clap_host.as_ptr(), plugin_index)?);

        // Publish before init so host callbacks made during init can reach
        // the instance.
        self.shared.plugin.store(Some(Arc::clone(&handle)));
        if !handle.init() {
            self.shared.plugin.store(None);
            handle.destroy();
            return Err(HostError::LoadFailed {
                path: path.to_path_buf(),
                stage: LoadStage::Initialization,
                reason: format!("plugin {} failed to init", descriptor.id),
            });
        }

        self.shared
            .pool
            .set_target(Some(Arc::clone(&handle) as Arc<dyn PoolTask>));
        self.module = Some(module);
        self.handle = Some(Arc::clone(&handle));

        self.shared.rescan_params(CLAP_PARAM_RESCAN_ALL);
        if !handle.can_use_params() && handle.can_use_remote_controls() {
            self.shared.rescan_pages(&handle);
        }

        tracing::info!(
            "loaded plugin '{}' ({}) from {}",
            descriptor.name,
            descriptor.id,
            path.display()
        );
        self.descriptor = Some(descriptor);
        Ok(())
    }

    /// Destroy the instance and close the module. Forces deactivation first.
    pub fn unload(&mut self) {
        thread::assert_main_thread();

        let Some(handle) = self.handle.take() else {
            self.module = None;
            return;
        };

        self.gui.destroy(&handle);
        self.deactivate();

        self.shared.pool.set_target(None);
        self.shared.plugin.store(None);
        handle.destroy();

        self.shared.params.lock().clear();
        self.shared.pages.lock().clear();
        self.shared.timers.lock().clear();
        self.shared.fds.lock().clear();
        self.shared.adjusting.lock().clear();
        self.value_producer.clear();
        self.mod_producer.clear();
        self.shared.output_queue.consume(|_, _| {});
        while self.shared.gui_requests_rx.try_recv().is_ok() {}

        self.shared.schedule_restart.store(false, Ordering::SeqCst);
        self.shared.schedule_param_flush.store(false, Ordering::SeqCst);
        self.shared
            .schedule_main_thread_callback
            .store(false, Ordering::SeqCst);
        self.shared.schedule_process.store(true, Ordering::SeqCst);
        self.shared.state_dirty.store(false, Ordering::SeqCst);

        self.descriptor = None;
        self.module = None;
        tracing::info!("unloaded plugin");
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    pub fn can_activate(&self) -> bool {
        thread::assert_main_thread();
        self.handle.is_some()
            && !self.shared.is_plugin_active()
            && !self.shared.schedule_restart.load(Ordering::SeqCst)
    }

    /// Bind the plugin to a sample rate and block size so it may process.
    ///
    /// Activating an already active plugin is a contract violation. If the
    /// plugin rejects activation the session lands in
    /// [`SessionState::InactiveWithError`] and the failure is returned.
    pub fn activate(&mut self, sample_rate: f64, block_size: u32) -> Result<()> {
        thread::assert_main_thread();
        let Some(handle) = &self.handle else {
            return Err(HostError::NotLoaded);
        };
        assert!(
            !self.shared.is_plugin_active(),
            "activate() called while the plugin is already active"
        );

        if !handle.activate(sample_rate, block_size, block_size) {
            self.shared.set_session_state(SessionState::InactiveWithError);
            return Err(HostError::ActivationFailed {
                sample_rate,
                block_size,
            });
        }

        self.last_sample_rate = sample_rate;
        self.last_block_size = block_size;
        self.shared.schedule_process.store(true, Ordering::SeqCst);
        self.shared.set_session_state(SessionState::ActiveAndSleeping);
        Ok(())
    }

    /// Stop the audio side and deactivate the plugin. Idempotent: calling
    /// it while inactive is a no-op.
    ///
    /// Blocks in bounded polling steps until the audio thread acknowledges
    /// the stop request, so the audio callback must keep running while this
    /// is in flight.
    pub fn deactivate(&mut self) {
        thread::assert_main_thread();
        if !self.shared.is_plugin_active() {
            return;
        }

        while matches!(
            self.shared.session_state(),
            SessionState::ActiveAndProcessing
                | SessionState::ActiveAndSleeping
                | SessionState::ActiveWithError
        ) {
            self.shared.schedule_deactivate.store(true, Ordering::SeqCst);
            std::thread::sleep(DEACTIVATE_POLL);
        }
        self.shared.schedule_deactivate.store(false, Ordering::SeqCst);

        if let Some(handle) = &self.handle {
            handle.deactivate();
        }
        self.shared.set_session_state(SessionState::Inactive);
    }

    // ------------------------------------------------------------------
    // Idle pass
    // ------------------------------------------------------------------

    /// One main-thread idle tick: push pending parameter updates toward the
    /// audio thread, apply plugin output updates, serve marshalled GUI
    /// requests, fire timers and fd watches, and honor restart/callback
    /// requests.
    pub fn idle(&mut self) {
        thread::assert_main_thread();

        self.value_producer.publish();
        self.mod_producer.publish();

        let shared = Arc::clone(&self.shared);
        shared
            .output_queue
            .consume(|id, update| shared.apply_param_update(id, update));

        if shared.schedule_param_flush.load(Ordering::SeqCst) && !shared.is_plugin_active() {
            shared.param_flush_on_main_thread();
        }

        while let Ok(request) = shared.gui_requests_rx.try_recv() {
            match request {
                GuiRequest::Resize { width, height } => {
                    self.window_host.resize_plugin_view(width, height);
                }
                GuiRequest::Show => {
                    self.window_host.show_plugin_window();
                    if let Some(handle) = &self.handle {
                        self.gui.set_visibility(handle, true);
                    }
                }
                GuiRequest::Hide => {
                    self.window_host.hide_plugin_window();
                    if let Some(handle) = &self.handle {
                        self.gui.set_visibility(handle, false);
                    }
                }
            }
        }

        if let Some(handle) = &self.handle {
            let due = shared.timers.lock().due(Instant::now());
            for timer_id in due {
                handle.on_timer(timer_id);
            }

            #[cfg(unix)]
            for (fd, flags) in shared.fds.lock().poll_ready() {
                handle.on_fd(fd, flags);
            }
        }

        if shared
            .schedule_main_thread_callback
            .swap(false, Ordering::SeqCst)
        {
            if let Some(handle) = &self.handle {
                handle.on_main_thread();
            }
        }

        if shared.schedule_restart.load(Ordering::SeqCst) && self.last_block_size != 0 {
            self.deactivate();
            shared.schedule_restart.store(false, Ordering::SeqCst);
            if let Err(err) = self.activate(self.last_sample_rate, self.last_block_size) {
                tracing::warn!("restart requested by the plugin failed: {err}");
            }
        }
    }

    // ------------------------------------------------------------------
    // Parameters and pages
    // ------------------------------------------------------------------

    /// Set a parameter's value. The id must exist and the value must lie in
    /// the descriptor's range; anything else is a contract violation.
    pub fn set_param_value(&mut self, param_id: clap_id, value: f64) {
        thread::assert_main_thread();
        let cookie = {
            let mut params = self.shared.params.lock();
            let entry = params.get_mut(param_id).unwrap_or_else(|| {
                panic!("set_param_value() called with an unknown parameter id: {param_id}")
            });
            if !entry.info.is_value_valid(value) {
                panic!(
                    "invalid value {value} for parameter {param_id} ({}..={})",
                    entry.info.min_value, entry.info.max_value
                );
            }
            entry.state.value = value;
            entry.info.cookie
        };

        self.value_producer.set(param_id, HostParamUpdate { cookie, value });
        self.value_producer.publish();
        self.shared.request_param_flush();
    }

    /// Set a parameter's modulation offset. Same contract as
    /// [`PluginSession::set_param_value`].
    pub fn set_param_modulation(&mut self, param_id: clap_id, amount: f64) {
        thread::assert_main_thread();
        let cookie = {
            let mut params = self.shared.params.lock();
            let entry = params.get_mut(param_id).unwrap_or_else(|| {
                panic!("set_param_modulation() called with an unknown parameter id: {param_id}")
            });
            if !entry.info.is_value_valid(amount) {
                panic!(
                    "invalid modulation {amount} for parameter {param_id} ({}..={})",
                    entry.info.min_value, entry.info.max_value
                );
            }
            entry.state.modulation = amount;
            entry.info.cookie
        };

        self.mod_producer
            .set(param_id, HostParamUpdate { cookie, value: amount });
        self.mod_producer.publish();
        self.shared.request_param_flush();
    }

    /// Snapshot of the parameter registry for the UI layer.
    pub fn params(&self) -> Vec<ParamEntry> {
        thread::assert_main_thread();
        self.shared.params.lock().entries().cloned().collect()
    }

    pub fn pages(&self) -> Vec<ControlPage> {
        thread::assert_main_thread();
        self.shared.pages.lock().pages().to_vec()
    }

    pub fn selected_page(&self) -> Option<clap_id> {
        thread::assert_main_thread();
        self.shared.pages.lock().selected()
    }

    /// Select a control page. The id must exist.
    pub fn select_page(&mut self, page: Option<clap_id>) {
        thread::assert_main_thread();
        let changed = self.shared.pages.lock().select(page);
        if changed {
            self.shared.notify(SessionNotice::SelectedPageChanged(page));
        }
    }

    /// Render a parameter value the way the plugin displays it.
    pub fn param_value_to_text(&self, param_id: clap_id, value: f64) -> String {
        thread::assert_main_thread();
        let Some(handle) = &self.handle else {
            return "-".to_string();
        };
        if !handle.can_use_params() {
            return "-".to_string();
        }
        handle
            .param_value_to_text(param_id, value)
            .unwrap_or_else(|| format!("{value}"))
    }

    // ------------------------------------------------------------------
    // GUI
    // ------------------------------------------------------------------

    /// Negotiate the plugin's surface into (or alongside) `parent`.
    pub fn set_parent_window(&mut self, parent: WindowHandle) -> Result<()> {
        thread::assert_main_thread();
        self.parent_window = Some(parent);
        let Some(handle) = &self.handle else {
            return Err(HostError::NotLoaded);
        };
        if !handle.can_use_gui() {
            return Ok(());
        }
        self.gui.attach(handle, parent, self.window_host.as_ref())
    }

    pub fn set_window_visibility(&mut self, visible: bool) {
        thread::assert_main_thread();
        if let Some(handle) = &self.handle {
            self.gui.set_visibility(handle, visible);
        }
    }

    /// Re-run GUI negotiation against the last parent window.
    pub fn recreate_plugin_window(&mut self) -> Result<()> {
        thread::assert_main_thread();
        match self.parent_window {
            Some(parent) => self.set_parent_window(parent),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Presets and state files
    // ------------------------------------------------------------------

    /// Hand a native preset file to the plugin's preset loader.
    pub fn load_native_preset(&mut self, path: &Path) -> Result<()> {
        thread::assert_main_thread();
        let Some(handle) = &self.handle else {
            return Err(HostError::NotLoaded);
        };
        if !handle.can_use_preset_load() {
            return Err(HostError::PresetLoadUnsupported);
        }
        let c_path = CString::new(path.to_string_lossy().into_owned())
            .map_err(|_| HostError::PresetLoadFailed(path.to_path_buf()))?;
        if handle.preset_load_from_file(&c_path) {
            Ok(())
        } else {
            Err(HostError::PresetLoadFailed(path.to_path_buf()))
        }
    }

    pub fn save_state_to_file(&self, path: &Path) -> Result<()> {
        thread::assert_main_thread();
        let Some(handle) = &self.handle else {
            return Err(HostError::NotLoaded);
        };
        if !handle.can_use_state() {
            return Err(HostError::StateUnsupported);
        }

        let mut buffer = Vec::new();
        let stream = output_stream(&mut buffer);
        if !handle.state_save(&stream) {
            return Err(HostError::StateSave("plugin state save failed".into()));
        }
        std::fs::write(path, &buffer)?;
        Ok(())
    }

    pub fn load_state_from_file(&mut self, path: &Path) -> Result<()> {
        thread::assert_main_thread();
        let Some(handle) = &self.handle else {
            return Err(HostError::NotLoaded);
        };
        if !handle.can_use_state() {
            return Err(HostError::StateUnsupported);
        }

        let data = std::fs::read(path)?;
        let mut cursor = ReadCursor {
            data: &data,
            position: 0,
        };
        let stream = input_stream(&mut cursor);
        if !handle.state_load(&stream) {
            return Err(HostError::StateRestore("plugin state load failed".into()));
        }
        Ok(())
    }
}

impl Drop for PluginSession {
    fn drop(&mut self) {
        self.unload();
        self.shared.pool.shutdown();
    }
}

// ----------------------------------------------------------------------
// State streams
// ----------------------------------------------------------------------

fn output_stream(buffer: &mut Vec<u8>) -> clap_ostream {
    unsafe extern "C" fn write(
        stream: *const clap_ostream,
        buffer: *const c_void,
        size: u64,
    ) -> i64 {
        let out = &mut *((*stream).ctx as *mut Vec<u8>);
        let data = std::slice::from_raw_parts(buffer as *const u8, size as usize);
        out.extend_from_slice(data);
        size as i64
    }

    clap_ostream {
        ctx: buffer as *mut Vec<u8> as *mut c_void,
        write: Some(write),
    }
}

struct ReadCursor<'a> {
    data: &'a [u8],
    position: usize,
}

fn input_stream(cursor: &mut ReadCursor<'_>) -> clap_istream {
    unsafe extern "C" fn read(
        stream: *const clap_istream,
        buffer: *mut c_void,
        size: u64,
    ) -> i64 {
        let cursor = &mut *((*stream).ctx as *mut ReadCursor<'_>);
        let remaining = cursor.data.len() - cursor.position;
        let to_read = (size as usize).min(remaining);
        if to_read == 0 {
            return 0;
        }

        let source = &cursor.data[cursor.position..cursor.position + to_read];
        std::slice::from_raw_parts_mut(buffer as *mut u8, to_read).copy_from_slice(source);
        cursor.position += to_read;
        to_read as i64
    }

    clap_istream {
        ctx: cursor as *mut ReadCursor<'_> as *mut c_void,
        read: Some(read),
    }
}
