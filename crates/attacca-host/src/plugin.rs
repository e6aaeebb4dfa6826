//! CLAP module loading and the plugin proxy.
//!
//! `PluginModule` owns the dynamic library, its entry point and factory.
//! `PluginHandle` wraps the instantiated plugin as a capability-checked
//! proxy: extension pointers are resolved once after `init`, and the
//! `can_use_*` queries collapse the per-call "did the plugin implement this"
//! checks into a construction-time capability set.

use crate::error::{HostError, LoadStage, Result};
use crate::pages::{ControlPage, PageScanSource};
use crate::params::{ParamInfo, ParamScanSource};
use crate::pool::PoolTask;

use clap_sys::entry::clap_plugin_entry;
use clap_sys::ext::draft::preset_load::{clap_plugin_preset_load, CLAP_EXT_PRESET_LOAD};
use clap_sys::ext::draft::remote_controls::{
    clap_plugin_remote_controls, clap_remote_controls_page, CLAP_EXT_REMOTE_CONTROLS,
};
use clap_sys::ext::gui::{clap_plugin_gui, clap_window, CLAP_EXT_GUI};
use clap_sys::ext::params::{clap_param_info, clap_plugin_params, CLAP_EXT_PARAMS};
use clap_sys::ext::posix_fd_support::{clap_plugin_posix_fd_support, CLAP_EXT_POSIX_FD_SUPPORT};
use clap_sys::ext::state::{clap_plugin_state, CLAP_EXT_STATE};
use clap_sys::ext::thread_pool::{clap_plugin_thread_pool, CLAP_EXT_THREAD_POOL};
use clap_sys::ext::timer_support::{clap_plugin_timer_support, CLAP_EXT_TIMER_SUPPORT};
use clap_sys::factory::plugin_factory::{clap_plugin_factory, CLAP_PLUGIN_FACTORY_ID};
use clap_sys::host::clap_host;
use clap_sys::id::clap_id;
use clap_sys::plugin::clap_plugin;
use clap_sys::process::{clap_process, clap_process_status, CLAP_PROCESS_ERROR};
use clap_sys::stream::{clap_istream, clap_ostream};
use clap_sys::version::clap_version_is_compatible;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Static identity of one plugin variant inside a module.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub version: String,
}

unsafe fn lossy_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// A loaded plugin module: the dynamic library plus the factory it exposes.
pub struct PluginModule {
    entry: *const clap_plugin_entry,
    factory: *const clap_plugin_factory,
    path: PathBuf,
    // Dropped last so every pointer above stays valid until then.
    _library: libloading::Library,
}

// Safety: the module is only used from the main thread; the raw pointers are
// into the library's own memory, which lives as long as the module.
unsafe impl Send for PluginModule {}

impl PluginModule {
    pub fn open(path: &Path) -> Result<Self> {
        let load_failed = |stage: LoadStage, reason: String| HostError::LoadFailed {
            path: path.to_path_buf(),
            stage,
            reason,
        };

        let library = unsafe {
            libloading::Library::new(path)
                .map_err(|e| load_failed(LoadStage::Opening, format!("failed to load library: {e}")))?
        };

        let entry: *const clap_plugin_entry = unsafe {
            *library
                .get::<*const clap_plugin_entry>(b"clap_entry\0")
                .map_err(|e| load_failed(LoadStage::Entry, format!("no clap_entry symbol: {e}")))?
        };
        if entry.is_null() {
            return Err(load_failed(LoadStage::Entry, "clap_entry is null".into()));
        }

        let path_cstr = CString::new(path.to_string_lossy().into_owned())
            .map_err(|_| load_failed(LoadStage::Entry, "path contains a null byte".into()))?;

        let entry_ref = unsafe { &*entry };
        let init = entry_ref
            .init
            .ok_or_else(|| load_failed(LoadStage::Entry, "entry has no init function".into()))?;
        if !unsafe { init(path_cstr.as_ptr()) } {
            return Err(load_failed(LoadStage::Entry, "entry init failed".into()));
        }

        let get_factory = entry_ref.get_factory.ok_or_else(|| {
            load_failed(LoadStage::Factory, "entry has no get_factory function".into())
        })?;
        let factory =
            unsafe { get_factory(CLAP_PLUGIN_FACTORY_ID.as_ptr()) } as *const clap_plugin_factory;
        if factory.is_null() {
            unsafe {
                if let Some(deinit) = entry_ref.deinit {
                    deinit();
                }
            }
            return Err(load_failed(LoadStage::Factory, "no plugin factory".into()));
        }

        Ok(Self {
            entry,
            factory,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptor_count(&self) -> u32 {
        let factory = unsafe { &*self.factory };
        match factory.get_plugin_count {
            Some(f) => unsafe { f(self.factory) },
            None => 0,
        }
    }

    fn raw_descriptor(&self, index: u32) -> Result<&clap_sys::plugin::clap_plugin_descriptor> {
        let count = self.descriptor_count();
        if index >= count {
            return Err(HostError::LoadFailed {
                path: self.path.clone(),
                stage: LoadStage::Factory,
                reason: format!("plugin index {index} out of range, module has {count}"),
            });
        }
        let factory = unsafe { &*self.factory };
        let get_descriptor = factory.get_plugin_descriptor.ok_or_else(|| HostError::LoadFailed {
            path: self.path.clone(),
            stage: LoadStage::Factory,
            reason: "factory has no get_plugin_descriptor function".into(),
        })?;
        let desc = unsafe { get_descriptor(self.factory, index) };
        if desc.is_null() {
            return Err(HostError::LoadFailed {
                path: self.path.clone(),
                stage: LoadStage::Factory,
                reason: format!("no plugin descriptor at index {index}"),
            });
        }
        Ok(unsafe { &*desc })
    }

    pub fn descriptor(&self, index: u32) -> Result<PluginDescriptor> {
        let raw = self.raw_descriptor(index)?;
        Ok(unsafe {
            PluginDescriptor {
                id: lossy_string(raw.id),
                name: lossy_string(raw.name),
                vendor: lossy_string(raw.vendor),
                version: lossy_string(raw.version),
            }
        })
    }

    /// Create (but do not init) the plugin at `index`.
    pub fn create_instance(&self, host: *const clap_host, index: u32) -> Result<PluginHandle> {
        let raw = self.raw_descriptor(index)?;

        if !clap_version_is_compatible(raw.clap_version) {
            return Err(HostError::IncompatibleClapVersion {
                major: raw.clap_version.major,
                minor: raw.clap_version.minor,
                revision: raw.clap_version.revision,
            });
        }

        let factory = unsafe { &*self.factory };
        let create = factory.create_plugin.ok_or_else(|| HostError::LoadFailed {
            path: self.path.clone(),
            stage: LoadStage::Instantiation,
            reason: "factory has no create_plugin function".into(),
        })?;

        let plugin = unsafe { create(self.factory, host, raw.id) };
        if plugin.is_null() {
            return Err(HostError::LoadFailed {
                path: self.path.clone(),
                stage: LoadStage::Instantiation,
                reason: format!("could not create plugin {}", unsafe { lossy_string(raw.id) }),
            });
        }

        Ok(PluginHandle::new(plugin))
    }
}

impl Drop for PluginModule {
    fn drop(&mut self) {
        unsafe {
            if let Some(deinit) = (*self.entry).deinit {
                deinit();
            }
        }
    }
}

/// Extension pointers, resolved once after a successful `init`.
#[derive(Clone, Copy)]
struct Extensions {
    params: *const clap_plugin_params,
    gui: *const clap_plugin_gui,
    state: *const clap_plugin_state,
    timer_support: *const clap_plugin_timer_support,
    posix_fd_support: *const clap_plugin_posix_fd_support,
    thread_pool: *const clap_plugin_thread_pool,
    preset_load: *const clap_plugin_preset_load,
    remote_controls: *const clap_plugin_remote_controls,
}

// Safety: plain pointer values; dereferencing is guarded by the handle's
// threading rules.
unsafe impl Send for Extensions {}
unsafe impl Sync for Extensions {}

static NO_EXTENSIONS: Extensions = Extensions {
    params: ptr::null(),
    gui: ptr::null(),
    state: ptr::null(),
    timer_support: ptr::null(),
    posix_fd_support: ptr::null(),
    thread_pool: ptr::null(),
    preset_load: ptr::null(),
    remote_controls: ptr::null(),
};

/// The live, instantiated plugin.
///
/// Which methods may be called from which thread is governed by the CLAP
/// protocol and enforced by the session/processor layers; the handle itself
/// is a thin typed proxy over the function-pointer table.
pub struct PluginHandle {
    plugin: *const clap_plugin,
    extensions: OnceLock<Extensions>,
    destroyed: AtomicBool,
}

// Safety: the plugin pointer is shared between the main thread, the audio
// thread and the pool workers under the CLAP threading rules; the host never
// makes concurrent conflicting calls (main-thread functions and audio-thread
// functions are disjoint sets, and the state machine orders them).
unsafe impl Send for PluginHandle {}
unsafe impl Sync for PluginHandle {}

impl PluginHandle {
    pub(crate) fn new(plugin: *const clap_plugin) -> Self {
        Self {
            plugin,
            extensions: OnceLock::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    fn as_ref(&self) -> &clap_plugin {
        unsafe { &*self.plugin }
    }

    fn extensions(&self) -> &Extensions {
        self.extensions.get().unwrap_or(&NO_EXTENSIONS)
    }

    fn get_extension(&self, id: &CStr) -> *const c_void {
        match self.as_ref().get_extension {
            Some(f) => unsafe { f(self.plugin, id.as_ptr()) },
            None => ptr::null(),
        }
    }

    /// Init the plugin and resolve its extensions. Extension queries are
    /// only legal once `init` returned true, so the capability set is empty
    /// until then.
    pub fn init(&self) -> bool {
        let Some(init) = self.as_ref().init else {
            return false;
        };
        if !unsafe { init(self.plugin) } {
            return false;
        }

        let _ = self.extensions.set(Extensions {
            params: self.get_extension(CLAP_EXT_PARAMS) as *const _,
            gui: self.get_extension(CLAP_EXT_GUI) as *const _,
            state: self.get_extension(CLAP_EXT_STATE) as *const _,
            timer_support: self.get_extension(CLAP_EXT_TIMER_SUPPORT) as *const _,
            posix_fd_support: self.get_extension(CLAP_EXT_POSIX_FD_SUPPORT) as *const _,
            thread_pool: self.get_extension(CLAP_EXT_THREAD_POOL) as *const _,
            preset_load: self.get_extension(CLAP_EXT_PRESET_LOAD) as *const _,
            remote_controls: self.get_extension(CLAP_EXT_REMOTE_CONTROLS) as *const _,
        });
        true
    }

    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(f) = self.as_ref().destroy {
            unsafe { f(self.plugin) };
        }
    }

    // ------------------------------------------------------------------
    // Core lifecycle
    // ------------------------------------------------------------------

    pub fn activate(&self, sample_rate: f64, min_frames: u32, max_frames: u32) -> bool {
        match self.as_ref().activate {
            Some(f) => unsafe { f(self.plugin, sample_rate, min_frames, max_frames) },
            None => false,
        }
    }

    pub fn deactivate(&self) {
        if let Some(f) = self.as_ref().deactivate {
            unsafe { f(self.plugin) };
        }
    }

    pub fn start_processing(&self) -> bool {
        match self.as_ref().start_processing {
            Some(f) => unsafe { f(self.plugin) },
            None => false,
        }
    }

    pub fn stop_processing(&self) {
        if let Some(f) = self.as_ref().stop_processing {
            unsafe { f(self.plugin) };
        }
    }

    pub fn process(&self, process: &clap_process) -> clap_process_status {
        match self.as_ref().process {
            Some(f) => unsafe { f(self.plugin, process) },
            None => CLAP_PROCESS_ERROR,
        }
    }

    pub fn on_main_thread(&self) {
        if let Some(f) = self.as_ref().on_main_thread {
            unsafe { f(self.plugin) };
        }
    }

    // ------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------

    pub fn can_use_params(&self) -> bool {
        let ext = self.extensions().params;
        !ext.is_null() && {
            let ext = unsafe { &*ext };
            ext.count.is_some()
                && ext.get_info.is_some()
                && ext.get_value.is_some()
                && ext.value_to_text.is_some()
                && ext.flush.is_some()
        }
    }

    pub fn can_use_gui(&self) -> bool {
        let ext = self.extensions().gui;
        !ext.is_null() && {
            let ext = unsafe { &*ext };
            ext.is_api_supported.is_some()
                && ext.create.is_some()
                && ext.destroy.is_some()
                && ext.get_size.is_some()
                && ext.show.is_some()
                && ext.hide.is_some()
        }
    }

    pub fn can_use_state(&self) -> bool {
        let ext = self.extensions().state;
        !ext.is_null() && {
            let ext = unsafe { &*ext };
            ext.save.is_some() && ext.load.is_some()
        }
    }

    pub fn can_use_timer_support(&self) -> bool {
        let ext = self.extensions().timer_support;
        !ext.is_null() && unsafe { (*ext).on_timer.is_some() }
    }

    pub fn can_use_posix_fd_support(&self) -> bool {
        let ext = self.extensions().posix_fd_support;
        !ext.is_null() && unsafe { (*ext).on_fd.is_some() }
    }

    pub fn can_use_thread_pool(&self) -> bool {
        let ext = self.extensions().thread_pool;
        !ext.is_null() && unsafe { (*ext).exec.is_some() }
    }

    pub fn can_use_preset_load(&self) -> bool {
        let ext = self.extensions().preset_load;
        !ext.is_null() && unsafe { (*ext).from_file.is_some() }
    }

    pub fn can_use_remote_controls(&self) -> bool {
        let ext = self.extensions().remote_controls;
        !ext.is_null() && {
            let ext = unsafe { &*ext };
            ext.count.is_some() && ext.get.is_some()
        }
    }

    fn params_ext(&self) -> &clap_plugin_params {
        assert!(self.can_use_params(), "plugin does not provide clap_plugin_params");
        unsafe { &*self.extensions().params }
    }

    fn gui_ext(&self) -> &clap_plugin_gui {
        assert!(self.can_use_gui(), "plugin does not provide clap_plugin_gui");
        unsafe { &*self.extensions().gui }
    }

    // ------------------------------------------------------------------
    // Params
    // ------------------------------------------------------------------

    pub fn params_count(&self) -> u32 {
        unsafe { self.params_ext().count.unwrap()(self.plugin) }
    }

    pub fn param_info_at(&self, index: u32) -> Option<clap_param_info> {
        let mut info: clap_param_info = unsafe { std::mem::zeroed() };
        let ok = unsafe { self.params_ext().get_info.unwrap()(self.plugin, index, &mut info) };
        ok.then_some(info)
    }

    pub fn param_value(&self, id: clap_id) -> Option<f64> {
        let mut value = 0.0;
        let ok = unsafe { self.params_ext().get_value.unwrap()(self.plugin, id, &mut value) };
        ok.then_some(value)
    }

    pub fn param_value_to_text(&self, id: clap_id, value: f64) -> Option<String> {
        let mut buffer = [0 as c_char; 256];
        let ok = unsafe {
            self.params_ext().value_to_text.unwrap()(
                self.plugin,
                id,
                value,
                buffer.as_mut_ptr(),
                buffer.len() as u32,
            )
        };
        ok.then(|| crate::params::cbuf_to_string(&buffer))
    }

    pub fn params_flush(
        &self,
        in_events: &clap_sys::events::clap_input_events,
        out_events: &clap_sys::events::clap_output_events,
    ) {
        unsafe { self.params_ext().flush.unwrap()(self.plugin, in_events, out_events) };
    }

    // ------------------------------------------------------------------
    // GUI
    // ------------------------------------------------------------------

    pub fn gui_is_api_supported(&self, api: &CStr, is_floating: bool) -> bool {
        unsafe { self.gui_ext().is_api_supported.unwrap()(self.plugin, api.as_ptr(), is_floating) }
    }

    pub fn gui_create(&self, api: &CStr, is_floating: bool) -> bool {
        unsafe { self.gui_ext().create.unwrap()(self.plugin, api.as_ptr(), is_floating) }
    }

    pub fn gui_destroy(&self) {
        unsafe { self.gui_ext().destroy.unwrap()(self.plugin) };
    }

    pub fn gui_get_size(&self) -> Option<(u32, u32)> {
        let (mut width, mut height) = (0u32, 0u32);
        let ok = unsafe { self.gui_ext().get_size.unwrap()(self.plugin, &mut width, &mut height) };
        ok.then_some((width, height))
    }

    pub fn gui_set_parent(&self, window: &clap_window) -> bool {
        match self.gui_ext().set_parent {
            Some(f) => unsafe { f(self.plugin, window) },
            None => false,
        }
    }

    pub fn gui_set_transient(&self, window: &clap_window) -> bool {
        match self.gui_ext().set_transient {
            Some(f) => unsafe { f(self.plugin, window) },
            None => false,
        }
    }

    pub fn gui_suggest_title(&self, title: &CStr) {
        if let Some(f) = self.gui_ext().suggest_title {
            unsafe { f(self.plugin, title.as_ptr()) };
        }
    }

    pub fn gui_show(&self) -> bool {
        unsafe { self.gui_ext().show.unwrap()(self.plugin) }
    }

    pub fn gui_hide(&self) -> bool {
        unsafe { self.gui_ext().hide.unwrap()(self.plugin) }
    }

    // ------------------------------------------------------------------
    // Remaining extensions
    // ------------------------------------------------------------------

    pub fn on_timer(&self, timer_id: clap_id) {
        assert!(
            self.can_use_timer_support(),
            "plugin does not provide clap_plugin_timer_support"
        );
        unsafe { (*self.extensions().timer_support).on_timer.unwrap()(self.plugin, timer_id) };
    }

    pub fn on_fd(&self, fd: i32, flags: u32) {
        assert!(
            self.can_use_posix_fd_support(),
            "plugin does not provide clap_plugin_posix_fd_support"
        );
        unsafe { (*self.extensions().posix_fd_support).on_fd.unwrap()(self.plugin, fd, flags) };
    }

    pub fn thread_pool_exec(&self, task_index: u32) {
        assert!(
            self.can_use_thread_pool(),
            "plugin does not provide clap_plugin_thread_pool"
        );
        unsafe { (*self.extensions().thread_pool).exec.unwrap()(self.plugin, task_index) };
    }

    pub fn preset_load_from_file(&self, path: &CStr) -> bool {
        assert!(
            self.can_use_preset_load(),
            "plugin does not provide clap_plugin_preset_load"
        );
        unsafe { (*self.extensions().preset_load).from_file.unwrap()(self.plugin, path.as_ptr()) }
    }

    pub fn state_save(&self, stream: &clap_ostream) -> bool {
        assert!(self.can_use_state(), "plugin does not provide clap_plugin_state");
        unsafe { (*self.extensions().state).save.unwrap()(self.plugin, stream) }
    }

    pub fn state_load(&self, stream: &clap_istream) -> bool {
        assert!(self.can_use_state(), "plugin does not provide clap_plugin_state");
        unsafe { (*self.extensions().state).load.unwrap()(self.plugin, stream) }
    }

    pub fn remote_controls_count(&self) -> u32 {
        assert!(
            self.can_use_remote_controls(),
            "plugin does not provide clap_plugin_remote_controls"
        );
        unsafe { (*self.extensions().remote_controls).count.unwrap()(self.plugin) }
    }

    pub fn remote_controls_page(&self, index: u32) -> Option<clap_remote_controls_page> {
        assert!(
            self.can_use_remote_controls(),
            "plugin does not provide clap_plugin_remote_controls"
        );
        let mut page: clap_remote_controls_page = unsafe { std::mem::zeroed() };
        let ok =
            unsafe { (*self.extensions().remote_controls).get.unwrap()(self.plugin, index, &mut page) };
        ok.then_some(page)
    }
}

impl ParamScanSource for PluginHandle {
    fn param_count(&self) -> u32 {
        self.params_count()
    }

    fn param_info(&self, index: u32) -> Option<ParamInfo> {
        self.param_info_at(index).map(|raw| ParamInfo::from_raw(&raw))
    }

    fn param_value(&self, id: clap_id) -> Option<f64> {
        PluginHandle::param_value(self, id)
    }
}

impl PageScanSource for PluginHandle {
    fn page_count(&self) -> u32 {
        self.remote_controls_count()
    }

    fn page(&self, index: u32) -> Option<ControlPage> {
        self.remote_controls_page(index)
            .map(|raw| ControlPage::from_raw(&raw))
    }
}

impl PoolTask for PluginHandle {
    fn exec_task(&self, task_index: u32) {
        self.thread_pool_exec(task_index);
    }
}
