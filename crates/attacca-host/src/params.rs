//! Parameter registry and the rescan protocol.
//!
//! The registry is the authoritative, main-thread-owned mapping of parameter
//! id to descriptor and state. It is populated by scanning the plugin and
//! every change to it is validated against the rescan flags the plugin
//! declared; a scan that breaks the declared change policy is a protocol
//! violation and panics without committing anything.

use clap_sys::ext::params::{
    clap_param_info, clap_param_rescan_flags, CLAP_PARAM_IS_AUTOMATABLE,
    CLAP_PARAM_IS_AUTOMATABLE_PER_CHANNEL, CLAP_PARAM_IS_AUTOMATABLE_PER_KEY,
    CLAP_PARAM_IS_AUTOMATABLE_PER_NOTE_ID, CLAP_PARAM_IS_AUTOMATABLE_PER_PORT,
    CLAP_PARAM_IS_MODULATABLE, CLAP_PARAM_IS_MODULATABLE_PER_CHANNEL,
    CLAP_PARAM_IS_MODULATABLE_PER_KEY, CLAP_PARAM_IS_MODULATABLE_PER_NOTE_ID,
    CLAP_PARAM_IS_MODULATABLE_PER_PORT, CLAP_PARAM_IS_READONLY, CLAP_PARAM_REQUIRES_PROCESS,
    CLAP_PARAM_RESCAN_ALL, CLAP_PARAM_RESCAN_INFO, CLAP_PARAM_RESCAN_VALUES,
};
use clap_sys::id::{clap_id, CLAP_INVALID_ID};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::os::raw::c_char;
use std::ptr;

pub(crate) fn cbuf_to_string(buf: &[c_char]) -> String {
    // Safety: c_char and u8 have identical layout.
    let bytes: &[u8] = unsafe { &*(buf as *const [c_char] as *const [u8]) };
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

/// Opaque fast-lookup token the plugin may attach to a parameter.
///
/// The host never interprets it; it is passed back unchanged in parameter
/// events, unless the cookie policy elects to zero it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cookie(*mut c_void);

// Safety: the cookie is an opaque token. The host never dereferences it,
// only hands it back to the plugin.
unsafe impl Send for Cookie {}
unsafe impl Sync for Cookie {}

impl Cookie {
    pub const NULL: Cookie = Cookie(ptr::null_mut());

    pub fn new(ptr: *mut c_void) -> Self {
        Cookie(ptr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

/// Immutable-until-rescanned descriptor of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub id: clap_id,
    pub flags: u32,
    pub cookie: Cookie,
    pub name: String,
    pub module: String,
    pub min_value: f64,
    pub max_value: f64,
    pub default_value: f64,
}

const CRITICAL_FLAGS: u32 = CLAP_PARAM_IS_AUTOMATABLE
    | CLAP_PARAM_IS_AUTOMATABLE_PER_NOTE_ID
    | CLAP_PARAM_IS_AUTOMATABLE_PER_KEY
    | CLAP_PARAM_IS_AUTOMATABLE_PER_CHANNEL
    | CLAP_PARAM_IS_AUTOMATABLE_PER_PORT
    | CLAP_PARAM_IS_MODULATABLE
    | CLAP_PARAM_IS_MODULATABLE_PER_NOTE_ID
    | CLAP_PARAM_IS_MODULATABLE_PER_KEY
    | CLAP_PARAM_IS_MODULATABLE_PER_CHANNEL
    | CLAP_PARAM_IS_MODULATABLE_PER_PORT
    | CLAP_PARAM_IS_READONLY
    | CLAP_PARAM_REQUIRES_PROCESS;

impl ParamInfo {
    pub fn from_raw(raw: &clap_param_info) -> Self {
        Self {
            id: raw.id,
            flags: raw.flags,
            cookie: Cookie::new(raw.cookie),
            name: cbuf_to_string(&raw.name),
            module: cbuf_to_string(&raw.module),
            min_value: raw.min_value,
            max_value: raw.max_value,
            default_value: raw.default_value,
        }
    }

    pub fn is_value_valid(&self, value: f64) -> bool {
        self.min_value <= value && value <= self.max_value
    }

    fn is_equal_to(&self, other: &ParamInfo, ignore_cookies: bool) -> bool {
        let cookies_same = ignore_cookies || self.cookie == other.cookie;
        cookies_same
            && self.id == other.id
            && self.flags == other.flags
            && self.name == other.name
            && self.module == other.module
            && self.min_value == other.min_value
            && self.max_value == other.max_value
            && self.default_value == other.default_value
    }

    /// Whether the change from `self` to `newer` touches fields a narrower
    /// rescan may not alter: the automation/modulation/read-only capability
    /// flags or the value range.
    ///
    /// The range part intentionally keeps the historical self-comparison
    /// (`min != min`), which only trips on NaN bounds; product intent for it
    /// is unconfirmed, so its literal behavior is preserved.
    fn is_critically_different_from(&self, newer: &ParamInfo) -> bool {
        debug_assert_eq!(self.id, newer.id);
        (self.flags & CRITICAL_FLAGS) != (newer.flags & CRITICAL_FLAGS)
            || self.min_value != self.min_value
            || self.max_value != self.max_value
    }
}

/// Per-parameter mutable state, owned by the registry and mutated only on
/// the main thread.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamState {
    pub value: f64,
    pub modulation: f64,
    pub is_adjusting: bool,
}

#[derive(Debug, Clone)]
pub struct ParamEntry {
    pub info: ParamInfo,
    pub state: ParamState,
}

/// What a scan pass reads from the plugin. Abstracted from the FFI surface
/// so the protocol rules can be exercised directly.
pub trait ParamScanSource {
    fn param_count(&self) -> u32;
    /// `None` reflects `get_info` returning false.
    fn param_info(&self, index: u32) -> Option<ParamInfo>;
    /// `None` reflects `get_value` returning false.
    fn param_value(&self, id: clap_id) -> Option<f64>;
}

pub(crate) fn may_value_change(flags: clap_param_rescan_flags) -> bool {
    flags & (CLAP_PARAM_RESCAN_ALL | CLAP_PARAM_RESCAN_VALUES) != 0
}

pub(crate) fn may_info_change(flags: clap_param_rescan_flags) -> bool {
    flags & (CLAP_PARAM_RESCAN_ALL | CLAP_PARAM_RESCAN_INFO) != 0
}

enum ScanAction {
    Insert(ParamInfo, f64),
    UpdateInfo(ParamInfo),
    UpdateValue(clap_id, f64),
}

#[derive(Default)]
pub struct ParamRegistry {
    params: HashMap<clap_id, ParamEntry>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn contains(&self, id: clap_id) -> bool {
        self.params.contains_key(&id)
    }

    pub fn get(&self, id: clap_id) -> Option<&ParamEntry> {
        self.params.get(&id)
    }

    pub fn get_mut(&mut self, id: clap_id) -> Option<&mut ParamEntry> {
        self.params.get_mut(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ParamEntry> {
        self.params.values()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// Re-enumerate the plugin's parameters under the declared change policy.
    ///
    /// Returns true when this was a full rescan (callers raise the bulk
    /// change notification in that case). Every rule violation panics before
    /// any entry is committed.
    pub fn rescan(
        &mut self,
        source: &dyn ParamScanSource,
        flags: clap_param_rescan_flags,
        plugin_is_active: bool,
        zero_cookies: bool,
    ) -> bool {
        let rescan_all = flags & CLAP_PARAM_RESCAN_ALL != 0;
        if plugin_is_active && rescan_all {
            panic!("params.rescan(RESCAN_ALL) was called while the plugin is active");
        }

        let count = source.param_count();
        let mut seen = HashSet::with_capacity(count as usize * 2);
        let mut actions = Vec::new();

        for index in 0..count {
            let mut info = source
                .param_info(index)
                .unwrap_or_else(|| panic!("params.get_info({index}) returned false"));

            if info.id == CLAP_INVALID_ID {
                panic!(
                    "params.get_info({index}) reported a parameter with an invalid id \
                     (name: {}, module: {})",
                    info.name, info.module
                );
            }
            if zero_cookies {
                info.cookie = Cookie::NULL;
            }
            if !seen.insert(info.id) {
                panic!(
                    "parameter id {} was declared twice (name: {}, module: {})",
                    info.id, info.name, info.module
                );
            }

            let value = source.param_value(info.id).unwrap_or_else(|| {
                panic!(
                    "failed to get the value of parameter {} (name: {}, module: {})",
                    info.id, info.name, info.module
                )
            });

            match self.params.get(&info.id) {
                None => {
                    if !rescan_all {
                        panic!(
                            "a new parameter appeared without RESCAN_ALL; id: {}, name: {}, \
                             module: {}",
                            info.id, info.name, info.module
                        );
                    }
                    if !info.is_value_valid(value) {
                        panic!(
                            "invalid value {value} for parameter {} ({}..={})",
                            info.id, info.min_value, info.max_value
                        );
                    }
                    actions.push(ScanAction::Insert(info, value));
                }
                Some(entry) => {
                    if !entry.info.is_equal_to(&info, zero_cookies) {
                        if !may_info_change(flags) {
                            panic!(
                                "parameter {} info changed without RESCAN_INFO; name: {}, \
                                 module: {}",
                                info.id, info.name, info.module
                            );
                        }
                        if !rescan_all && entry.info.is_critically_different_from(&info) {
                            panic!(
                                "parameter {} has critical info changes without RESCAN_ALL; \
                                 name: {}, module: {}",
                                info.id, info.name, info.module
                            );
                        }
                        actions.push(ScanAction::UpdateInfo(info.clone()));
                    }
                    if entry.state.value != value {
                        if !may_value_change(flags) {
                            panic!(
                                "parameter {} value changed without RESCAN_VALUES; name: {}, \
                                 module: {}",
                                info.id, info.name, info.module
                            );
                        }
                        if !info.is_value_valid(value) {
                            panic!(
                                "invalid value {value} for parameter {} ({}..={})",
                                info.id, info.min_value, info.max_value
                            );
                        }
                        actions.push(ScanAction::UpdateValue(info.id, value));
                    }
                }
            }
        }

        let removed: Vec<clap_id> = self
            .params
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        if let Some(id) = removed.first() {
            if !rescan_all {
                let info = &self.params[id].info;
                panic!(
                    "parameter {} was removed without RESCAN_ALL; name: {}, module: {}",
                    id, info.name, info.module
                );
            }
        }

        // Validation passed; commit.
        for id in removed {
            self.params.remove(&id);
        }
        for action in actions {
            match action {
                ScanAction::Insert(info, value) => {
                    let id = info.id;
                    self.params.insert(
                        id,
                        ParamEntry {
                            info,
                            state: ParamState {
                                value,
                                ..ParamState::default()
                            },
                        },
                    );
                }
                ScanAction::UpdateInfo(info) => {
                    let id = info.id;
                    self.params.get_mut(&id).unwrap().info = info;
                }
                ScanAction::UpdateValue(id, value) => {
                    let state = &mut self.params.get_mut(&id).unwrap().state;
                    state.value = value;
                    state.modulation = value;
                }
            }
        }

        rescan_all
    }
}

#[cfg(test)]
impl ParamRegistry {
    /// Insert an entry directly, bypassing the scan protocol.
    pub(crate) fn seed(&mut self, entry: ParamEntry) {
        self.params.insert(entry.info.id, entry);
    }
}
