//! Plugin GUI embedding negotiation.
//!
//! One presentation API per target OS. The negotiation prefers an embedded
//! surface, falls back to a floating window, and abandons with no GUI when
//! the plugin supports neither. Visibility is tracked separately from
//! creation and show/hide are idempotent.

use crate::error::{HostError, Result};
use crate::plugin::PluginHandle;

#[cfg(target_os = "macos")]
use clap_sys::ext::gui::CLAP_WINDOW_API_COCOA;
#[cfg(target_os = "windows")]
use clap_sys::ext::gui::CLAP_WINDOW_API_WIN32;
#[cfg(target_os = "linux")]
use clap_sys::ext::gui::CLAP_WINDOW_API_X11;
use clap_sys::ext::gui::{clap_window, clap_window_handle};

use std::ffi::CStr;

/// A raw platform window handle supplied by the application shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle {
    raw: usize,
}

impl WindowHandle {
    pub fn from_raw(raw: usize) -> Self {
        Self { raw }
    }

    pub fn raw(self) -> usize {
        self.raw
    }
}

/// The host-side container the negotiator drives: resizing around an
/// embedded surface, and showing/hiding the window that wraps it.
pub trait WindowHost: Send {
    fn resize_plugin_view(&self, width: u32, height: u32);
    fn show_plugin_window(&self);
    fn hide_plugin_window(&self);
}

fn current_gui_api() -> &'static CStr {
    #[cfg(target_os = "linux")]
    {
        CLAP_WINDOW_API_X11
    }
    #[cfg(target_os = "windows")]
    {
        CLAP_WINDOW_API_WIN32
    }
    #[cfg(target_os = "macos")]
    {
        CLAP_WINDOW_API_COCOA
    }
}

fn make_clap_window(handle: WindowHandle) -> clap_window {
    #[cfg(target_os = "linux")]
    {
        clap_window {
            api: CLAP_WINDOW_API_X11.as_ptr(),
            specific: clap_window_handle {
                x11: handle.raw() as u64,
            },
        }
    }
    #[cfg(target_os = "windows")]
    {
        clap_window {
            api: CLAP_WINDOW_API_WIN32.as_ptr(),
            specific: clap_window_handle {
                win32: handle.raw() as *mut std::ffi::c_void,
            },
        }
    }
    #[cfg(target_os = "macos")]
    {
        clap_window {
            api: CLAP_WINDOW_API_COCOA.as_ptr(),
            specific: clap_window_handle {
                cocoa: handle.raw() as *mut std::ffi::c_void,
            },
        }
    }
}

#[derive(Default)]
pub struct GuiNegotiator {
    created: bool,
    visible: bool,
    floating: bool,
}

impl GuiNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_floating(&self) -> bool {
        self.floating
    }

    pub fn destroy(&mut self, plugin: &PluginHandle) {
        if self.created {
            plugin.gui_destroy();
            self.created = false;
            self.visible = false;
        }
    }

    /// Negotiate and create the plugin's surface inside (or alongside) the
    /// host window. Any previously created surface is destroyed first.
    pub fn attach(
        &mut self,
        plugin: &PluginHandle,
        parent: WindowHandle,
        host: &dyn WindowHost,
    ) -> Result<()> {
        self.destroy(plugin);

        let api = current_gui_api();
        self.floating = false;
        if !plugin.gui_is_api_supported(api, false) {
            if !plugin.gui_is_api_supported(api, true) {
                tracing::warn!("could not find a suitable gui api");
                return Ok(());
            }
            self.floating = true;
        }

        let window = make_clap_window(parent);
        if !plugin.gui_create(api, self.floating) {
            return Err(HostError::GuiNegotiation(
                "could not create the plugin gui".into(),
            ));
        }
        self.created = true;
        debug_assert!(!self.visible);

        if self.floating {
            plugin.gui_set_transient(&window);
            plugin.gui_suggest_title(c"Attacca");
        } else {
            let Some((width, height)) = plugin.gui_get_size() else {
                self.created = false;
                plugin.gui_destroy();
                return Err(HostError::GuiNegotiation(
                    "could not get the size of the plugin gui".into(),
                ));
            };
            host.resize_plugin_view(width, height);

            if !plugin.gui_set_parent(&window) {
                self.created = false;
                plugin.gui_destroy();
                return Err(HostError::GuiNegotiation(
                    "could not embed the plugin gui".into(),
                ));
            }
        }

        self.set_visibility(plugin, true);
        Ok(())
    }

    /// Show or hide the created surface. A no-op when nothing was created or
    /// the surface is already in the requested state.
    pub fn set_visibility(&mut self, plugin: &PluginHandle, visible: bool) {
        if !self.created {
            return;
        }
        if visible && !self.visible {
            plugin.gui_show();
            self.visible = true;
        } else if !visible && self.visible {
            plugin.gui_hide();
            self.visible = false;
        }
    }
}
