//! Quick-control pages.
//!
//! A page is a named, ordered subset of parameter ids the plugin groups for
//! simplified external control. Pages are wholesale replaced on every scan
//! the plugin triggers; exactly one page (or none) is selected at a time.

use crate::params::cbuf_to_string;
use clap_sys::ext::draft::remote_controls::clap_remote_controls_page;
use clap_sys::id::{clap_id, CLAP_INVALID_ID};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPage {
    pub id: clap_id,
    pub section: String,
    pub name: String,
    pub param_ids: Vec<clap_id>,
}

impl ControlPage {
    pub fn from_raw(raw: &clap_remote_controls_page) -> Self {
        Self {
            id: raw.page_id,
            section: cbuf_to_string(&raw.section_name),
            name: cbuf_to_string(&raw.page_name),
            param_ids: raw
                .param_ids
                .iter()
                .copied()
                .filter(|id| *id != CLAP_INVALID_ID)
                .collect(),
        }
    }
}

/// What a page scan reads from the plugin.
pub trait PageScanSource {
    fn page_count(&self) -> u32;
    /// `None` reflects `get` returning false.
    fn page(&self, index: u32) -> Option<ControlPage>;
}

#[derive(Default)]
pub struct PageRegistry {
    pages: Vec<ControlPage>,
    index: HashMap<clap_id, usize>,
    selected: Option<clap_id>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(&self) -> &[ControlPage] {
        &self.pages
    }

    pub fn get(&self, id: clap_id) -> Option<&ControlPage> {
        self.index.get(&id).map(|&i| &self.pages[i])
    }

    pub fn selected(&self) -> Option<clap_id> {
        self.selected
    }

    /// Change the selected page. A page id that does not exist is a protocol
    /// violation. Returns whether the selection actually changed.
    pub fn select(&mut self, page: Option<clap_id>) -> bool {
        if page == self.selected {
            return false;
        }
        if let Some(id) = page {
            if !self.index.contains_key(&id) {
                panic!("control page {id} not found");
            }
        }
        self.selected = page;
        true
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.index.clear();
        self.selected = None;
    }

    /// Replace every page from a fresh scan. Duplicate or invalid page ids
    /// are protocol violations. The selection defaults to the first scanned
    /// page.
    pub fn rescan(&mut self, source: &dyn PageScanSource) {
        self.clear();

        let count = source.page_count();
        for i in 0..count {
            let page = source.page(i).unwrap_or_else(|| {
                panic!("remote_controls.get({i}) failed, while the page count is {count}")
            });
            if page.id == CLAP_INVALID_ID {
                panic!("remote_controls.get({i}) gave an invalid page id");
            }
            if let Some(&existing) = self.index.get(&page.id) {
                panic!(
                    "remote_controls.get({i}) gave the same page id twice: {} \
                     (1. name: {}, 2. name: {})",
                    page.id, self.pages[existing].name, page.name
                );
            }
            self.index.insert(page.id, self.pages.len());
            self.pages.push(page);
        }

        self.selected = self.pages.first().map(|p| p.id);
    }
}
