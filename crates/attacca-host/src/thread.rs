//! Thread role tagging.
//!
//! Every role-sensitive operation asserts its required role at entry. The
//! CLAP protocol lets both sides rely on this separation (a plugin may assume
//! parameter rescans never race with processing), so a wrong-thread call is a
//! protocol violation and panics instead of being serialized.

use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    Unknown,
    /// The control thread: lifecycle, registries, GUI, idle draining.
    Main,
    /// The single real-time callback thread.
    Audio,
    /// A pool worker executing plugin tasks within an audio-thread call.
    Worker,
}

thread_local! {
    static ROLE: Cell<ThreadRole> = const { Cell::new(ThreadRole::Unknown) };
}

pub fn current_role() -> ThreadRole {
    ROLE.with(|r| r.get())
}

pub fn set_role(role: ThreadRole) {
    ROLE.with(|r| r.set(role));
}

pub fn is_main_thread() -> bool {
    current_role() == ThreadRole::Main
}

pub fn is_audio_thread() -> bool {
    current_role() == ThreadRole::Audio
}

#[track_caller]
pub fn assert_main_thread() {
    let role = current_role();
    if role != ThreadRole::Main {
        panic!("requires the main thread, called from a {role:?} thread");
    }
}

#[track_caller]
pub fn assert_audio_thread() {
    let role = current_role();
    if role != ThreadRole::Audio {
        panic!("requires the audio thread, called from a {role:?} thread");
    }
}

/// Scoped role assignment. Restores the previous role on drop.
///
/// Used by the audio/worker entry points, and by tests that need to
/// impersonate a role.
pub struct RoleGuard {
    previous: ThreadRole,
}

impl RoleGuard {
    pub fn assume(role: ThreadRole) -> Self {
        let previous = current_role();
        set_role(role);
        Self { previous }
    }
}

impl Drop for RoleGuard {
    fn drop(&mut self) {
        set_role(self.previous);
    }
}
