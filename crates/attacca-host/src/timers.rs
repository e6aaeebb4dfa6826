//! Control-thread timers and fd watches registered by the plugin.
//!
//! Both registries are main-thread-only resources, serviced from the idle
//! pass (the application shell owns the real event loop) and torn down
//! deterministically on unload.

use clap_sys::id::clap_id;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Timer {
    period: Duration,
    next_fire: Instant,
}

/// Periodic timers registered through the timer-support extension.
#[derive(Default)]
pub struct TimerRegistry {
    next_id: clap_id,
    timers: HashMap<clap_id, Timer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn register(&mut self, period_ms: u32, now: Instant) -> clap_id {
        let id = self.next_id;
        self.next_id += 1;
        let period = Duration::from_millis(u64::from(period_ms));
        self.timers.insert(
            id,
            Timer {
                period,
                next_fire: now + period,
            },
        );
        id
    }

    pub fn unregister(&mut self, id: clap_id) {
        if self.timers.remove(&id).is_none() {
            panic!("unregister_timer() called for a timer id that was not registered: {id}");
        }
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Ids of every timer whose deadline has elapsed, advancing each
    /// deadline past `now` so a stalled idle loop does not replay a backlog.
    pub fn due(&mut self, now: Instant) -> SmallVec<[clap_id; 4]> {
        let mut due = SmallVec::new();
        for (id, timer) in &mut self.timers {
            if timer.next_fire <= now {
                due.push(*id);
                timer.next_fire = now + timer.period;
            }
        }
        due
    }
}

/// File-descriptor watches registered through the posix-fd-support
/// extension. The idle pass polls the registered set with a zero timeout.
#[derive(Default)]
pub struct FdWatches {
    fds: HashMap<i32, u32>,
}

impl FdWatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    pub fn register(&mut self, fd: i32, flags: u32) {
        if self.fds.contains_key(&fd) {
            panic!("register_fd() called for fd {fd} that was already registered, use modify_fd()");
        }
        self.fds.insert(fd, flags);
    }

    pub fn modify(&mut self, fd: i32, flags: u32) {
        match self.fds.get_mut(&fd) {
            Some(existing) => *existing = flags,
            None => {
                panic!("modify_fd() called for fd {fd} that was not registered, use register_fd()")
            }
        }
    }

    pub fn unregister(&mut self, fd: i32) {
        if self.fds.remove(&fd).is_none() {
            panic!("unregister_fd() called for fd {fd} that was not registered");
        }
    }

    pub fn clear(&mut self) {
        self.fds.clear();
    }

    /// Poll the registered set without blocking; returns `(fd, ready flags)`
    /// pairs in CLAP flag terms.
    #[cfg(unix)]
    pub fn poll_ready(&self) -> Vec<(i32, u32)> {
        use clap_sys::ext::posix_fd_support::{
            CLAP_POSIX_FD_ERROR, CLAP_POSIX_FD_READ, CLAP_POSIX_FD_WRITE,
        };

        if self.fds.is_empty() {
            return Vec::new();
        }

        let mut pollfds: Vec<libc::pollfd> = self
            .fds
            .iter()
            .map(|(&fd, &flags)| {
                let mut events: libc::c_short = 0;
                if flags & CLAP_POSIX_FD_READ != 0 {
                    events |= libc::POLLIN;
                }
                if flags & CLAP_POSIX_FD_WRITE != 0 {
                    events |= libc::POLLOUT;
                }
                libc::pollfd {
                    fd,
                    events,
                    revents: 0,
                }
            })
            .collect();

        // Safety: the pollfd slice is valid for the duration of the call and
        // a zero timeout never blocks.
        let ready = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, 0) };
        if ready <= 0 {
            return Vec::new();
        }

        pollfds
            .iter()
            .filter(|p| p.revents != 0)
            .map(|p| {
                let mut flags = 0;
                if p.revents & libc::POLLIN != 0 {
                    flags |= CLAP_POSIX_FD_READ;
                }
                if p.revents & libc::POLLOUT != 0 {
                    flags |= CLAP_POSIX_FD_WRITE;
                }
                if p.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
                    flags |= CLAP_POSIX_FD_ERROR;
                }
                (p.fd, flags)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_ids_are_sequential() {
        let now = Instant::now();
        let mut timers = TimerRegistry::new();
        assert_eq!(timers.register(10, now), 0);
        assert_eq!(timers.register(10, now), 1);
        assert_eq!(timers.len(), 2);
    }

    #[test]
    fn test_timer_fires_after_its_period() {
        let now = Instant::now();
        let mut timers = TimerRegistry::new();
        let id = timers.register(10, now);

        assert!(timers.due(now + Duration::from_millis(5)).is_empty());
        let due = timers.due(now + Duration::from_millis(15));
        assert_eq!(due.as_slice(), [id]);
        // The deadline advanced; the same instant does not fire twice.
        assert!(timers.due(now + Duration::from_millis(15)).is_empty());
        assert_eq!(
            timers.due(now + Duration::from_millis(26)).as_slice(),
            [id]
        );
    }

    #[test]
    fn test_unregister_stops_a_timer() {
        let now = Instant::now();
        let mut timers = TimerRegistry::new();
        let id = timers.register(10, now);
        timers.unregister(id);
        assert!(timers.due(now + Duration::from_secs(1)).is_empty());
    }

    #[test]
    #[should_panic(expected = "was not registered")]
    fn test_unregister_unknown_timer_is_fatal() {
        TimerRegistry::new().unregister(42);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_double_fd_registration_is_fatal() {
        let mut fds = FdWatches::new();
        fds.register(3, 0);
        fds.register(3, 0);
    }

    #[test]
    #[should_panic(expected = "use register_fd()")]
    fn test_modify_unknown_fd_is_fatal() {
        FdWatches::new().modify(3, 0);
    }

    #[test]
    #[should_panic(expected = "was not registered")]
    fn test_unregister_unknown_fd_is_fatal() {
        FdWatches::new().unregister(3);
    }

    #[cfg(unix)]
    #[test]
    fn test_poll_reports_readable_pipe_end() {
        use clap_sys::ext::posix_fd_support::CLAP_POSIX_FD_READ;

        let mut pipe_fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(pipe_fds.as_mut_ptr()) }, 0);
        let [read_fd, write_fd] = pipe_fds;

        let mut watches = FdWatches::new();
        watches.register(read_fd, CLAP_POSIX_FD_READ);
        assert!(watches.poll_ready().is_empty());

        assert_eq!(
            unsafe { libc::write(write_fd, b"x".as_ptr().cast(), 1) },
            1
        );
        let ready = watches.poll_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, read_fd);
        assert!(ready[0].1 & CLAP_POSIX_FD_READ != 0);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
