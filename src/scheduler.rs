//! Fixed-step, cancellable tick loop.
//!
//! The host (an egui frame callback, or a plain loop in headless mode) feeds
//! wall-clock time into [`TickScheduler::pump`], which converts it into whole
//! simulation steps and invokes every registered tick function in order.
//! Registrations are stopped through their [`TickHandle`]; a [`ScopedTick`]
//! cancels its registration when dropped.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

/// Returned by a tick function to keep or end its registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

type TickFn<C> = Box<dyn FnMut(&mut C, Duration) -> TickControl>;

struct Registration<C> {
    id: u64,
    cancelled: Rc<Cell<bool>>,
    tick: TickFn<C>,
}

/// Handle to one registered tick function. Clones share the same
/// registration.
#[derive(Clone, Debug)]
pub struct TickHandle {
    id: u64,
    cancelled: Rc<Cell<bool>>,
}

impl TickHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops further invocations. Returns `false` when the registration was
    /// already stopped.
    pub fn cancel(&self) -> bool {
        !self.cancelled.replace(true)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// Cancels its registration on every exit path, including unwinding.
#[derive(Debug)]
#[must_use = "dropping a ScopedTick cancels it immediately"]
pub struct ScopedTick {
    handle: TickHandle,
    armed: bool,
}

impl ScopedTick {
    pub fn handle(&self) -> &TickHandle {
        &self.handle
    }

    /// Gives up the scope; the registration then runs until cancelled
    /// through the returned handle.
    pub fn release(mut self) -> TickHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Drop for ScopedTick {
    fn drop(&mut self) {
        if self.armed && self.handle.cancel() {
            debug!(id = self.handle.id, "scoped tick cancelled on drop");
        }
    }
}

pub struct TickScheduler<C> {
    step: Duration,
    max_catch_up: u32,
    accumulator: Duration,
    next_id: u64,
    registrations: Vec<Registration<C>>,
}

impl<C> TickScheduler<C> {
    /// `tick_rate_hz` must be positive; `max_catch_up` of zero is treated as
    /// one.
    pub fn new(tick_rate_hz: f32, max_catch_up: u32) -> Self {
        let rate = if tick_rate_hz.is_finite() && tick_rate_hz > 0.0 {
            tick_rate_hz
        } else {
            60.0
        };
        Self {
            step: Duration::from_secs_f32(1.0 / rate),
            max_catch_up: max_catch_up.max(1),
            accumulator: Duration::ZERO,
            next_id: 0,
            registrations: Vec::new(),
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Registers `tick` to run once per step until it returns
    /// [`TickControl::Stop`] or its handle is cancelled.
    pub fn start<F>(&mut self, tick: F) -> TickHandle
    where
        F: FnMut(&mut C, Duration) -> TickControl + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        let cancelled = Rc::new(Cell::new(false));
        self.registrations.push(Registration {
            id,
            cancelled: Rc::clone(&cancelled),
            tick: Box::new(tick),
        });
        debug!(id, "tick loop started");
        TickHandle { id, cancelled }
    }

    pub fn start_scoped<F>(&mut self, tick: F) -> ScopedTick
    where
        F: FnMut(&mut C, Duration) -> TickControl + 'static,
    {
        ScopedTick {
            handle: self.start(tick),
            armed: true,
        }
    }

    /// Idempotent. Returns whether this call did the stopping.
    pub fn cancel(&mut self, handle: &TickHandle) -> bool {
        let stopped = handle.cancel();
        if stopped {
            debug!(id = handle.id, "tick loop cancelled");
        }
        self.prune();
        stopped
    }

    pub fn is_active(&self, handle: &TickHandle) -> bool {
        !handle.is_cancelled()
            && self
                .registrations
                .iter()
                .any(|registration| registration.id == handle.id)
    }

    pub fn active_count(&self) -> usize {
        self.registrations
            .iter()
            .filter(|registration| !registration.cancelled.get())
            .count()
    }

    /// Converts `elapsed` host time into whole steps and runs them. A backlog
    /// larger than the catch-up cap is dropped. Returns the steps run.
    pub fn pump(&mut self, context: &mut C, elapsed: Duration) -> usize {
        self.prune();
        if self.registrations.is_empty() {
            self.accumulator = Duration::ZERO;
            return 0;
        }

        self.accumulator = self.accumulator.saturating_add(elapsed);
        let mut ran = 0usize;
        while self.accumulator >= self.step && ran < self.max_catch_up as usize {
            self.accumulator -= self.step;
            self.run_once(context);
            ran += 1;
            if self.registrations.is_empty() {
                self.accumulator = Duration::ZERO;
                break;
            }
        }
        if self.accumulator >= self.step {
            debug!(
                dropped_ms = self.accumulator.as_millis() as u64,
                "tick backlog dropped"
            );
            self.accumulator = Duration::ZERO;
        }
        ran
    }

    /// Runs up to `count` steps back to back, ignoring wall-clock time.
    pub fn run_ticks(&mut self, context: &mut C, count: usize) -> usize {
        let mut ran = 0;
        while ran < count {
            self.prune();
            if self.registrations.is_empty() {
                break;
            }
            self.run_once(context);
            ran += 1;
        }
        self.prune();
        ran
    }

    fn run_once(&mut self, context: &mut C) {
        let step = self.step;
        for registration in &mut self.registrations {
            // A tick earlier in this step may have cancelled a later one.
            if registration.cancelled.get() {
                continue;
            }
            if (registration.tick)(context, step) == TickControl::Stop {
                registration.cancelled.set(true);
                debug!(id = registration.id, "tick loop finished");
            }
        }
        self.prune();
    }

    fn prune(&mut self) {
        self.registrations
            .retain(|registration| !registration.cancelled.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_runs_whole_steps_and_keeps_the_remainder() {
        let mut scheduler = TickScheduler::<u32>::new(10.0, 10);
        let _handle = scheduler.start(|count, _| {
            *count += 1;
            TickControl::Continue
        });

        let mut count = 0;
        assert_eq!(scheduler.pump(&mut count, Duration::from_millis(250)), 2);
        assert_eq!(scheduler.pump(&mut count, Duration::from_millis(60)), 1);
        assert_eq!(count, 3);
    }

    #[test]
    fn catch_up_is_capped() {
        let mut scheduler = TickScheduler::<u32>::new(60.0, 4);
        let _handle = scheduler.start(|count, _| {
            *count += 1;
            TickControl::Continue
        });

        let mut count = 0;
        assert_eq!(scheduler.pump(&mut count, Duration::from_secs(5)), 4);
        assert_eq!(scheduler.pump(&mut count, Duration::ZERO), 0);
        assert_eq!(count, 4);
    }

    #[test]
    fn cancel_is_idempotent_and_stops_ticks() {
        let mut scheduler = TickScheduler::<u32>::new(60.0, 4);
        let handle = scheduler.start(|count, _| {
            *count += 1;
            TickControl::Continue
        });

        let mut count = 0;
        scheduler.run_ticks(&mut count, 3);
        assert!(scheduler.is_active(&handle));

        assert!(scheduler.cancel(&handle));
        assert!(!scheduler.cancel(&handle));
        assert!(!handle.cancel());
        assert!(!scheduler.is_active(&handle));

        assert_eq!(scheduler.run_ticks(&mut count, 3), 0);
        assert_eq!(count, 3);
    }

    #[test]
    fn scoped_tick_cancels_on_drop() {
        let mut scheduler = TickScheduler::<u32>::new(60.0, 4);
        let mut count = 0;
        {
            let scoped = scheduler.start_scoped(|count, _| {
                *count += 1;
                TickControl::Continue
            });
            scheduler.run_ticks(&mut count, 2);
            assert!(scheduler.is_active(scoped.handle()));
        }
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.run_ticks(&mut count, 2), 0);
        assert_eq!(count, 2);
    }

    #[test]
    fn released_scope_keeps_running() {
        let mut scheduler = TickScheduler::<u32>::new(60.0, 4);
        let handle = scheduler
            .start_scoped(|count, _| {
                *count += 1;
                TickControl::Continue
            })
            .release();
        let mut count = 0;
        assert_eq!(scheduler.run_ticks(&mut count, 2), 2);
        assert!(scheduler.is_active(&handle));
    }

    #[test]
    fn stop_ends_the_registration() {
        let mut scheduler = TickScheduler::<u32>::new(60.0, 4);
        let handle = scheduler.start(|count, _| {
            *count += 1;
            if *count == 2 {
                TickControl::Stop
            } else {
                TickControl::Continue
            }
        });
        let mut count = 0;
        assert_eq!(scheduler.run_ticks(&mut count, 10), 2);
        assert!(!scheduler.is_active(&handle));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn a_tick_can_cancel_another_within_the_same_step() {
        let mut scheduler = TickScheduler::<Vec<&'static str>>::new(60.0, 4);
        let second = Rc::new(Cell::new(None::<TickHandle>));
        let slot = Rc::clone(&second);
        let _first = scheduler.start(move |log, _| {
            log.push("first");
            if let Some(handle) = slot.take() {
                handle.cancel();
            }
            TickControl::Continue
        });
        second.set(Some(scheduler.start(|log, _| {
            log.push("second");
            TickControl::Continue
        })));

        let mut log = Vec::new();
        scheduler.run_ticks(&mut log, 2);
        assert_eq!(log, vec!["first", "first"]);
    }

    #[test]
    fn idle_scheduler_does_not_bank_time() {
        let mut scheduler = TickScheduler::<u32>::new(60.0, 100);
        let mut count = 0;
        assert_eq!(scheduler.pump(&mut count, Duration::from_secs(1)), 0);
        let _handle = scheduler.start(|count, _| {
            *count += 1;
            TickControl::Continue
        });
        assert_eq!(scheduler.pump(&mut count, Duration::ZERO), 0);
    }
}
