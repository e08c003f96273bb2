//! Single-shot timers for the orchestrator's select loop.

use crossbeam_channel::{after, never, Receiver};
use std::time::{Duration, Instant};

/// A single-shot deadline that plugs into `crossbeam_channel::select!`.
///
/// At most one deadline is outstanding: arming replaces any previous
/// receiver, which cancels the old deadline atomically from the select
/// loop's point of view. A disarmed slot yields a `never` receiver, so it
/// can sit in a select arm unconditionally.
#[derive(Debug)]
pub struct TimerSlot {
    receiver: Receiver<Instant>,
    armed: bool,
}

impl TimerSlot {
    pub fn disarmed() -> Self {
        Self {
            receiver: never(),
            armed: false,
        }
    }

    /// Schedule a fire `duration` from now, cancelling any earlier deadline.
    pub fn arm(&mut self, duration: Duration) {
        self.receiver = after(duration);
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.receiver = never();
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Receiver for the select arm. Never fires while disarmed.
    pub fn receiver(&self) -> &Receiver<Instant> {
        &self.receiver
    }

    /// Mark the deadline consumed after its receiver fired.
    pub fn consume(&mut self) {
        self.receiver = never();
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;

    #[test]
    fn disarmed_slot_never_fires() {
        let slot = TimerSlot::disarmed();
        assert!(!slot.is_armed());
        select! {
            recv(slot.receiver()) -> _ => panic!("disarmed timer fired"),
            default(Duration::from_millis(30)) => {}
        }
    }

    #[test]
    fn armed_slot_fires_once_after_duration() {
        let mut slot = TimerSlot::disarmed();
        let start = Instant::now();
        slot.arm(Duration::from_millis(20));
        assert!(slot.is_armed());

        slot.receiver().recv().unwrap();
        slot.consume();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!slot.is_armed());

        // Consumed: nothing further arrives.
        select! {
            recv(slot.receiver()) -> _ => panic!("consumed timer fired again"),
            default(Duration::from_millis(30)) => {}
        }
    }

    #[test]
    fn rearming_cancels_the_previous_deadline() {
        let mut slot = TimerSlot::disarmed();
        slot.arm(Duration::from_millis(10));
        // Rearm before the first deadline elapses; only the second counts.
        std::thread::sleep(Duration::from_millis(2));
        let rearm_at = Instant::now();
        slot.arm(Duration::from_millis(40));

        let fired_at = slot.receiver().recv().unwrap();
        assert!(fired_at.duration_since(rearm_at) >= Duration::from_millis(39));
    }

    #[test]
    fn repeated_rearms_yield_exactly_one_fire() {
        let mut slot = TimerSlot::disarmed();
        for _ in 0..5 {
            slot.arm(Duration::from_millis(15));
            std::thread::sleep(Duration::from_millis(3));
        }
        let last_rearm = Instant::now();

        slot.receiver().recv().unwrap();
        slot.consume();
        assert!(last_rearm.elapsed() >= Duration::from_millis(11));

        select! {
            recv(slot.receiver()) -> _ => panic!("timer fired twice"),
            default(Duration::from_millis(40)) => {}
        }
    }

    #[test]
    fn disarm_prevents_fire() {
        let mut slot = TimerSlot::disarmed();
        slot.arm(Duration::from_millis(10));
        slot.disarm();
        select! {
            recv(slot.receiver()) -> _ => panic!("disarmed timer fired"),
            default(Duration::from_millis(40)) => {}
        }
    }
}
