//! `ControlObject` and the sample-indexed event schedule (spec.md §4.3).
//!
//! Grounded on `original_source/src/IControlObject.h`'s holder indirection,
//! redesigned per spec.md §9: instead of a `ControlObjectHolder` shared
//! pointer chasing back to the owning node, each schedulable node embeds
//! its own `ControlObject<E>` (generic over that node's local event enum)
//! and drives it with `drive_events`, so firing an event is just a method
//! call on `self` — no arena lookup is needed because events only ever
//! mutate the node that owns them (drum hits schedule *their own*
//! follow-on events, they never reach across the graph).

use std::collections::BTreeMap;

pub type SampleIndex = u64;

/// `SortedMap<sample_index -> Vec<Event>>` (spec.md §3). Keys are the
/// absolute sample number, relative to the owning node's own monotonically
/// increasing sample counter.
pub struct EventMap<E> {
    events: BTreeMap<SampleIndex, Vec<E>>,
}

impl<E> Default for EventMap<E> {
    fn default() -> Self {
        EventMap { events: BTreeMap::new() }
    }
}

impl<E> EventMap<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: SampleIndex, event: E) {
        self.events.entry(at).or_default().push(event);
    }

    /// Sorted key indices with an event due in `[from, to)`.
    pub fn keys_in_range(&self, from: SampleIndex, to: SampleIndex) -> Vec<SampleIndex> {
        self.events.range(from..to).map(|(k, _)| *k).collect()
    }

    /// Removes and returns all events due exactly at `idx`.
    pub fn take_at(&mut self, idx: SampleIndex) -> Option<Vec<E>> {
        self.events.remove(&idx)
    }

    /// Cancels (removes) every event in `[from, to)`, returning how many
    /// were dropped. Used by `DrumHitSynth` when an overlapping hit
    /// supersedes a pending decay envelope (spec.md §8 scenario 6).
    pub fn cancel_range(&mut self, from: SampleIndex, to: SampleIndex) -> usize {
        let keys: Vec<SampleIndex> = self.events.range(from..to).map(|(k, _)| *k).collect();
        let mut n = 0;
        for k in keys {
            if let Some(v) = self.events.remove(&k) {
                n += v.len();
            }
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Owns the event map and the node's own sample counter. `refresh` lets an
/// event handler that just scheduled follow-on events inside the current
/// `[current_sample, current_sample+nframes)` window force the driving
/// loop to re-query rather than miss them (spec.md §4.3's refresh path).
pub struct ControlObject<E> {
    pub map: EventMap<E>,
    pub current_sample: SampleIndex,
    refresh: bool,
}

impl<E> Default for ControlObject<E> {
    fn default() -> Self {
        ControlObject {
            map: EventMap::new(),
            current_sample: 0,
            refresh: false,
        }
    }
}

impl<E> ControlObject<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: SampleIndex, event: E) {
        self.map.schedule(at, event);
    }

    pub fn request_refresh(&mut self) {
        self.refresh = true;
    }
}

/// Drives the per-sample event/processing loop of spec.md §4.3 for one
/// `get_samples` call of `nframes` samples. `fire` is invoked once per due
/// event (in insertion order for events sharing a sample index); `sample`
/// is invoked once per sample index after any due events have fired.
pub fn drive_events<E>(
    control: &mut ControlObject<E>,
    nframes: usize,
    mut fire: impl FnMut(&mut ControlObject<E>, E, SampleIndex),
    mut sample: impl FnMut(usize),
) {
    let start = control.current_sample;
    let mut events = control.map.keys_in_range(start, start + nframes as SampleIndex);
    let mut key_idx = 0usize;

    for i in 0..nframes {
        let now = start + i as SampleIndex;

        if control.refresh {
            events = control.map.keys_in_range(now, start + nframes as SampleIndex);
            key_idx = 0;
            control.refresh = false;
        }

        while key_idx < events.len() && events[key_idx] == now {
            if let Some(due) = control.map.take_at(now) {
                for ev in due {
                    fire(control, ev, now);
                }
            }
            key_idx += 1;
        }

        sample(i);
    }

    control.current_sample += nframes as SampleIndex;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum TestEvent {
        Mark(i32),
        ScheduleFollowOn,
    }

    #[test]
    fn events_fire_before_their_sample_is_processed() {
        let mut control = ControlObject::<TestEvent>::new();
        control.schedule(3, TestEvent::Mark(1));
        let mut fired_at = None;
        let mut processed = Vec::new();
        drive_events(
            &mut control,
            8,
            |_c, ev, now| {
                if let TestEvent::Mark(_) = ev {
                    fired_at = Some(now);
                }
            },
            |i| processed.push(i),
        );
        assert_eq!(fired_at, Some(3));
        assert_eq!(processed, (0..8).collect::<Vec<_>>());
        assert_eq!(control.current_sample, 8);
    }

    #[test]
    fn same_sample_events_fire_in_insertion_order() {
        let mut control = ControlObject::<TestEvent>::new();
        control.schedule(2, TestEvent::Mark(1));
        control.schedule(2, TestEvent::Mark(2));
        control.schedule(2, TestEvent::Mark(3));
        let mut order = Vec::new();
        drive_events(
            &mut control,
            4,
            |_c, ev, _now| {
                if let TestEvent::Mark(n) = ev {
                    order.push(n);
                }
            },
            |_| {},
        );
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn refresh_flag_picks_up_events_scheduled_inside_the_window() {
        let mut control = ControlObject::<TestEvent>::new();
        control.schedule(1, TestEvent::ScheduleFollowOn);
        let mut marks = Vec::new();
        drive_events(
            &mut control,
            6,
            |c, ev, now| match ev {
                TestEvent::ScheduleFollowOn => {
                    c.schedule(now + 2, TestEvent::Mark(42));
                    c.request_refresh();
                }
                TestEvent::Mark(n) => marks.push(n),
            },
            |_| {},
        );
        assert_eq!(marks, vec![42]);
    }

    #[test]
    fn cancel_range_drops_pending_events() {
        let mut map = EventMap::<TestEvent>::new();
        map.schedule(10, TestEvent::Mark(1));
        map.schedule(12, TestEvent::Mark(2));
        map.schedule(20, TestEvent::Mark(3));
        let removed = map.cancel_range(10, 15);
        assert_eq!(removed, 2);
        assert!(map.take_at(20).is_some());
    }
}
