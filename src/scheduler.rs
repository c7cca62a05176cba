//! Event scheduler: a priority queue keyed on absolute tick, per §4.1.
//!
//! Events live in a small arena (`EventList`) and are kept ordered by
//! `at_tick`, earliest first, as a singly-linked list of arena indices —
//! the direct idiomatic-Rust analogue of the C original's intrusive list
//! with `next` pointers, without the unsafety a raw pointer list would
//! need. `enqueue`/`dequeue`/`run` preserve the invariant
//! `queued ⇔ event appears in exactly one list` (§8 invariant 3).
//!
//! Components register the *meaning* of an event as a `Copy` tag (`K`)
//! rather than a function pointer with an opaque context, since in safe
//! Rust a callback that needs `&mut Machine` cannot own a closure over
//! `&mut Machine` itself. `run` dequeues and returns the due events in
//! tick order; the caller (which does hold `&mut Machine`) dispatches on
//! the tag and commonly re-enqueues the same handle from inside that
//! dispatch, exactly as the source's callbacks re-enqueue themselves.

use crate::tick::{at_or_after, Tick};

/// Opaque handle into an [`EventList`]'s arena. Stable for the lifetime of
/// the event (components allocate one handle per logical event and reuse
/// it for the life of the machine).
pub type EventHandle = usize;

struct Slot<K> {
    at_tick: Tick,
    kind: K,
    queued: bool,
    next: Option<EventHandle>,
}

/// An ordered list of scheduled events sharing one tick domain (the source
/// keeps a separate list per domain: "machine" and "UI").
pub struct EventList<K> {
    slots: Vec<Slot<K>>,
    head: Option<EventHandle>,
}

impl<K: Copy> EventList<K> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
        }
    }

    /// Allocate a new, initially-unqueued event with the given tag.
    pub fn alloc(&mut self, kind: K) -> EventHandle {
        self.slots.push(Slot {
            at_tick: 0,
            kind,
            queued: false,
            next: None,
        });
        self.slots.len() - 1
    }

    /// `true` if the event is currently queued (on this list).
    pub fn is_queued(&self, handle: EventHandle) -> bool {
        self.slots[handle].queued
    }

    pub fn at_tick(&self, handle: EventHandle) -> Tick {
        self.slots[handle].at_tick
    }

    pub fn kind(&self, handle: EventHandle) -> K {
        self.slots[handle].kind
    }

    /// Insert `handle` ordered by `at_tick`, earliest first. If already
    /// queued, it is unlinked first so it never appears twice (§4.1
    /// enqueue).
    pub fn enqueue(&mut self, handle: EventHandle, at_tick: Tick, now: Tick) {
        if self.slots[handle].queued {
            self.unlink(handle);
        }
        self.slots[handle].at_tick = at_tick;
        self.slots[handle].queued = true;

        let mut prev: Option<EventHandle> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            // Order by signed delta from `now` so a list spanning a tick
            // wrap still sorts correctly.
            if crate::tick::delta(now, self.slots[c].at_tick) > crate::tick::delta(now, at_tick) {
                break;
            }
            prev = Some(c);
            cur = self.slots[c].next;
        }
        self.slots[handle].next = cur;
        match prev {
            Some(p) => self.slots[p].next = Some(handle),
            None => self.head = Some(handle),
        }
    }

    /// Remove `handle` from the list if queued; no-op otherwise.
    pub fn dequeue(&mut self, handle: EventHandle) {
        if self.slots[handle].queued {
            self.unlink(handle);
        }
    }

    fn unlink(&mut self, handle: EventHandle) {
        self.slots[handle].queued = false;
        if self.head == Some(handle) {
            self.head = self.slots[handle].next;
            self.slots[handle].next = None;
            return;
        }
        let mut cur = self.head;
        while let Some(c) = cur {
            if self.slots[c].next == Some(handle) {
                self.slots[c].next = self.slots[handle].next;
                self.slots[handle].next = None;
                return;
            }
            cur = self.slots[c].next;
        }
        self.slots[handle].next = None;
    }

    /// Dequeue and return every event due at or before `now`, earliest
    /// first. The caller is responsible for invoking each event's handler
    /// and re-enqueuing it if required (§4.1 `run`).
    pub fn run(&mut self, now: Tick) -> Vec<(EventHandle, K)> {
        let mut due = Vec::new();
        while let Some(head) = self.head {
            if at_or_after(self.slots[head].at_tick, now) {
                due.push((head, self.slots[head].kind));
                self.unlink(head);
            } else {
                break;
            }
        }
        due
    }

    /// Tick of the earliest queued event, if any.
    pub fn next_tick(&self) -> Option<Tick> {
        self.head.map(|h| self.slots[h].at_tick)
    }
}

impl<K: Copy> Default for EventList<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestKind {
        A,
        B,
        C,
    }

    #[test]
    fn enqueue_orders_by_tick() {
        let mut list: EventList<TestKind> = EventList::new();
        let a = list.alloc(TestKind::A);
        let b = list.alloc(TestKind::B);
        let c = list.alloc(TestKind::C);

        list.enqueue(a, 30, 0);
        list.enqueue(b, 10, 0);
        list.enqueue(c, 20, 0);

        let due = list.run(100);
        assert_eq!(due, vec![(b, TestKind::B), (c, TestKind::C), (a, TestKind::A)]);
    }

    #[test]
    fn run_only_returns_due_events() {
        let mut list: EventList<TestKind> = EventList::new();
        let a = list.alloc(TestKind::A);
        let b = list.alloc(TestKind::B);
        list.enqueue(a, 10, 0);
        list.enqueue(b, 20, 0);

        let due = list.run(15);
        assert_eq!(due, vec![(a, TestKind::A)]);
        assert!(!list.is_queued(a));
        assert!(list.is_queued(b));
    }

    #[test]
    fn dequeue_removes_from_list() {
        let mut list: EventList<TestKind> = EventList::new();
        let a = list.alloc(TestKind::A);
        list.enqueue(a, 10, 0);
        assert!(list.is_queued(a));
        list.dequeue(a);
        assert!(!list.is_queued(a));
        assert_eq!(list.run(100), vec![]);
    }

    #[test]
    fn re_enqueue_moves_event_without_duplicating() {
        let mut list: EventList<TestKind> = EventList::new();
        let a = list.alloc(TestKind::A);
        list.enqueue(a, 10, 0);
        list.enqueue(a, 50, 0);
        assert_eq!(list.next_tick(), Some(50));
        // still exactly one entry
        let due = list.run(1000);
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn handles_tick_wrap() {
        let mut list: EventList<TestKind> = EventList::new();
        let a = list.alloc(TestKind::A);
        let now: Tick = u32::MAX - 2;
        list.enqueue(a, 5, now); // 5 is "ahead" of now across the wrap
        assert_eq!(list.run(now), vec![]);
        assert_eq!(list.run(5), vec![(a, TestKind::A)]);
    }
}
