// Copyright (c) 2024-present Arclight Animation contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Authored animation events and the per-update sampled event stream.

use crate::{Percentage, Seconds, StringId};

/// How an authored event occupies time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnimationEventKind {
    /// A single point in time; fires when an update window passes over it.
    Immediate,
    /// A window of time; sampled on every update that intersects it, with a
    /// percent-through value.
    Durable,
}

/// An event authored on an animation clip.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationEvent {
    /// Identity of the event, e.g. `Footstep`.
    pub id: StringId,
    /// Immediate or durable.
    pub kind: AnimationEventKind,
    /// Start time in seconds from clip start.
    pub start_time: Seconds,
    /// Duration in seconds; zero for immediate events.
    pub duration: Seconds,
}

impl AnimationEvent {
    /// Creates an immediate event at a point in time.
    pub fn immediate(id: StringId, start_time: Seconds) -> Self {
        Self {
            id,
            kind: AnimationEventKind::Immediate,
            start_time,
            duration: 0.0,
        }
    }

    /// Creates a durable event covering a window.
    pub fn durable(id: StringId, start_time: Seconds, duration: Seconds) -> Self {
        Self {
            id,
            kind: AnimationEventKind::Durable,
            start_time,
            duration,
        }
    }

    /// End time of the event's support in seconds.
    #[inline]
    pub fn end_time(&self) -> Seconds {
        self.start_time + self.duration
    }
}

/// Where a sampled event came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SampledEventSource {
    /// Sampled from a clip's authored event list; carries the clip asset id.
    AnimationClip(u64),
    /// Emitted by a state node (entry/exit markers).
    State,
}

/// One event sampled during a graph update.
#[derive(Clone, Debug)]
pub struct SampledEvent {
    /// Origin of the event.
    pub source: SampledEventSource,
    /// Identity of the event.
    pub id: StringId,
    /// Relevance of the event for this update. Every blend that reduces the
    /// contributing branch's influence attenuates this.
    pub weight: f32,
    /// Progress through the event window; always `1.0` for immediate and
    /// state events.
    pub percent_through: Percentage,
    /// Set when the event belongs to another layer and should be skipped by
    /// gameplay.
    pub is_ignored: bool,
    /// Set when the event was sampled from a branch that is being abandoned
    /// this frame (e.g. a losing transition source).
    pub from_inactive_branch: bool,
}

impl SampledEvent {
    /// Returns `true` for events emitted by state nodes.
    #[inline]
    pub fn is_state_event(&self) -> bool {
        self.source == SampledEventSource::State
    }
}

/// A `(start, end)` index window into the sampled events buffer. Valid until
/// the next evaluation begins.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SampledEventRange {
    /// First index of the range.
    pub start: u32,
    /// One past the last index of the range.
    pub end: u32,
}

impl SampledEventRange {
    /// An empty range anchored at a buffer position.
    #[inline]
    pub fn empty_at(at: u32) -> Self {
        Self { start: at, end: at }
    }

    /// Number of events covered.
    #[inline]
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if no events are covered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The smallest range covering both inputs. Ranges produced by one update
    /// are contiguous, so this is how blend-like nodes merge child ranges.
    #[inline]
    pub fn join(a: Self, b: Self) -> Self {
        Self {
            start: a.start.min(b.start),
            end: a.end.max(b.end),
        }
    }
}

/// Collects the events sampled during one evaluation, in traversal order.
#[derive(Debug, Default)]
pub struct SampledEventsBuffer {
    events: Vec<SampledEvent>,
}

impl SampledEventsBuffer {
    /// Drops all events; called at the start of every evaluation.
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of events currently collected.
    #[inline]
    pub fn len(&self) -> u32 {
        self.events.len() as u32
    }

    /// Returns `true` if nothing was sampled yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Marks the start of a node's event range: the current buffer length.
    #[inline]
    pub fn mark(&self) -> u32 {
        self.events.len() as u32
    }

    /// Builds the range from a previous [`Self::mark`] to the current length.
    #[inline]
    pub fn range_from(&self, start: u32) -> SampledEventRange {
        SampledEventRange {
            start,
            end: self.events.len() as u32,
        }
    }

    /// Appends an event and returns its index.
    pub fn push(&mut self, event: SampledEvent) -> u32 {
        let index = self.events.len() as u32;
        self.events.push(event);
        index
    }

    /// All sampled events in sampling order.
    #[inline]
    pub fn events(&self) -> &[SampledEvent] {
        &self.events
    }

    /// The events of a range.
    #[inline]
    pub fn slice(&self, range: SampledEventRange) -> &[SampledEvent] {
        &self.events[range.start as usize..range.end as usize]
    }

    /// Scales the weight of every event in the range; blend-like nodes call
    /// this with each branch's influence.
    pub fn attenuate(&mut self, range: SampledEventRange, factor: f32) {
        for event in &mut self.events[range.start as usize..range.end as usize] {
            event.weight *= factor;
        }
    }

    /// Flags every event in the range as ignored.
    pub fn mark_ignored(&mut self, range: SampledEventRange) {
        for event in &mut self.events[range.start as usize..range.end as usize] {
            event.is_ignored = true;
        }
    }

    /// Flags every event in the range as coming from a branch that is being
    /// abandoned this frame.
    pub fn mark_from_inactive_branch(&mut self, range: SampledEventRange) {
        for event in &mut self.events[range.start as usize..range.end as usize] {
            event.from_inactive_branch = true;
        }
    }

    /// Looks for a state event with the given id, skipping ignored events.
    pub fn contains_state_event(&self, id: StringId) -> bool {
        self.events
            .iter()
            .any(|e| e.is_state_event() && !e.is_ignored && e.id == id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn state_event(id: StringId) -> SampledEvent {
        SampledEvent {
            source: SampledEventSource::State,
            id,
            weight: 1.0,
            percent_through: 1.0,
            is_ignored: false,
            from_inactive_branch: false,
        }
    }

    #[test]
    fn ranges_track_pushes() {
        let mut buffer = SampledEventsBuffer::default();
        let start = buffer.mark();
        buffer.push(state_event(StringId::from_name("a")));
        buffer.push(state_event(StringId::from_name("b")));
        let range = buffer.range_from(start);
        assert_eq!(range.len(), 2);
        assert_eq!(buffer.slice(range).len(), 2);
    }

    #[test]
    fn attenuate_scales_weights_in_range_only() {
        let mut buffer = SampledEventsBuffer::default();
        buffer.push(state_event(StringId::from_name("outside")));
        let start = buffer.mark();
        buffer.push(state_event(StringId::from_name("inside")));
        let range = buffer.range_from(start);
        buffer.attenuate(range, 0.25);
        assert_eq!(buffer.events()[0].weight, 1.0);
        assert_eq!(buffer.events()[1].weight, 0.25);
    }

    #[test]
    fn state_event_lookup_skips_ignored() {
        let mut buffer = SampledEventsBuffer::default();
        let id = StringId::from_name("Footstep");
        buffer.push(state_event(id));
        assert!(buffer.contains_state_event(id));
        buffer.mark_ignored(SampledEventRange { start: 0, end: 1 });
        assert!(!buffer.contains_state_event(id));
    }

    #[test]
    fn join_merges_contiguous_ranges() {
        let a = SampledEventRange { start: 2, end: 4 };
        let b = SampledEventRange { start: 4, end: 7 };
        assert_eq!(
            SampledEventRange::join(a, b),
            SampledEventRange { start: 2, end: 7 }
        );
        assert!(SampledEventRange::empty_at(3).is_empty());
    }
}
