//! Frame-to-frame touch tracking and noise filtering.
//!
//! Each frame's blobs are matched against the previous frame by nearest
//! screen distance. Matched touches keep their tracking id and pass
//! through the averaging filter; implausible jumps are split into a
//! liftoff and a new touch unless they look like the continuation of a
//! fast swipe. New touches are admitted according to their peak
//! intensity, and a lone touch is held still near its touchdown point so
//! long-presses survive sensor jitter.

use crate::config::{FilterConfig, PipelineConfig, ProtocolVariant, Tuning};
use crate::core::regions::Blob;
use crate::core::MAX_TOUCH;
use std::f32::consts::{PI, TAU};

/// Tracking ids are recycled once the counter passes this value.
pub const TRACKING_ID_WRAP: i32 = 2_147_483_000;

/// One tracked contact.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchPoint {
    pub i: f32,
    pub j: f32,
    pub weight: f32,
    pub touch_major: i32,
    /// Reported position after filtering
    pub x: i32,
    pub y: i32,
    /// Position straight from the extractor
    pub raw_x: i32,
    pub raw_y: i32,
    /// Peak intensity, or 0 once the touch has been rejected
    pub validity: u8,
    /// -1 until an id is allocated
    pub tracking_id: i32,
    pub slot: Option<usize>,
    /// Index of the matched point in the previous frame
    pub prev_index: Option<usize>,
    /// Squared distance moved since the previous frame
    pub distance: i32,
    /// Direction of the last movement, `atan2(dx, dy)`
    pub direction: f32,
    /// Frames left before this touch is reported
    pub touch_delay: u32,
}

impl TouchPoint {
    pub fn from_blob(blob: &Blob) -> Self {
        Self {
            i: blob.i,
            j: blob.j,
            weight: blob.weight,
            touch_major: blob.touch_major,
            x: blob.x,
            y: blob.y,
            raw_x: blob.x,
            raw_y: blob.y,
            validity: blob.peak,
            tracking_id: -1,
            slot: None,
            prev_index: None,
            distance: 0,
            direction: 0.0,
            touch_delay: 0,
        }
    }

    /// Admitted to tracking (possibly still held back).
    pub fn is_admitted(&self) -> bool {
        self.validity > 0
    }

    /// Admitted and past its report delay.
    pub fn is_reportable(&self) -> bool {
        self.validity > 0 && self.touch_delay == 0
    }
}

/// Per-frame output besides the touch list itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameUpdate {
    /// Slots that must be lifted before the touches are reported
    pub released_slots: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    InUse,
    /// Was in use last frame and not yet reclaimed this frame
    Stale,
}

/// Hardware slot bookkeeping for the slotted protocol.
#[derive(Debug)]
struct SlotTable {
    states: [SlotState; MAX_TOUCH],
}

impl SlotTable {
    fn new() -> Self {
        Self {
            states: [SlotState::Free; MAX_TOUCH],
        }
    }

    fn begin_frame(&mut self) {
        for state in self.states.iter_mut() {
            if *state == SlotState::InUse {
                *state = SlotState::Stale;
            }
        }
    }

    fn claim(&mut self, slot: usize) {
        self.states[slot] = SlotState::InUse;
    }

    /// Lowest slot not claimed this frame, lifting it first if it was stale.
    fn allocate(&mut self, released: &mut Vec<usize>) -> Option<usize> {
        let slot = self
            .states
            .iter()
            .position(|&s| s != SlotState::InUse)?;
        if self.states[slot] == SlotState::Stale {
            released.push(slot);
        }
        self.states[slot] = SlotState::InUse;
        Some(slot)
    }

    fn release_stale(&mut self, released: &mut Vec<usize>) {
        for (slot, state) in self.states.iter_mut().enumerate() {
            if *state == SlotState::Stale {
                released.push(slot);
                *state = SlotState::Free;
            }
        }
    }

    fn release_all(&mut self) -> Vec<usize> {
        let mut released = Vec::new();
        for (slot, state) in self.states.iter_mut().enumerate() {
            if *state != SlotState::Free {
                released.push(slot);
                *state = SlotState::Free;
            }
        }
        released
    }
}

/// Anchor for the single-touch debounce filter.
#[derive(Debug, Default)]
struct Debounce {
    /// Set after a full liftoff; the next lone touch records the anchor.
    armed: bool,
    anchor: Option<(i32, i32)>,
}

/// Owns the three-frame touch history and the identity counter.
#[derive(Debug)]
pub struct TouchTracker {
    current: Vec<TouchPoint>,
    previous: Vec<TouchPoint>,
    previous2: Vec<TouchPoint>,
    next_tracking_id: i32,
    lifted: bool,
    debounce: Debounce,
    slots: SlotTable,
    protocol: ProtocolVariant,
    filters: FilterConfig,
    tuning: Tuning,
}

impl TouchTracker {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            current: Vec::with_capacity(MAX_TOUCH),
            previous: Vec::with_capacity(MAX_TOUCH),
            previous2: Vec::with_capacity(MAX_TOUCH),
            next_tracking_id: 0,
            lifted: true,
            debounce: Debounce {
                armed: true,
                anchor: None,
            },
            slots: SlotTable::new(),
            protocol: config.protocol,
            filters: config.filters.clone(),
            tuning: config.tuning.clone(),
        }
    }

    /// Touches of the most recent frame.
    pub fn current(&self) -> &[TouchPoint] {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut [TouchPoint] {
        &mut self.current
    }

    /// The id the next admitted touch will receive.
    pub fn next_tracking_id(&self) -> i32 {
        self.next_tracking_id
    }

    /// Whether the tracker is waiting for a fresh touchdown.
    pub fn is_lifted(&self) -> bool {
        self.lifted
    }

    /// Number of admitted touches in the current frame.
    pub fn admitted_count(&self) -> usize {
        self.current.iter().filter(|t| t.is_admitted()).count()
    }

    /// Forget all history after a liftoff. Returns the slots that were in use.
    pub fn reset(&mut self) -> Vec<usize> {
        self.current.clear();
        self.previous.clear();
        self.previous2.clear();
        self.lifted = true;
        self.debounce = Debounce {
            armed: true,
            anchor: None,
        };
        self.slots.release_all()
    }

    /// Match a new frame's blobs against history and filter them.
    pub fn track(&mut self, blobs: &[Blob]) -> FrameUpdate {
        if self.lifted {
            self.previous.clear();
            self.previous2.clear();
            self.lifted = false;
        } else {
            self.previous2 = std::mem::take(&mut self.previous);
            self.previous = std::mem::take(&mut self.current);
        }

        self.current = blobs
            .iter()
            .take(MAX_TOUCH)
            .map(TouchPoint::from_blob)
            .collect();

        let mut update = FrameUpdate::default();
        let slotted = self.protocol == ProtocolVariant::B;
        if slotted {
            self.slots.begin_frame();
        }

        let matches = self.match_previous();

        for (idx, matched) in matches.into_iter().enumerate() {
            let Some((prev_idx, distance)) = matched else {
                self.admit_new(idx);
                continue;
            };

            if self.filters.jump_rejection
                && distance > self.tuning.max_delta_sq()
                && !self.continues_swipe(idx, prev_idx)
            {
                tracing::trace!(
                    tracking_id = self.previous[prev_idx].tracking_id,
                    distance,
                    "jump too large, treating as a new touch"
                );
                // The old slot stays stale and is lifted below.
                self.admit_new(idx);
                continue;
            }

            self.continue_touch(idx, prev_idx, distance);
            if slotted {
                if let Some(slot) = self.previous[prev_idx].slot {
                    self.current[idx].slot = Some(slot);
                    self.slots.claim(slot);
                }
            }
        }

        if slotted {
            self.assign_slots(&mut update.released_slots);
        }

        if self.filters.debounce {
            self.apply_debounce();
        }

        if self.next_tracking_id > TRACKING_ID_WRAP {
            self.next_tracking_id = 0;
        }

        update
    }

    /// Nearest valid previous point per blob, with duplicate claims resolved
    /// in favor of the closer blob.
    fn match_previous(&self) -> Vec<Option<(usize, i32)>> {
        let mut matches: Vec<Option<(usize, i32)>> = self
            .current
            .iter()
            .map(|t| {
                let mut best: Option<(usize, i32)> = None;
                for (p, prev) in self.previous.iter().enumerate() {
                    if !prev.is_admitted() {
                        continue;
                    }
                    let dx = t.raw_x - prev.raw_x;
                    let dy = t.raw_y - prev.raw_y;
                    let d = dx * dx + dy * dy;
                    if best.map_or(true, |(_, bd)| d < bd) {
                        best = Some((p, d));
                    }
                }
                best
            })
            .collect();

        for a in 0..matches.len() {
            for b in a + 1..matches.len() {
                if let (Some((pa, da)), Some((pb, db))) = (matches[a], matches[b]) {
                    if pa == pb {
                        if da < db {
                            matches[b] = None;
                        } else {
                            matches[a] = None;
                        }
                    }
                }
            }
        }

        matches
    }

    /// A large jump is still the same touch if the previous point was
    /// already moving fast in about the same direction.
    fn continues_swipe(&mut self, idx: usize, prev_idx: usize) -> bool {
        let prev = &self.previous[prev_idx];
        if prev.distance <= self.tuning.min_prev_delta_sq() {
            return false;
        }

        let t = &mut self.current[idx];
        t.direction = direction(t.x - prev.x, t.y - prev.y);
        turn(t.direction, prev.direction).abs() < self.tuning.max_delta_angle
    }

    fn continue_touch(&mut self, idx: usize, prev_idx: usize, distance: i32) {
        let prev = &self.previous[prev_idx];
        let second = prev
            .prev_index
            .and_then(|p| self.previous2.get(p))
            .map(|p2| (p2.raw_x, p2.raw_y));
        let (prev_id, prev_delay) = (prev.tracking_id, prev.touch_delay);
        let (prev_x, prev_y, prev_raw_x, prev_raw_y) = (prev.x, prev.y, prev.raw_x, prev.raw_y);

        let t = &mut self.current[idx];
        t.tracking_id = prev_id;
        t.prev_index = Some(prev_idx);
        t.touch_delay = prev_delay;
        t.distance = distance;
        t.direction = direction(t.x - prev_x, t.y - prev_y);

        if self.filters.averaging {
            let (mut xsum, mut ysum, mut div) =
                (4 * t.raw_x + 2 * prev_raw_x, 4 * t.raw_y + 2 * prev_raw_y, 6);
            if let Some((x2, y2)) = second {
                xsum += x2;
                ysum += y2;
                div += 1;
            }
            t.x = xsum / div;
            t.y = ysum / div;
        }
    }

    fn admit_new(&mut self, idx: usize) {
        let t = &mut self.current[idx];
        if t.validity <= self.tuning.delay_threshold {
            t.validity = 0;
            return;
        }

        t.tracking_id = self.next_tracking_id;
        self.next_tracking_id += 1;
        if t.validity < self.tuning.initial_threshold {
            t.touch_delay = self.tuning.delay_frames;
        }
        tracing::trace!(
            tracking_id = t.tracking_id,
            x = t.x,
            y = t.y,
            delay = t.touch_delay,
            "new touch"
        );
    }

    fn assign_slots(&mut self, released: &mut Vec<usize>) {
        for t in self.current.iter_mut() {
            if t.slot.is_none() && t.is_reportable() {
                t.slot = self.slots.allocate(released);
            }
        }
        self.slots.release_stale(released);
    }

    fn apply_debounce(&mut self) {
        let mut admitted = self.current.iter_mut().filter(|t| t.is_admitted());
        let (Some(t), None) = (admitted.next(), admitted.next()) else {
            if self.admitted_count() > 1 {
                self.debounce.armed = false;
                self.debounce.anchor = None;
            }
            return;
        };

        if self.debounce.armed {
            self.debounce.armed = false;
            self.debounce.anchor = Some((t.x, t.y));
        } else if let Some((ax, ay)) = self.debounce.anchor {
            let radius = self.tuning.debounce_radius;
            if (ax - t.x).abs() <= radius && (ay - t.y).abs() <= radius {
                t.x = ax;
                t.y = ay;
            } else {
                self.debounce.anchor = None;
            }
        }
    }
}

fn direction(dx: i32, dy: i32) -> f32 {
    (dx as f32).atan2(dy as f32)
}

/// Signed change between two directions, in `[-PI, PI]`.
fn turn(to: f32, from: f32) -> f32 {
    let mut d = to - from;
    if d > PI {
        d -= TAU;
    } else if d < -PI {
        d += TAU;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(x: i32, y: i32, peak: u8) -> Blob {
        Blob {
            i: 0.0,
            j: 0.0,
            weight: 1.0,
            peak,
            touch_major: 25,
            x,
            y,
        }
    }

    fn config(averaging: bool, debounce: bool) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.filters.averaging = averaging;
        config.filters.debounce = debounce;
        config
    }

    fn ids(tracker: &TouchTracker) -> Vec<i32> {
        tracker.current().iter().map(|t| t.tracking_id).collect()
    }

    #[test]
    fn test_small_motion_keeps_identity() {
        let mut tracker = TouchTracker::new(&config(true, false));
        tracker.track(&[blob(400, 300, 100)]);
        tracker.track(&[blob(420, 310, 100)]);
        tracker.track(&[blob(440, 320, 100)]);

        assert_eq!(ids(&tracker), vec![0]);
        assert_eq!(tracker.next_tracking_id(), 1);
    }

    #[test]
    fn test_averaging_filter_weights() {
        let mut tracker = TouchTracker::new(&config(true, false));
        tracker.track(&[blob(100, 100, 100)]);
        tracker.track(&[blob(112, 100, 100)]);
        // (4*112 + 2*100) / 6
        assert_eq!(tracker.current()[0].x, 108);

        tracker.track(&[blob(121, 100, 100)]);
        // (4*121 + 2*112 + 100) / 7
        assert_eq!(tracker.current()[0].x, 115);
        assert_eq!(tracker.current()[0].raw_x, 121);
    }

    #[test]
    fn test_jump_in_new_direction_gets_new_identity() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.track(&[blob(100, 100, 100)]);
        tracker.track(&[blob(600, 500, 100)]);

        assert_eq!(ids(&tracker), vec![1]);
        assert_eq!(tracker.current()[0].prev_index, None);
    }

    #[test]
    fn test_fast_swipe_keeps_identity() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.track(&[blob(300, 100, 100)]);
        // 60px along y: above the swipe speed threshold.
        tracker.track(&[blob(300, 160, 100)]);
        // 200px further along y exceeds the jump limit but keeps direction.
        tracker.track(&[blob(302, 360, 100)]);

        assert_eq!(ids(&tracker), vec![0]);
        assert_eq!(tracker.current()[0].prev_index, Some(0));
    }

    #[test]
    fn test_fast_swipe_across_angle_seam_keeps_identity() {
        let mut tracker = TouchTracker::new(&config(false, false));
        // Moving up the screen with a pixel of sideways jitter puts the two
        // directions on opposite sides of +-PI.
        tracker.track(&[blob(300, 700, 100)]);
        tracker.track(&[blob(299, 640, 100)]);
        tracker.track(&[blob(301, 440, 100)]);

        assert_eq!(ids(&tracker), vec![0]);
        assert_eq!(tracker.current()[0].prev_index, Some(0));
    }

    #[test]
    fn test_fast_touch_turning_sharply_is_split() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.track(&[blob(300, 100, 100)]);
        tracker.track(&[blob(300, 160, 100)]);
        // Fast enough to swipe, but the jump goes sideways.
        tracker.track(&[blob(500, 160, 100)]);

        assert_eq!(ids(&tracker), vec![1]);
        assert_eq!(tracker.current()[0].prev_index, None);
    }

    #[test]
    fn test_turn_wraps() {
        assert!(turn(PI - 0.01, -PI + 0.02).abs() < 0.05);
        assert!((turn(0.5, 0.2) - 0.3).abs() < 1e-6);
        assert!((turn(-PI + 0.1, PI - 0.1) - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_slow_touch_jump_is_split() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.track(&[blob(300, 100, 100)]);
        tracker.track(&[blob(300, 110, 100)]);
        tracker.track(&[blob(300, 310, 100)]);

        assert_eq!(ids(&tracker), vec![1]);
    }

    #[test]
    fn test_jump_filter_disabled_keeps_identity() {
        let mut config = config(false, false);
        config.filters.jump_rejection = false;
        let mut tracker = TouchTracker::new(&config);
        tracker.track(&[blob(100, 100, 100)]);
        tracker.track(&[blob(900, 700, 100)]);

        assert_eq!(ids(&tracker), vec![0]);
    }

    #[test]
    fn test_conflicting_claims_go_to_closest() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.track(&[blob(500, 500, 100)]);
        tracker.track(&[blob(560, 500, 100), blob(510, 500, 100)]);

        assert_eq!(ids(&tracker), vec![1, 0]);
    }

    #[test]
    fn test_admission_thresholds() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.track(&[
            blob(100, 100, 24),
            blob(300, 300, 25),
            blob(500, 500, 31),
            blob(700, 700, 32),
        ]);

        let current = tracker.current();
        assert!(!current[0].is_admitted());
        assert_eq!(current[0].tracking_id, -1);
        assert_eq!((current[1].tracking_id, current[1].touch_delay), (0, 2));
        assert_eq!((current[2].tracking_id, current[2].touch_delay), (1, 2));
        assert_eq!((current[3].tracking_id, current[3].touch_delay), (2, 0));
        assert_eq!(tracker.admitted_count(), 3);
    }

    #[test]
    fn test_rejected_touch_is_never_matched() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.track(&[blob(100, 100, 22)]);
        tracker.track(&[blob(102, 100, 40)]);

        assert_eq!(ids(&tracker), vec![0]);
        assert_eq!(tracker.current()[0].prev_index, None);
    }

    #[test]
    fn test_debounce_clamps_until_escape() {
        let mut tracker = TouchTracker::new(&config(false, true));
        tracker.track(&[blob(500, 400, 100)]);
        assert_eq!((tracker.current()[0].x, tracker.current()[0].y), (500, 400));

        tracker.track(&[blob(506, 395, 100)]);
        assert_eq!((tracker.current()[0].x, tracker.current()[0].y), (500, 400));

        tracker.track(&[blob(520, 400, 100)]);
        assert_eq!(tracker.current()[0].x, 520);

        // Back inside the radius: no clamping for the rest of this touch.
        tracker.track(&[blob(503, 400, 100)]);
        assert_eq!(tracker.current()[0].x, 503);
    }

    #[test]
    fn test_debounce_rearms_after_reset() {
        let mut tracker = TouchTracker::new(&config(false, true));
        tracker.track(&[blob(500, 400, 100)]);
        tracker.track(&[blob(530, 400, 100)]);
        tracker.reset();

        tracker.track(&[blob(200, 200, 100)]);
        tracker.track(&[blob(205, 204, 100)]);
        assert_eq!((tracker.current()[0].x, tracker.current()[0].y), (200, 200));
    }

    #[test]
    fn test_second_finger_disarms_debounce() {
        let mut tracker = TouchTracker::new(&config(false, true));
        tracker.track(&[blob(500, 400, 100)]);
        tracker.track(&[blob(500, 400, 100), blob(100, 100, 100)]);
        tracker.track(&[blob(504, 400, 100)]);

        assert_eq!(tracker.current()[0].x, 504);
    }

    #[test]
    fn test_reset_starts_fresh_chain() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.track(&[blob(100, 100, 100)]);
        tracker.reset();
        assert!(tracker.is_lifted());

        tracker.track(&[blob(101, 100, 100)]);
        assert_eq!(ids(&tracker), vec![1]);
        assert!(!tracker.is_lifted());
    }

    #[test]
    fn test_tracking_id_wraps() {
        let mut tracker = TouchTracker::new(&config(false, false));
        tracker.next_tracking_id = TRACKING_ID_WRAP;
        tracker.track(&[blob(100, 100, 100)]);
        assert_eq!(tracker.current()[0].tracking_id, TRACKING_ID_WRAP);
        assert_eq!(tracker.next_tracking_id(), 0);
    }

    #[test]
    fn test_slots_follow_touches() {
        let mut config = config(false, false);
        config.protocol = ProtocolVariant::B;
        let mut tracker = TouchTracker::new(&config);

        let update = tracker.track(&[blob(100, 100, 100), blob(600, 600, 100)]);
        assert!(update.released_slots.is_empty());
        let slots: Vec<_> = tracker.current().iter().map(|t| t.slot).collect();
        assert_eq!(slots, vec![Some(0), Some(1)]);

        // First finger lifts: its slot is released, the other keeps slot 1.
        let update = tracker.track(&[blob(602, 600, 100)]);
        assert_eq!(update.released_slots, vec![0]);
        assert_eq!(tracker.current()[0].slot, Some(1));

        // A new finger reuses the freed slot.
        let update = tracker.track(&[blob(100, 100, 100), blob(604, 600, 100)]);
        assert!(update.released_slots.is_empty());
        assert_eq!(tracker.current()[0].slot, Some(0));

        assert_eq!(tracker.reset(), vec![0, 1]);
    }

    #[test]
    fn test_jump_split_hands_over_slot() {
        let mut config = config(false, false);
        config.protocol = ProtocolVariant::B;
        let mut tracker = TouchTracker::new(&config);

        tracker.track(&[blob(100, 100, 100)]);
        assert_eq!(tracker.current()[0].slot, Some(0));

        // The old contact is lifted and the new one takes its slot.
        let update = tracker.track(&[blob(600, 600, 100)]);
        assert_eq!(update.released_slots, vec![0]);
        assert_eq!(tracker.current()[0].slot, Some(0));
        assert_eq!(ids(&tracker), vec![1]);
    }

    #[test]
    fn test_delayed_touch_waits_for_slot() {
        let mut config = config(false, false);
        config.protocol = ProtocolVariant::B;
        let mut tracker = TouchTracker::new(&config);

        tracker.track(&[blob(100, 100, 28)]);
        assert_eq!(tracker.current()[0].slot, None);
        tracker.current_mut()[0].touch_delay = 0;

        tracker.track(&[blob(100, 100, 28)]);
        assert_eq!(tracker.current()[0].slot, Some(0));
    }
}
