//! Turns tracked touches into multi-touch event sequences.

use crate::config::ProtocolVariant;
use crate::core::tracker::{FrameUpdate, TouchPoint};
use crate::output::event::{
    InputEvent, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_SLOT, ABS_MT_TOUCH_MAJOR,
    ABS_MT_TRACKING_ID, SYN_MT_REPORT, SYN_REPORT,
};
use crate::output::sink::EventSink;

/// Writes frames and liftoffs to a sink, counting failed writes.
#[derive(Debug)]
pub struct Emitter {
    protocol: ProtocolVariant,
    events_sent: u64,
    write_failures: u64,
}

impl Emitter {
    pub fn new(protocol: ProtocolVariant) -> Self {
        Self {
            protocol,
            events_sent: 0,
            write_failures: 0,
        }
    }

    pub fn events_sent(&self) -> u64 {
        self.events_sent
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// Report one frame. Touches still inside their delay window are
    /// counted down instead. Returns the number of touches reported.
    pub fn emit_frame<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        touches: &mut [TouchPoint],
        update: &FrameUpdate,
    ) -> usize {
        for &slot in &update.released_slots {
            self.release_slot(sink, slot);
        }

        let mut reported = 0;
        for touch in touches.iter_mut() {
            if touch.is_reportable() {
                if self.protocol == ProtocolVariant::B {
                    let slot = touch.slot.map_or(-1, |s| s as i32);
                    self.send(sink, InputEvent::abs(ABS_MT_SLOT, slot));
                }
                self.send(sink, InputEvent::abs(ABS_MT_TRACKING_ID, touch.tracking_id));
                self.send(sink, InputEvent::abs(ABS_MT_TOUCH_MAJOR, touch.touch_major));
                self.send(sink, InputEvent::abs(ABS_MT_POSITION_X, touch.x));
                self.send(sink, InputEvent::abs(ABS_MT_POSITION_Y, touch.y));
                if self.protocol == ProtocolVariant::A {
                    self.send(sink, InputEvent::syn(SYN_MT_REPORT));
                }
                reported += 1;
            } else if touch.touch_delay > 0 {
                touch.touch_delay -= 1;
            }
        }

        if reported > 0 || !update.released_slots.is_empty() {
            self.send(sink, InputEvent::syn(SYN_REPORT));
        }

        reported
    }

    /// Signal that nothing touches the sensor any more.
    pub fn emit_liftoff<S: EventSink + ?Sized>(&mut self, sink: &mut S, slots: &[usize]) {
        match self.protocol {
            ProtocolVariant::A => self.send(sink, InputEvent::syn(SYN_MT_REPORT)),
            ProtocolVariant::B => {
                for &slot in slots {
                    self.release_slot(sink, slot);
                }
            }
        }
        self.send(sink, InputEvent::syn(SYN_REPORT));
    }

    fn release_slot<S: EventSink + ?Sized>(&mut self, sink: &mut S, slot: usize) {
        self.send(sink, InputEvent::abs(ABS_MT_SLOT, slot as i32));
        self.send(sink, InputEvent::abs(ABS_MT_TRACKING_ID, -1));
    }

    fn send<S: EventSink + ?Sized>(&mut self, sink: &mut S, event: InputEvent) {
        match sink.send(event) {
            Ok(()) => self.events_sent += 1,
            Err(e) => {
                self.write_failures += 1;
                tracing::warn!(event = %event, "failed to send input event: {e}");
            }
        }
    }
}
