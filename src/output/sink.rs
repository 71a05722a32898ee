//! Destinations for emitted input events.

use crate::output::event::InputEvent;
use std::io::{self, Write};

/// Anything that accepts an ordered stream of input events.
pub trait EventSink {
    fn send(&mut self, event: InputEvent) -> io::Result<()>;
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn send(&mut self, event: InputEvent) -> io::Result<()> {
        (**self).send(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn send(&mut self, event: InputEvent) -> io::Result<()> {
        (**self).send(event)
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<InputEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[InputEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for RecordingSink {
    fn send(&mut self, event: InputEvent) -> io::Result<()> {
        self.events.push(event);
        Ok(())
    }
}

/// Writes one line per event, `SYN_REPORT` followed by a blank line.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for TextSink<W> {
    fn send(&mut self, event: InputEvent) -> io::Result<()> {
        writeln!(self.out, "{event}")?;
        if event.is_frame_sync() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::event::{ABS_MT_TRACKING_ID, SYN_REPORT};

    #[test]
    fn test_recording_sink() {
        let mut sink = RecordingSink::new();
        sink.send(InputEvent::abs(ABS_MT_TRACKING_ID, 3)).unwrap();
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_text_sink_separates_frames() {
        let mut sink = TextSink::new(Vec::new());
        sink.send(InputEvent::abs(ABS_MT_TRACKING_ID, 3)).unwrap();
        sink.send(InputEvent::syn(SYN_REPORT)).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "EV_ABS ABS_MT_TRACKING_ID 3\nEV_SYN SYN_REPORT 0\n\n");
    }
}
