//! Linux input event codes used by the driver.

use serde::{Deserialize, Serialize};

pub const EV_SYN: u16 = 0x00;
pub const EV_ABS: u16 = 0x03;

pub const SYN_REPORT: u16 = 0;
pub const SYN_MT_REPORT: u16 = 2;

pub const ABS_MT_SLOT: u16 = 0x2f;
pub const ABS_MT_TOUCH_MAJOR: u16 = 0x30;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;
pub const ABS_MT_TRACKING_ID: u16 = 0x39;

/// A single input event, without the kernel timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    pub fn abs(code: u16, value: i32) -> Self {
        Self::new(EV_ABS, code, value)
    }

    pub fn syn(code: u16) -> Self {
        Self::new(EV_SYN, code, 0)
    }

    pub fn is_frame_sync(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_REPORT
    }

    /// Symbolic name of the event type and code.
    pub fn describe(&self) -> (&'static str, &'static str) {
        let kind = match self.kind {
            EV_SYN => "EV_SYN",
            EV_ABS => "EV_ABS",
            _ => "EV_?",
        };
        let code = match (self.kind, self.code) {
            (EV_SYN, SYN_REPORT) => "SYN_REPORT",
            (EV_SYN, SYN_MT_REPORT) => "SYN_MT_REPORT",
            (EV_ABS, ABS_MT_SLOT) => "ABS_MT_SLOT",
            (EV_ABS, ABS_MT_TOUCH_MAJOR) => "ABS_MT_TOUCH_MAJOR",
            (EV_ABS, ABS_MT_POSITION_X) => "ABS_MT_POSITION_X",
            (EV_ABS, ABS_MT_POSITION_Y) => "ABS_MT_POSITION_Y",
            (EV_ABS, ABS_MT_TRACKING_ID) => "ABS_MT_TRACKING_ID",
            _ => "?",
        };
        (kind, code)
    }
}

impl std::fmt::Display for InputEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, code) = self.describe();
        write!(f, "{kind} {code} {}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let event = InputEvent::abs(ABS_MT_POSITION_X, 497);
        assert_eq!(event.to_string(), "EV_ABS ABS_MT_POSITION_X 497");
        assert_eq!(InputEvent::syn(SYN_MT_REPORT).to_string(), "EV_SYN SYN_MT_REPORT 0");
        assert!(InputEvent::syn(SYN_REPORT).is_frame_sync());
    }
}
