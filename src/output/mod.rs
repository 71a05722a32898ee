//! Event output: codes, sinks, the frame emitter and the uinput device.

pub mod emitter;
pub mod event;
pub mod sink;

#[cfg(target_os = "linux")]
pub mod uinput;

pub use emitter::Emitter;
pub use event::InputEvent;
pub use sink::{EventSink, RecordingSink, TextSink};

#[cfg(target_os = "linux")]
pub use uinput::{DeviceError, DeviceSpec, UinputDevice};
