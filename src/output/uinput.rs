//! Virtual multi-touch device backed by Linux uinput.

use crate::config::{Orientation, ProtocolVariant};
use crate::output::event::{
    InputEvent, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_SLOT, ABS_MT_TOUCH_MAJOR,
    ABS_MT_TRACKING_ID, EV_ABS, EV_SYN,
};
use crate::output::sink::EventSink;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use thiserror::Error;

const UINPUT_MAX_NAME_SIZE: usize = 80;
const ABS_CNT: usize = 0x40;
const BUS_VIRTUAL: u16 = 0x06;
const MAX_SLOTS: i32 = crate::core::MAX_TOUCH as i32;

// _IOW('U', nr, int) and _IO('U', nr)
const UI_DEV_CREATE: u64 = 0x5501;
const UI_DEV_DESTROY: u64 = 0x5502;
const UI_SET_EVBIT: u64 = 0x4004_5564;
const UI_SET_ABSBIT: u64 = 0x4004_5567;

#[repr(C)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

#[repr(C)]
struct UinputUserDev {
    name: [u8; UINPUT_MAX_NAME_SIZE],
    id: InputId,
    ff_effects_max: u32,
    absmax: [i32; ABS_CNT],
    absmin: [i32; ABS_CNT],
    absfuzz: [i32; ABS_CNT],
    absflat: [i32; ABS_CNT],
}

#[repr(C)]
struct RawInputEvent {
    time: libc::timeval,
    kind: u16,
    code: u16,
    value: i32,
}

/// Errors creating or driving the virtual device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("uinput {step} failed: {source}")]
    Setup {
        step: &'static str,
        source: io::Error,
    },
}

/// Capabilities and identity of the virtual touchscreen.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub protocol: ProtocolVariant,
}

impl DeviceSpec {
    pub fn new(name: &str, orientation: Orientation, protocol: ProtocolVariant) -> Self {
        let (width, height) = orientation.resolution();
        Self {
            name: name.to_string(),
            width,
            height,
            protocol,
        }
    }

    fn absolute_axes(&self) -> Vec<u16> {
        let mut axes = Vec::with_capacity(5);
        if self.protocol == ProtocolVariant::B {
            axes.push(ABS_MT_SLOT);
        }
        axes.extend_from_slice(&[
            ABS_MT_TRACKING_ID,
            ABS_MT_TOUCH_MAJOR,
            ABS_MT_POSITION_X,
            ABS_MT_POSITION_Y,
        ]);
        axes
    }

    fn user_dev(&self) -> UinputUserDev {
        let mut dev = UinputUserDev {
            name: [0; UINPUT_MAX_NAME_SIZE],
            id: InputId {
                bustype: BUS_VIRTUAL,
                vendor: 1,
                product: 1,
                version: 1,
            },
            ff_effects_max: 0,
            absmax: [0; ABS_CNT],
            absmin: [0; ABS_CNT],
            absfuzz: [0; ABS_CNT],
            absflat: [0; ABS_CNT],
        };

        let name = self.name.as_bytes();
        let len = name.len().min(UINPUT_MAX_NAME_SIZE - 1);
        dev.name[..len].copy_from_slice(&name[..len]);

        dev.absmax[ABS_MT_POSITION_X as usize] = self.width;
        dev.absmax[ABS_MT_POSITION_Y as usize] = self.height;
        dev.absfuzz[ABS_MT_POSITION_X as usize] = 2;
        dev.absfuzz[ABS_MT_POSITION_Y as usize] = 1;
        if self.protocol == ProtocolVariant::B {
            dev.absmax[ABS_MT_SLOT as usize] = MAX_SLOTS - 1;
        }
        dev
    }
}

/// A created uinput device. Destroyed on drop.
pub struct UinputDevice {
    file: File,
    path: PathBuf,
}

impl UinputDevice {
    /// Open the uinput node, declare capabilities and create the device.
    pub fn create(path: &Path, spec: &DeviceSpec) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| DeviceError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let mut device = Self {
            file,
            path: path.to_path_buf(),
        };

        let dev = spec.user_dev();
        // SAFETY: UinputUserDev is repr(C) plain data; the slice covers exactly its bytes.
        let bytes = unsafe {
            std::slice::from_raw_parts(
                &dev as *const UinputUserDev as *const u8,
                std::mem::size_of::<UinputUserDev>(),
            )
        };
        device
            .file
            .write_all(bytes)
            .map_err(|source| DeviceError::Setup {
                step: "device setup",
                source,
            })?;

        device.ioctl(UI_SET_EVBIT, EV_SYN as libc::c_int, "set EV_SYN")?;
        device.ioctl(UI_SET_EVBIT, EV_ABS as libc::c_int, "set EV_ABS")?;
        for axis in spec.absolute_axes() {
            device.ioctl(UI_SET_ABSBIT, axis as libc::c_int, "set absolute axis")?;
        }
        device.ioctl(UI_DEV_CREATE, 0, "device create")?;

        tracing::info!(
            name = %spec.name,
            width = spec.width,
            height = spec.height,
            protocol = ?spec.protocol,
            "created virtual touchscreen"
        );
        Ok(device)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl(
        &self,
        request: u64,
        arg: libc::c_int,
        step: &'static str,
    ) -> Result<(), DeviceError> {
        // SAFETY: plain integer-argument uinput ioctls on an fd we own.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg) };
        if rc < 0 {
            return Err(DeviceError::Setup {
                step,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl EventSink for UinputDevice {
    fn send(&mut self, event: InputEvent) -> io::Result<()> {
        let raw = RawInputEvent {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            kind: event.kind,
            code: event.code,
            value: event.value,
        };
        // SAFETY: RawInputEvent matches struct input_event and is plain data.
        let bytes = unsafe {
            std::slice::from_raw_parts(
                &raw as *const RawInputEvent as *const u8,
                std::mem::size_of::<RawInputEvent>(),
            )
        };

        let written = self.file.write(bytes)?;
        if written != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {written} of {} bytes", bytes.len()),
            ));
        }
        Ok(())
    }
}

impl Drop for UinputDevice {
    fn drop(&mut self) {
        // SAFETY: argument-less ioctl on an fd we own.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), UI_DEV_DESTROY as _) };
        if rc < 0 {
            tracing::warn!(
                "failed to destroy uinput device: {}",
                io::Error::last_os_error()
            );
        }
    }
}
