#![warn(missing_docs)]
//! A host-side driver for USB MIDI devices.
//!
//! `usb-host-midi` finds the MIDI Streaming interface of an attached device
//! from its configuration descriptor, claims it, and reads the raw bytes the
//! device sends on its bulk IN endpoint. It does not parse MIDI messages;
//! hand the byte stream to a MIDI parser for that.
//!
//! Use [`list_devices`] to find devices, [`DeviceInfo::open`] to open one,
//! and [`MidiDevice::new`] to claim its MIDI interface. Devices without a
//! MIDI interface fail with [`ErrorKind::NoMidiInterface`], so callers can
//! simply try each device in turn:
//!
//! ```no_run
//! # #[cfg(target_os = "linux")] {
//! use std::time::Duration;
//! use usb_host_midi::MidiDevice;
//!
//! for info in usb_host_midi::list_devices().unwrap() {
//!     let Ok(dev) = info.open() else { continue };
//!     match MidiDevice::new(dev, Some(Duration::from_millis(10))) {
//!         Ok(midi) => println!("found {midi}"),
//!         Err(e) => println!("{:04x}:{:04x}: {e}", info.vendor_id(), info.product_id()),
//!     }
//! }
//! # }
//! ```
//!
//! ### USB-MIDI framing
//!
//! Every USB-MIDI bulk packet starts with a header byte (cable number and
//! code index number). [`MidiDevice`] drops that byte and passes everything
//! after it through unchanged, one packet at a time.
//!
//! ### Other hosts
//!
//! The driver talks to the device only through the [`Transport`] trait. The
//! built-in implementation is [`LinuxDevice`], which uses usbfs on Linux and
//! Android. Implement [`Transport`] to run the driver on another host stack.
//!
//! ### Logging
//!
//! `usb-host-midi` uses the [`log`](https://docs.rs/log) crate to log
//! debug and error information. Use a `log` backend like
//! [env_logger](https://docs.rs/env_logger) with
//! `RUST_LOG=usb_host_midi=debug` to see which interfaces and endpoints were
//! found and every transport call that failed.

mod platform;

pub mod descriptors;

mod discovery;
pub use discovery::{
    discover, scan, MidiEndpoints, AUDIO_CLASS, MIDI_STREAMING_SUBCLASS,
};

mod error;
pub use error::{Error, ErrorKind};

mod transport;
pub use transport::{ReadOutcome, Transport};

mod stream;
pub use stream::PACKET_SIZE;

mod device;
pub use device::MidiDevice;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod enumeration;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use enumeration::{DeviceInfo, InterfaceInfo};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use platform::{list_devices, LinuxDevice};
