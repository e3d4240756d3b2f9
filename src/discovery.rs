//! Locating the MIDI streaming interface in a configuration descriptor.

use log::debug;

use crate::{
    descriptors::{DescriptorKind, Descriptors, Direction},
    Error, ErrorKind,
};

/// `bInterfaceClass` of USB Audio interfaces.
pub const AUDIO_CLASS: u8 = 0x01;

/// `bInterfaceSubClass` of MIDI Streaming interfaces within the Audio class.
pub const MIDI_STREAMING_SUBCLASS: u8 = 0x03;

/// Interface and endpoint addresses found by [`scan`].
///
/// Endpoint addresses that were not found are 0. Address 0 is the control
/// endpoint and is never a valid bulk endpoint, so it serves as the
/// "not found" value.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MidiEndpoints {
    configuration_value: u8,
    interface_found: bool,
    interface_number: u8,
    in_endpoint: u8,
    out_endpoint: u8,
}

impl MidiEndpoints {
    /// `bConfigurationValue` of the scanned configuration.
    pub fn configuration_value(&self) -> u8 {
        self.configuration_value
    }

    /// Whether any MIDI streaming interface was seen.
    pub fn interface_found(&self) -> bool {
        self.interface_found
    }

    /// `bInterfaceNumber` of the MIDI streaming interface, or 0.
    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    /// Address of the bulk IN endpoint, or 0.
    pub fn in_endpoint(&self) -> u8 {
        self.in_endpoint
    }

    /// Address of the bulk OUT endpoint, or 0.
    pub fn out_endpoint(&self) -> u8 {
        self.out_endpoint
    }

    /// A MIDI interface was found and it has an IN endpoint to read from.
    pub fn is_usable(&self) -> bool {
        self.interface_found && self.in_endpoint != 0
    }
}

/// Scan a configuration descriptor for the MIDI streaming interface.
///
/// Makes a single pass over the descriptors. Endpoints are attributed to the
/// most recent interface descriptor and are only recorded when that
/// interface is Audio / MIDI Streaming.
///
/// If the configuration has more than one MIDI streaming interface, the last
/// one wins: its interface number replaces the earlier one, and its
/// endpoints overwrite any found before it.
pub fn scan(config: &[u8]) -> MidiEndpoints {
    let mut found = MidiEndpoints::default();
    let mut current_is_midi = false;

    for desc in Descriptors::new(config) {
        match desc.kind() {
            DescriptorKind::Configuration(c) => {
                found.configuration_value = c.configuration_value();
            }
            DescriptorKind::Interface(intf) => {
                current_is_midi =
                    intf.class() == AUDIO_CLASS && intf.subclass() == MIDI_STREAMING_SUBCLASS;
                if current_is_midi {
                    debug!(
                        "MIDI streaming interface {} (alt {})",
                        intf.interface_number(),
                        intf.alternate_setting()
                    );
                    found.interface_found = true;
                    found.interface_number = intf.interface_number();
                }
            }
            DescriptorKind::Endpoint(ep) if current_is_midi => match ep.direction() {
                Direction::In => found.in_endpoint = ep.address(),
                Direction::Out => found.out_endpoint = ep.address(),
            },
            DescriptorKind::Endpoint(_) | DescriptorKind::Other(_) => {}
        }
    }

    found
}

/// Scan a configuration descriptor, failing if it has no usable MIDI
/// streaming interface.
///
/// A device without an OUT endpoint is accepted; one without an IN endpoint
/// is not, since there would be nothing to read from.
///
/// The table must start with a configuration record with a non-zero
/// `bConfigurationValue`. Selecting configuration 0 would leave the device
/// unconfigured.
pub fn discover(config: &[u8]) -> Result<MidiEndpoints, Error> {
    let found = scan(config);
    if !found.is_usable() {
        return Err(Error::new(
            ErrorKind::NoMidiInterface,
            "no MIDI streaming interface with an IN endpoint",
        )
        .log_debug());
    }

    if found.configuration_value == 0 {
        return Err(Error::new(
            ErrorKind::NoMidiInterface,
            "MIDI interface is not inside a configuration with a usable bConfigurationValue",
        )
        .log_debug());
    }

    debug!(
        "Found MIDI interface {} in={:#04x} out={:#04x} (configuration {})",
        found.interface_number, found.in_endpoint, found.out_endpoint, found.configuration_value
    );
    Ok(found)
}
