//! The host-controller operations the MIDI driver depends on.

use crate::Error;

/// Result of a bulk IN transfer that did not fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A packet of this many bytes was written to the start of the buffer.
    Data(usize),

    /// No packet arrived before the timeout expired.
    TimedOut,
}

/// Access to an opened USB device.
///
/// [`MidiDevice`][crate::MidiDevice] uses this to fetch the configuration
/// descriptor, select the configuration, claim the MIDI interface, and then
/// receive packets from the bulk IN endpoint. On Linux,
/// [`LinuxDevice`][crate::LinuxDevice] implements it over usbfs; other host
/// stacks can implement it directly.
///
/// The trait is also implemented for `&mut T`, so a driver can borrow a
/// device that the caller keeps ownership of.
pub trait Transport {
    /// Get the configuration descriptor at `index`, including all trailing
    /// interface, endpoint, and class-specific descriptors.
    fn configuration_descriptor(&mut self, index: u8) -> Result<Vec<u8>, Error>;

    /// Select the configuration with the given `bConfigurationValue`.
    fn activate_configuration(&mut self, configuration_value: u8) -> Result<(), Error>;

    /// Claim an interface for exclusive use, detaching any kernel driver bound to it.
    fn claim_interface(&mut self, interface_number: u8) -> Result<(), Error>;

    /// Receive one packet from a bulk IN endpoint.
    ///
    /// A `timeout_ms` of 0 waits indefinitely. Running out of time is reported
    /// as [`ReadOutcome::TimedOut`], not as an error.
    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<ReadOutcome, Error>;

    /// Manufacturer string of the device, if known.
    fn manufacturer_string(&self) -> Option<&str> {
        None
    }

    /// Product string of the device, if known.
    fn product_string(&self) -> Option<&str> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn configuration_descriptor(&mut self, index: u8) -> Result<Vec<u8>, Error> {
        (**self).configuration_descriptor(index)
    }

    fn activate_configuration(&mut self, configuration_value: u8) -> Result<(), Error> {
        (**self).activate_configuration(configuration_value)
    }

    fn claim_interface(&mut self, interface_number: u8) -> Result<(), Error> {
        (**self).claim_interface(interface_number)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<ReadOutcome, Error> {
        (**self).read_bulk(endpoint, buf, timeout_ms)
    }

    fn manufacturer_string(&self) -> Option<&str> {
        (**self).manufacturer_string()
    }

    fn product_string(&self) -> Option<&str> {
        (**self).product_string()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;

    use super::{ReadOutcome, Transport};
    use crate::{Error, ErrorKind};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        ConfigurationDescriptor(u8),
        ActivateConfiguration(u8),
        ClaimInterface(u8),
        ReadBulk { endpoint: u8, len: usize, timeout_ms: u32 },
    }

    pub(crate) enum Reply {
        Packet(Vec<u8>),
        Timeout,
        Fail(Error),
    }

    /// Scripted device: serves a fixed configuration descriptor and replays
    /// queued replies to `read_bulk`, recording every call.
    pub(crate) struct MockTransport {
        pub config: Vec<u8>,
        pub replies: VecDeque<Reply>,
        pub calls: Vec<Call>,
        pub claim_error: Option<Error>,
    }

    impl MockTransport {
        pub fn new(config: &[u8]) -> Self {
            MockTransport {
                config: config.to_vec(),
                replies: VecDeque::new(),
                calls: Vec::new(),
                claim_error: None,
            }
        }

        pub fn packet(mut self, data: &[u8]) -> Self {
            self.replies.push_back(Reply::Packet(data.to_vec()));
            self
        }

        pub fn timeout(mut self) -> Self {
            self.replies.push_back(Reply::Timeout);
            self
        }

        pub fn fail(mut self, err: Error) -> Self {
            self.replies.push_back(Reply::Fail(err));
            self
        }

        pub fn reads(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, Call::ReadBulk { .. }))
                .count()
        }
    }

    impl Transport for MockTransport {
        fn configuration_descriptor(&mut self, index: u8) -> Result<Vec<u8>, Error> {
            self.calls.push(Call::ConfigurationDescriptor(index));
            Ok(self.config.clone())
        }

        fn activate_configuration(&mut self, configuration_value: u8) -> Result<(), Error> {
            self.calls.push(Call::ActivateConfiguration(configuration_value));
            Ok(())
        }

        fn claim_interface(&mut self, interface_number: u8) -> Result<(), Error> {
            self.calls.push(Call::ClaimInterface(interface_number));
            match self.claim_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn read_bulk(
            &mut self,
            endpoint: u8,
            buf: &mut [u8],
            timeout_ms: u32,
        ) -> Result<ReadOutcome, Error> {
            self.calls.push(Call::ReadBulk {
                endpoint,
                len: buf.len(),
                timeout_ms,
            });
            match self.replies.pop_front() {
                Some(Reply::Packet(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(ReadOutcome::Data(data.len()))
                }
                Some(Reply::Timeout) | None => Ok(ReadOutcome::TimedOut),
                Some(Reply::Fail(e)) => Err(e),
            }
        }

        fn manufacturer_string(&self) -> Option<&str> {
            Some("Acme")
        }
    }

    pub(crate) fn disconnected() -> Error {
        Error::new(ErrorKind::Disconnected, "device disconnected")
    }
}
