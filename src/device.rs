use std::{
    fmt::Display,
    io::{BufRead, Read},
    time::Duration,
};

use log::debug;

use crate::{
    discovery::{discover, MidiEndpoints},
    stream::{copy_min, PacketBuffer},
    Error, Transport,
};

/// A claimed USB-MIDI streaming interface, read as a stream of raw bytes.
///
/// Each USB-MIDI bulk packet starts with a header byte (cable number and
/// code index) that is dropped; everything after it is passed through
/// unchanged. No MIDI parsing happens here.
///
/// ```no_run
/// # #[cfg(target_os = "linux")] {
/// use std::time::Duration;
/// use usb_host_midi::MidiDevice;
///
/// let midi = usb_host_midi::list_devices()
///     .unwrap()
///     .filter(|d| d.has_midi_streaming_interface())
///     .find_map(|d| {
///         let dev = d.open().ok()?;
///         MidiDevice::new(dev, Some(Duration::from_millis(10))).ok()
///     });
///
/// if let Some(mut midi) = midi {
///     loop {
///         let bytes = midi.read(3).unwrap();
///         if !bytes.is_empty() {
///             println!("{bytes:02x?}");
///         }
///     }
/// }
/// # }
/// ```
///
/// The device is read from a single thread; all reads take `&mut self`.
pub struct MidiDevice<T: Transport> {
    transport: T,
    endpoints: MidiEndpoints,
    timeout_ms: u32,
    buffer: PacketBuffer,
}

/// Convert a read timeout to whole milliseconds, where 0 means wait forever.
///
/// Durations under a millisecond round up to 1 rather than turning into
/// "forever".
pub(crate) fn timeout_millis(timeout: Option<Duration>) -> u32 {
    match timeout {
        None => 0,
        Some(t) if t.is_zero() => 0,
        Some(t) => u32::try_from(t.as_millis()).unwrap_or(u32::MAX).max(1),
    }
}

impl<T: Transport> MidiDevice<T> {
    /// Find the MIDI streaming interface of `transport`, select its
    /// configuration and claim the interface.
    ///
    /// Reads wait up to `timeout` for a packet; `None` waits indefinitely.
    ///
    /// Fails with [`ErrorKind::NoMidiInterface`][crate::ErrorKind::NoMidiInterface]
    /// if configuration 0 has no MIDI streaming interface with an IN
    /// endpoint, or its descriptor lacks a usable `bConfigurationValue`. Errors from selecting the configuration or claiming the
    /// interface (for example [`ErrorKind::Busy`][crate::ErrorKind::Busy]) are
    /// returned as-is.
    pub fn new(mut transport: T, timeout: Option<Duration>) -> Result<Self, Error> {
        let config = transport.configuration_descriptor(0)?;
        let endpoints = discover(&config)?;

        transport.activate_configuration(endpoints.configuration_value())?;
        transport.claim_interface(endpoints.interface_number())?;
        debug!(
            "Claimed MIDI interface {}, reading from endpoint {:#04x}",
            endpoints.interface_number(),
            endpoints.in_endpoint()
        );

        Ok(MidiDevice {
            transport,
            endpoints,
            timeout_ms: timeout_millis(timeout),
            buffer: PacketBuffer::new(),
        })
    }

    /// `bInterfaceNumber` of the claimed MIDI streaming interface.
    pub fn interface_number(&self) -> u8 {
        self.endpoints.interface_number()
    }

    /// Address of the bulk IN endpoint that is read from.
    pub fn in_endpoint(&self) -> u8 {
        self.endpoints.in_endpoint()
    }

    /// Address of the bulk OUT endpoint, or 0 if the device has none.
    pub fn out_endpoint(&self) -> u8 {
        self.endpoints.out_endpoint()
    }

    /// Everything found while scanning the configuration descriptor.
    pub fn endpoints(&self) -> &MidiEndpoints {
        &self.endpoints
    }

    /// The timeout for each packet read, or `None` if reads wait indefinitely.
    pub fn read_timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms.into())),
        }
    }

    /// Set the timeout for each packet read; `None` waits indefinitely.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout_ms = timeout_millis(timeout);
    }

    /// Set the read timeout.
    ///
    /// See [Self::set_read_timeout] -- this is for method chaining with `MidiDevice::new()`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.set_read_timeout(timeout);
        self
    }

    /// Number of bytes of the last packet that have not been read yet.
    pub fn buffered(&self) -> usize {
        self.buffer.remaining()
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Destroy this `MidiDevice` and return the transport.
    ///
    /// Buffered bytes are discarded and the interface is not released.
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn refill(&mut self) -> Result<(), Error> {
        let endpoint = self.endpoints.in_endpoint();
        let timeout_ms = self.timeout_ms;
        let transport = &mut self.transport;
        self.buffer
            .refill_with(|buf| transport.read_bulk(endpoint, buf, timeout_ms))
    }

    /// Read up to `size` bytes.
    ///
    /// If nothing is buffered, this waits for one packet from the device.
    /// That wait happens even when `size` is 0. Otherwise it returns buffered
    /// bytes without touching the device.
    ///
    /// An empty result means no packet arrived within the timeout; call
    /// again to keep polling. Transport errors are returned unchanged.
    pub fn read(&mut self, size: usize) -> Result<&[u8], Error> {
        self.refill()?;
        Ok(self.buffer.take(size))
    }

    /// Read into the front of `dest`, returning the number of bytes written.
    ///
    /// Bytes that do not fit stay buffered for the next call.
    pub fn read_into(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
        let data = self.read(dest.len())?;
        Ok(copy_min(dest, data))
    }
}

impl<T: Transport> Read for MidiDevice<T> {
    /// Returns `Ok(0)` when the read timed out, which `std::io` helpers like
    /// `read_exact` treat as end of stream.
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        Ok(self.read_into(buf)?)
    }
}

impl<T: Transport> BufRead for MidiDevice<T> {
    #[inline]
    fn fill_buf(&mut self) -> Result<&[u8], std::io::Error> {
        self.refill()?;
        Ok(self.buffer.data())
    }

    #[inline]
    fn consume(&mut self, len: usize) {
        self.buffer.consume(len);
    }
}

impl<T: Transport> Display for MidiDevice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MIDI device {}/{}",
            self.transport.manufacturer_string().unwrap_or("unknown"),
            self.transport.product_string().unwrap_or("unknown"),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, Read};

    use super::*;
    use crate::{
        discovery::tests::KEYBOARD_CONFIG,
        transport::mock::{disconnected, Call, MockTransport},
        ErrorKind,
    };

    const NOTE_ON: [u8; 4] = [0x08, 0x90, 0x3c, 0x64];

    fn open(t: MockTransport) -> MidiDevice<MockTransport> {
        MidiDevice::new(t, Some(Duration::from_millis(10))).unwrap()
    }

    #[test]
    fn test_construction_sequence() {
        let midi = open(MockTransport::new(KEYBOARD_CONFIG));
        assert_eq!(midi.interface_number(), 1);
        assert_eq!(midi.in_endpoint(), 0x81);
        assert_eq!(midi.out_endpoint(), 0x01);
        assert_eq!(midi.read_timeout(), Some(Duration::from_millis(10)));
        assert_eq!(midi.buffered(), 0);
        assert_eq!(
            midi.transport().calls,
            vec![
                Call::ConfigurationDescriptor(0),
                Call::ActivateConfiguration(1),
                Call::ClaimInterface(1),
            ]
        );
        assert_eq!(midi.to_string(), "MIDI device Acme/unknown");
    }

    #[test]
    #[rustfmt::skip]
    fn test_no_midi_interface() {
        let mut t = MockTransport::new(&[
            0x09, 0x02, 0x19, 0x00, 0x01, 0x01, 0x00, 0xe0, 0x00,
            0x09, 0x04, 0x00, 0x00, 0x01, 0x09, 0x00, 0x00, 0x00,
            0x07, 0x05, 0x81, 0x03, 0x04, 0x00, 0x0c,
        ]);
        let err = MidiDevice::new(&mut t, None).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NoMidiInterface);
        assert_eq!(t.calls, vec![Call::ConfigurationDescriptor(0)]);
    }

    #[test]
    #[rustfmt::skip]
    fn test_never_selects_configuration_zero() {
        let mut t = MockTransport::new(&[
            0x09, 0x04, 0x01, 0x00, 0x02, 0x01, 0x03, 0x00, 0x00,
            0x07, 0x05, 0x81, 0x02, 0x40, 0x00, 0x00,
        ]);
        let err = MidiDevice::new(&mut t, None).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NoMidiInterface);
        assert!(!t.calls.contains(&Call::ActivateConfiguration(0)));
        assert_eq!(t.calls, vec![Call::ConfigurationDescriptor(0)]);
    }

    #[test]
    fn test_claim_error_propagated() {
        let mut t = MockTransport::new(KEYBOARD_CONFIG);
        t.claim_error = Some(Error::new_os(ErrorKind::Busy, "failed to claim interface", 16));
        let err = MidiDevice::new(t, None).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(err.os_error(), Some(16));
    }

    #[test]
    fn test_header_byte_dropped() {
        let mut midi = open(MockTransport::new(KEYBOARD_CONFIG).packet(&NOTE_ON));
        assert_eq!(midi.read(64).unwrap(), &[0x90, 0x3c, 0x64]);
        assert_eq!(
            midi.transport().calls[3],
            Call::ReadBulk {
                endpoint: 0x81,
                len: 64,
                timeout_ms: 10
            }
        );
    }

    #[test]
    fn test_partial_reads_use_one_packet() {
        let mut midi = open(MockTransport::new(KEYBOARD_CONFIG).packet(&NOTE_ON));
        assert_eq!(midi.read(1).unwrap(), &[0x90]);
        assert_eq!(midi.buffered(), 2);
        assert_eq!(midi.read(1).unwrap(), &[0x3c]);
        assert_eq!(midi.read(5).unwrap(), &[0x64]);
        assert_eq!(midi.transport().reads(), 1);

        // drained, so the next read goes back to the device and times out
        assert_eq!(midi.read(3).unwrap(), &[] as &[u8]);
        assert_eq!(midi.transport().reads(), 2);
    }

    #[test]
    fn test_read_never_spans_packets() {
        let mut midi = open(
            MockTransport::new(KEYBOARD_CONFIG)
                .packet(&NOTE_ON)
                .packet(&[0x08, 0x80, 0x3c, 0x00]),
        );
        assert_eq!(midi.read(6).unwrap(), &[0x90, 0x3c, 0x64]);
        assert_eq!(midi.read(6).unwrap(), &[0x80, 0x3c, 0x00]);
    }

    #[test]
    fn test_read_into_keeps_remainder() {
        let mut midi = open(
            MockTransport::new(KEYBOARD_CONFIG).packet(&[0x09, 0x90, 0x3c, 0x64, 0x09, 0x90, 0x40, 0x64]),
        );
        let mut buf = [0u8; 4];
        assert_eq!(midi.read_into(&mut buf).unwrap(), 4);
        assert_eq!(buf, [0x90, 0x3c, 0x64, 0x09]);
        assert_eq!(midi.buffered(), 3);

        let mut buf = [0u8; 8];
        assert_eq!(midi.read_into(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0x90, 0x40, 0x64]);
        assert_eq!(midi.transport().reads(), 1);
    }

    #[test]
    fn test_timeout_is_empty_read() {
        let mut midi = open(MockTransport::new(KEYBOARD_CONFIG).timeout().packet(&NOTE_ON));
        assert!(midi.read(3).unwrap().is_empty());
        assert_eq!(midi.buffered(), 0);
        assert_eq!(midi.read(3).unwrap(), &[0x90, 0x3c, 0x64]);
        assert_eq!(midi.transport().reads(), 2);
    }

    #[test]
    fn test_transport_error_propagated() {
        let mut midi = open(MockTransport::new(KEYBOARD_CONFIG).fail(disconnected()));
        let err = midi.read(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disconnected);
    }

    #[test]
    fn test_read_zero() {
        let mut midi = open(MockTransport::new(KEYBOARD_CONFIG).packet(&NOTE_ON));

        // empty buffer: the refill still happens
        assert!(midi.read(0).unwrap().is_empty());
        assert_eq!(midi.transport().reads(), 1);
        assert_eq!(midi.buffered(), 3);

        // buffered data: no transport call
        assert!(midi.read(0).unwrap().is_empty());
        assert_eq!(midi.transport().reads(), 1);
        assert_eq!(midi.buffered(), 3);
    }

    #[test]
    fn test_timeout_conversion() {
        assert_eq!(timeout_millis(None), 0);
        assert_eq!(timeout_millis(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_millis(Some(Duration::from_millis(10))), 10);
        assert_eq!(timeout_millis(Some(Duration::from_micros(100))), 1);
        assert_eq!(timeout_millis(Some(Duration::from_secs(u64::MAX))), u32::MAX);

        let mut midi = MidiDevice::new(MockTransport::new(KEYBOARD_CONFIG), None)
            .unwrap()
            .with_read_timeout(Some(Duration::from_millis(250)));
        assert_eq!(midi.read_timeout(), Some(Duration::from_millis(250)));
        midi.set_read_timeout(None);
        assert_eq!(midi.read_timeout(), None);
        midi.read(1).unwrap();
        assert!(matches!(
            midi.transport().calls.last(),
            Some(Call::ReadBulk { timeout_ms: 0, .. })
        ));
    }

    #[test]
    fn test_io_traits() {
        let mut midi = open(
            MockTransport::new(KEYBOARD_CONFIG)
                .packet(&NOTE_ON)
                .timeout()
                .packet(&[0x0b, 0xb0, 0x07, 0x7f]),
        );
        let mut buf = [0u8; 2];
        assert_eq!(Read::read(&mut midi, &mut buf).unwrap(), 2);
        assert_eq!(buf, [0x90, 0x3c]);
        assert_eq!(midi.fill_buf().unwrap(), &[0x64]);
        midi.consume(1);

        // timeout
        assert_eq!(midi.fill_buf().unwrap(), &[] as &[u8]);

        let mut v = Vec::new();
        midi.by_ref().take(3).read_to_end(&mut v).unwrap();
        assert_eq!(v, [0xb0, 0x07, 0x7f]);
    }

    #[test]
    fn test_borrowed_transport() {
        let mut t = MockTransport::new(KEYBOARD_CONFIG).packet(&NOTE_ON);
        {
            let mut midi = MidiDevice::new(&mut t, None).unwrap();
            assert_eq!(midi.read(3).unwrap(), &[0x90, 0x3c, 0x64]);
        }
        assert_eq!(t.reads(), 1);
    }

    #[test]
    fn test_io_error_kind() {
        let mut midi = open(MockTransport::new(KEYBOARD_CONFIG).fail(disconnected()));
        let mut buf = [0u8; 3];
        let err = Read::read(&mut midi, &mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    }
}
