//! Utilities for walking USB descriptors.
//!
//! A configuration descriptor as returned by a device is a table of
//! variable-length records, each starting with `bLength` and
//! `bDescriptorType`. The types here are zero-copy views over those bytes.

use std::{fmt::Debug, iter, ops::Deref};

use log::warn;

pub(crate) const DESCRIPTOR_TYPE_DEVICE: u8 = 0x01;
pub(crate) const DESCRIPTOR_LEN_DEVICE: u8 = 18;

pub(crate) const DESCRIPTOR_TYPE_CONFIGURATION: u8 = 0x02;
pub(crate) const DESCRIPTOR_LEN_CONFIGURATION: u8 = 9;

pub(crate) const DESCRIPTOR_TYPE_INTERFACE: u8 = 0x04;
pub(crate) const DESCRIPTOR_LEN_INTERFACE: u8 = 9;

pub(crate) const DESCRIPTOR_TYPE_ENDPOINT: u8 = 0x05;
pub(crate) const DESCRIPTOR_LEN_ENDPOINT: u8 = 7;

/// Bit of `bEndpointAddress` set for IN (device-to-host) endpoints.
pub const ENDPOINT_DIR_IN: u8 = 0x80;

/// A raw USB descriptor.
///
/// Wraps a byte slice to provide access to the bytes of a descriptor by implementing `Deref` to `[u8]`,
/// while also exposing the descriptor length and type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor<'a>(&'a [u8]);

impl<'a> Descriptor<'a> {
    /// Create a `Descriptor` from a buffer.
    ///
    /// Returns `None` if
    ///   * the slice length is not at least 2.
    ///   * the `bLength` field (first byte) is greater than the slice length.
    pub fn new(buf: &'a [u8]) -> Option<Descriptor<'a>> {
        if buf.len() >= 2 && buf.len() >= buf[0] as usize {
            Some(Descriptor(buf))
        } else {
            None
        }
    }

    /// Get the length field of the descriptor.
    #[doc(alias = "bLength")]
    pub fn descriptor_len(&self) -> usize {
        self.0[0] as usize
    }

    /// Get the type field of the descriptor.
    #[doc(alias = "bDescriptorType")]
    pub fn descriptor_type(&self) -> u8 {
        self.0[1]
    }

    /// Classify this descriptor by its type field.
    ///
    /// Configuration, interface and endpoint descriptors shorter than their
    /// standard length are returned as [`DescriptorKind::Other`] so that
    /// field accessors never read past the record.
    pub fn kind(&self) -> DescriptorKind<'a> {
        let ty = self.descriptor_type();
        let min_len = match ty {
            DESCRIPTOR_TYPE_CONFIGURATION => DESCRIPTOR_LEN_CONFIGURATION,
            DESCRIPTOR_TYPE_INTERFACE => DESCRIPTOR_LEN_INTERFACE,
            DESCRIPTOR_TYPE_ENDPOINT => DESCRIPTOR_LEN_ENDPOINT,
            _ => return DescriptorKind::Other(self.clone()),
        };

        let len = self.descriptor_len().min(self.0.len());
        if len < min_len as usize {
            warn!("ignoring descriptor of type {ty} and length {len} because the minimum length is {min_len}");
            return DescriptorKind::Other(self.clone());
        }

        let buf = &self.0[..len];
        match ty {
            DESCRIPTOR_TYPE_CONFIGURATION => {
                DescriptorKind::Configuration(ConfigurationDescriptor(buf))
            }
            DESCRIPTOR_TYPE_INTERFACE => DescriptorKind::Interface(InterfaceDescriptor(buf)),
            _ => DescriptorKind::Endpoint(EndpointDescriptor(buf)),
        }
    }
}

impl<'a> Deref for Descriptor<'a> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0
    }
}

/// A descriptor record, tagged by the types this crate understands.
#[derive(Clone, Debug)]
pub enum DescriptorKind<'a> {
    /// `bDescriptorType` 0x02
    Configuration(ConfigurationDescriptor<'a>),

    /// `bDescriptorType` 0x04
    Interface(InterfaceDescriptor<'a>),

    /// `bDescriptorType` 0x05
    Endpoint(EndpointDescriptor<'a>),

    /// Any other record (class-specific, interface association, string, ...),
    /// or a known type that was too short to decode.
    Other(Descriptor<'a>),
}

/// An iterator over a sequence of USB descriptors.
///
/// Iteration stops at the first record whose `bLength` is less than 2 or
/// runs past the end of the buffer.
#[derive(Clone)]
pub struct Descriptors<'a>(&'a [u8]);

impl<'a> Descriptors<'a> {
    /// Iterate the descriptors in a buffer of concatenated descriptors.
    pub fn new(buf: &'a [u8]) -> Self {
        Descriptors(buf)
    }

    /// Get the concatenated bytes of the remaining descriptors.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    fn split_first(&self) -> Option<(&'a [u8], &'a [u8])> {
        if self.0.len() < 2 {
            return None;
        }

        if self.0[0] < 2 {
            warn!(
                "descriptor with bLength {} can't point to next descriptor",
                self.0[0]
            );
            return None;
        }

        if self.0[0] as usize > self.0.len() {
            warn!(
                "descriptor with bLength {} exceeds remaining buffer length {}",
                self.0[0],
                self.0.len()
            );
            return None;
        }

        Some(self.0.split_at(self.0[0] as usize))
    }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = Descriptor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((cur, next)) = self.split_first() {
            self.0 = next;
            Some(Descriptor(cur))
        } else {
            self.0 = &[];
            None
        }
    }
}

macro_rules! descriptor_fields {
    (impl $(<$( $i_lt:lifetime ),+>)? $tname:ident $(<$( $t_lt:lifetime ),+>)? {
        $(
            $(#[$attr:meta])*
            $vis:vis fn $name:ident at $pos:literal -> $ty:ty;
        )*
    }) => {
        impl $(<$( $i_lt ),+>)? $tname $(<$( $t_lt ),+>)? {
            $(
                $(#[$attr])*
                #[inline]
                $vis fn $name(&self) -> $ty {
                    let mut bytes = [0; std::mem::size_of::<$ty>()];
                    bytes.copy_from_slice(&self.0[$pos..$pos + std::mem::size_of::<$ty>()]);
                    <$ty>::from_le_bytes(bytes)
                }
            )*
        }
    }
}

/// Check whether the buffer contains a valid device descriptor.
/// On success, it will return length of the descriptor, or returns `None`.
pub(crate) fn validate_device_descriptor(buf: &[u8]) -> Option<usize> {
    if buf.len() < DESCRIPTOR_LEN_DEVICE as usize {
        if !buf.is_empty() {
            warn!(
                "device descriptor buffer is {} bytes, need {}",
                buf.len(),
                DESCRIPTOR_LEN_DEVICE
            );
        }
        return None;
    }

    if buf[0] < DESCRIPTOR_LEN_DEVICE {
        warn!("invalid device descriptor bLength");
        return None;
    }

    if buf[1] != DESCRIPTOR_TYPE_DEVICE {
        warn!(
            "device bDescriptorType is {}, not a device descriptor",
            buf[1]
        );
        return None;
    }

    Some(buf[0] as usize)
}

/// Information about a USB device.
#[derive(Clone)]
pub struct DeviceDescriptor([u8; DESCRIPTOR_LEN_DEVICE as usize]);

impl DeviceDescriptor {
    /// Create a `DeviceDescriptor` from a buffer beginning with a device descriptor.
    ///
    /// Returns `None` if the buffer does not start with a valid device descriptor.
    pub fn new(buf: &[u8]) -> Option<Self> {
        validate_device_descriptor(buf)?;
        let mut bytes = [0; DESCRIPTOR_LEN_DEVICE as usize];
        bytes.copy_from_slice(&buf[..DESCRIPTOR_LEN_DEVICE as usize]);
        Some(Self(bytes))
    }

    /// Get the bytes of the descriptor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

descriptor_fields! {
    impl DeviceDescriptor {
        /// `bcdUSB` descriptor field: USB Specification Number.
        #[doc(alias = "bcdUSB")]
        pub fn usb_version at 2 -> u16;

        /// `bDeviceClass` descriptor field: Class code, assigned by USB-IF.
        #[doc(alias = "bDeviceClass")]
        pub fn class at 4 -> u8;

        /// `bDeviceSubClass` descriptor field: Subclass code, assigned by USB-IF.
        #[doc(alias = "bDeviceSubClass")]
        pub fn subclass at 5 -> u8;

        /// `bDeviceProtocol` descriptor field: Protocol code, assigned by USB-IF.
        #[doc(alias = "bDeviceProtocol")]
        pub fn protocol at 6 -> u8;

        /// `idVendor` descriptor field: Vendor ID, assigned by USB-IF.
        #[doc(alias = "idVendor")]
        pub fn vendor_id at 8 -> u16;

        /// `idProduct` descriptor field: Product ID, assigned by the manufacturer.
        #[doc(alias = "idProduct")]
        pub fn product_id at 10 -> u16;

        /// `bcdDevice` descriptor field: Device release number.
        #[doc(alias = "bcdDevice")]
        pub fn device_version at 12 -> u16;

        /// `bNumConfigurations` descriptor field: Number of configurations
        #[doc(alias = "bNumConfigurations")]
        pub fn num_configurations at 17 -> u8;
    }
}

impl Debug for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("usb_version", &format_args!("0x{:04X}", self.usb_version()))
            .field("class", &format_args!("0x{:02X}", self.class()))
            .field("subclass", &format_args!("0x{:02X}", self.subclass()))
            .field("protocol", &format_args!("0x{:02X}", self.protocol()))
            .field("vendor_id", &format_args!("0x{:04X}", self.vendor_id()))
            .field("product_id", &format_args!("0x{:04X}", self.product_id()))
            .field(
                "device_version",
                &format_args!("0x{:04X}", self.device_version()),
            )
            .field("num_configurations", &self.num_configurations())
            .finish()
    }
}

pub(crate) fn validate_config_descriptor(buf: &[u8]) -> Option<usize> {
    if buf.len() < DESCRIPTOR_LEN_CONFIGURATION as usize {
        if !buf.is_empty() {
            warn!(
                "config descriptor buffer is {} bytes, need {}",
                buf.len(),
                DESCRIPTOR_LEN_CONFIGURATION
            );
        }
        return None;
    }

    if buf[0] < DESCRIPTOR_LEN_CONFIGURATION {
        warn!("invalid config descriptor bLength");
        return None;
    }

    if buf[1] != DESCRIPTOR_TYPE_CONFIGURATION {
        warn!(
            "config bDescriptorType is {}, not a configuration descriptor",
            buf[1]
        );
        return None;
    }

    let total_len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    if total_len < buf[0] as usize || total_len > buf.len() {
        warn!(
            "invalid config descriptor wTotalLen of {total_len} (buffer size is {bufsize})",
            bufsize = buf.len()
        );
        return None;
    }

    Some(total_len)
}

/// Split a chain of concatenated configuration descriptors by `wTotalLength`.
pub(crate) fn parse_concatenated_config_descriptors(mut buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    iter::from_fn(move || {
        let total_len = validate_config_descriptor(buf)?;
        let descriptors = &buf[..total_len];
        buf = &buf[total_len..];
        Some(descriptors)
    })
}

/// Make public when fuzzing
#[cfg(fuzzing)]
pub fn fuzz_parse_concatenated_config_descriptors(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    parse_concatenated_config_descriptors(buf)
}

/// View of a configuration descriptor header.
#[derive(Clone)]
pub struct ConfigurationDescriptor<'a>(&'a [u8]);

descriptor_fields! {
    impl<'a> ConfigurationDescriptor<'a> {
        /// `wTotalLength` descriptor field: length of this configuration including all trailing descriptors.
        #[doc(alias = "wTotalLength")]
        pub fn total_length at 2 -> u16;

        /// `bNumInterfaces` descriptor field: Number of interfaces.
        #[doc(alias = "bNumInterfaces")]
        pub fn num_interfaces at 4 -> u8;

        /// `bConfigurationValue` descriptor field: Identifier for the configuration.
        ///
        /// This is the value passed to
        /// [`Transport::activate_configuration`][crate::Transport::activate_configuration].
        #[doc(alias = "bConfigurationValue")]
        pub fn configuration_value at 5 -> u8;

        /// `bmAttributes` descriptor field: Bitmap of configuration attributes.
        #[doc(alias = "bmAttributes")]
        pub fn attributes at 7 -> u8;

        /// `bMaxPower` descriptor field: Maximum power, in units of **2** milliamps.
        #[doc(alias = "bMaxPower")]
        pub fn max_power at 8 -> u8;
    }
}

impl<'a> Debug for ConfigurationDescriptor<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationDescriptor")
            .field("total_length", &self.total_length())
            .field("num_interfaces", &self.num_interfaces())
            .field("configuration_value", &self.configuration_value())
            .field("attributes", &format_args!("0x{:02X}", self.attributes()))
            .field("max_power", &self.max_power())
            .finish()
    }
}

/// View of an interface descriptor, one per alternate setting.
#[derive(Clone)]
pub struct InterfaceDescriptor<'a>(&'a [u8]);

descriptor_fields! {
    impl<'a> InterfaceDescriptor<'a> {
        /// `bInterfaceNumber` descriptor field: Identifier for the interface.
        #[doc(alias = "bInterfaceNumber")]
        pub fn interface_number at 2 -> u8;

        /// `bAlternateSetting` descriptor field: Identifier for this alternate setting.
        #[doc(alias = "bAlternateSetting")]
        pub fn alternate_setting at 3 -> u8;

        /// `bNumEndpoints` descriptor field: Number of endpoints in this alternate setting.
        #[doc(alias = "bNumEndpoints")]
        pub fn num_endpoints at 4 -> u8;

        /// `bInterfaceClass` descriptor field: Standard interface class.
        #[doc(alias = "bInterfaceClass")]
        pub fn class at 5 -> u8;

        /// `bInterfaceSubClass` descriptor field: Standard interface subclass.
        #[doc(alias = "bInterfaceSubClass")]
        pub fn subclass at 6 -> u8;

        /// `bInterfaceProtocol` descriptor field: Standard interface protocol.
        #[doc(alias = "bInterfaceProtocol")]
        pub fn protocol at 7 -> u8;
    }
}

impl<'a> Debug for InterfaceDescriptor<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceDescriptor")
            .field("interface_number", &self.interface_number())
            .field("alternate_setting", &self.alternate_setting())
            .field("num_endpoints", &self.num_endpoints())
            .field("class", &format_args!("0x{:02X}", self.class()))
            .field("subclass", &format_args!("0x{:02X}", self.subclass()))
            .field("protocol", &format_args!("0x{:02X}", self.protocol()))
            .finish()
    }
}

/// Endpoint direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Out,

    /// Device to host
    In,
}

/// Endpoint transfer type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EndpointType {
    /// Control endpoint.
    Control,

    /// Isochronous endpoint.
    Isochronous,

    /// Bulk endpoint.
    Bulk,

    /// Interrupt endpoint.
    Interrupt,
}

/// View of an endpoint descriptor.
#[derive(Clone)]
pub struct EndpointDescriptor<'a>(&'a [u8]);

impl<'a> EndpointDescriptor<'a> {
    /// Get the endpoint's direction.
    pub fn direction(&self) -> Direction {
        match self.address() & ENDPOINT_DIR_IN {
            0 => Direction::Out,
            _ => Direction::In,
        }
    }

    /// Get the endpoint's transfer type.
    pub fn transfer_type(&self) -> EndpointType {
        match self.attributes() & 0x03 {
            0 => EndpointType::Control,
            1 => EndpointType::Isochronous,
            2 => EndpointType::Bulk,
            _ => EndpointType::Interrupt,
        }
    }

    /// Get the maximum packet size in bytes.
    pub fn max_packet_size(&self) -> usize {
        (self.max_packet_size_raw() & ((1 << 11) - 1)) as usize
    }
}

descriptor_fields! {
    impl<'a> EndpointDescriptor<'a> {
        /// Get the `bEndpointAddress` descriptor field: Endpoint address.
        #[doc(alias = "bEndpointAddress")]
        pub fn address at 2 -> u8;

        /// Get the raw value of the `bmAttributes` descriptor field.
        ///
        /// See [`transfer_type`][Self::transfer_type] for the transfer type field.
        #[doc(alias = "bmAttributes")]
        pub fn attributes at 3 -> u8;

        /// Get the raw value of the `wMaxPacketSize` descriptor field.
        #[doc(alias = "wMaxPacketSize")]
        pub fn max_packet_size_raw at 4 -> u16;

        /// Get the `bInterval` field: Polling interval in frames or microframes.
        #[doc(alias = "bInterval")]
        pub fn interval at 6 -> u8;
    }
}

impl<'a> Debug for EndpointDescriptor<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("address", &format_args!("0x{:02X}", self.address()))
            .field("direction", &self.direction())
            .field("transfer_type", &self.transfer_type())
            .field("max_packet_size", &self.max_packet_size())
            .field("interval", &self.interval())
            .finish()
    }
}

#[cfg(test)]
mod test_concatenated {
    use super::parse_concatenated_config_descriptors;

    #[test]
    fn test_empty() {
        assert_eq!(
            parse_concatenated_config_descriptors(&[]).collect::<Vec<&[u8]>>(),
            Vec::<&[u8]>::new()
        );
    }

    #[test]
    fn test_invalid_total_len() {
        assert_eq!(
            parse_concatenated_config_descriptors(&[9, 2, 0, 0, 0, 0, 0, 0, 0])
                .collect::<Vec<&[u8]>>(),
            Vec::<&[u8]>::new()
        );
    }

    #[test]
    fn test_two_configs() {
        assert_eq!(
            parse_concatenated_config_descriptors(&[
                9, 2, 13, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 9, 2, 9, 0, 0, 0, 0, 0, 0
            ])
            .collect::<Vec<&[u8]>>(),
            vec![
                [9, 2, 13, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0].as_slice(),
                [9, 2, 9, 0, 0, 0, 0, 0, 0].as_slice()
            ]
        );
    }
}

#[test]
#[rustfmt::skip]
fn test_kinds() {
    let buf = [
        0x09, 0x02, 0x19, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32,
        0x09, 0x04, 0x00, 0x00, 0x02, 0x01, 0x03, 0x00, 0x00,
        0x05, 0x24, 0x01, 0x00, 0x01,
        0x07, 0x05, 0x81, 0x02, 0x40, 0x00, 0x00,
    ];
    let kinds: Vec<_> = Descriptors::new(&buf).map(|d| d.kind()).collect();
    assert_eq!(kinds.len(), 4);

    let DescriptorKind::Configuration(c) = &kinds[0] else { panic!("{:?}", kinds[0]) };
    assert_eq!(c.configuration_value(), 1);
    assert_eq!(c.num_interfaces(), 1);
    assert_eq!(c.max_power(), 0x32);

    let DescriptorKind::Interface(i) = &kinds[1] else { panic!("{:?}", kinds[1]) };
    assert_eq!(i.interface_number(), 0);
    assert_eq!(i.num_endpoints(), 2);
    assert_eq!(i.class(), 0x01);
    assert_eq!(i.subclass(), 0x03);

    let DescriptorKind::Other(o) = &kinds[2] else { panic!("{:?}", kinds[2]) };
    assert_eq!(o.descriptor_type(), 0x24);
    assert_eq!(o.descriptor_len(), 5);

    let DescriptorKind::Endpoint(e) = &kinds[3] else { panic!("{:?}", kinds[3]) };
    assert_eq!(e.address(), 0x81);
    assert_eq!(e.direction(), Direction::In);
    assert_eq!(e.transfer_type(), EndpointType::Bulk);
    assert_eq!(e.max_packet_size(), 64);
}

#[test]
fn test_short_known_type_is_other() {
    // interface descriptor truncated to 4 bytes
    let buf = [0x04, 0x04, 0x01, 0x00];
    let d = Descriptors::new(&buf).next().unwrap();
    assert!(matches!(d.kind(), DescriptorKind::Other(_)));
}

#[test]
fn test_malformed_lengths_stop_iteration() {
    // bLength of 0 would never advance
    assert_eq!(Descriptors::new(&[0, 4, 0, 0]).count(), 0);

    // second record claims more bytes than remain
    let mut it = Descriptors::new(&[3, 0x24, 0, 9, 5, 0x81]);
    assert_eq!(it.next().unwrap().descriptor_type(), 0x24);
    assert!(it.next().is_none());
    assert!(it.as_bytes().is_empty());
}

#[test]
#[rustfmt::skip]
fn test_device_descriptor() {
    let dev = DeviceDescriptor::new(&[
        0x12, 0x01, 0x10, 0x01, 0x00, 0x00, 0x00, 0x08, 0xe8,
        0x16, 0x01, 0x00, 0x00, 0x01, 0x01, 0x02, 0x00, 0x01
    ]).unwrap();
    assert_eq!(dev.usb_version(), 0x0110);
    assert_eq!(dev.class(), 0);
    assert_eq!(dev.vendor_id(), 0x16e8);
    assert_eq!(dev.product_id(), 0x0001);
    assert_eq!(dev.device_version(), 0x0100);
    assert_eq!(dev.num_configurations(), 1);

    assert!(DeviceDescriptor::new(&[0x12, 0x02]).is_none());
}

#[test]
#[rustfmt::skip]
fn test_usbfs_descriptor_blob() {
    // device descriptor followed by the configuration, as read from /dev/bus/usb
    let blob = [
        0x12, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x40, 0x63,
        0x07, 0x01, 0x20, 0x00, 0x01, 0x01, 0x02, 0x00, 0x01,
        0x09, 0x02, 0x19, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32,
        0x09, 0x04, 0x00, 0x00, 0x01, 0x01, 0x03, 0x00, 0x00,
        0x07, 0x05, 0x81, 0x02, 0x40, 0x00, 0x00,
    ];
    let dev = DeviceDescriptor::new(&blob).unwrap();
    assert_eq!(dev.usb_version(), 0x0200);
    assert_eq!(dev.vendor_id(), 0x0763);
    assert_eq!(dev.product_id(), 0x2001);
    assert_eq!(dev.num_configurations(), 1);
    assert!(format!("{dev:?}").contains("vendor_id: 0x0763"));

    let configs: Vec<_> =
        parse_concatenated_config_descriptors(&blob[DESCRIPTOR_LEN_DEVICE as usize..]).collect();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].len(), 0x19);

    // a configuration descriptor where the device descriptor should be
    assert!(DeviceDescriptor::new(&blob[DESCRIPTOR_LEN_DEVICE as usize..]).is_none());
}
