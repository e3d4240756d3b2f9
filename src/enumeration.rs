use crate::{
    discovery::{AUDIO_CLASS, MIDI_STREAMING_SUBCLASS},
    platform::SysfsPath,
    Error, LinuxDevice,
};

/// Information about a device that can be obtained without opening it.
///
/// Found in the results of [`crate::list_devices`].
#[derive(Clone)]
pub struct DeviceInfo {
    pub(crate) path: SysfsPath,
    pub(crate) busnum: u8,
    pub(crate) device_address: u8,

    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
    pub(crate) device_version: u16,

    pub(crate) class: u8,
    pub(crate) subclass: u8,
    pub(crate) protocol: u8,

    pub(crate) active_configuration: Option<u8>,

    pub(crate) manufacturer_string: Option<String>,
    pub(crate) product_string: Option<String>,
    pub(crate) serial_number: Option<String>,

    pub(crate) interfaces: Vec<InterfaceInfo>,
}

impl DeviceInfo {
    /// Path of the device's sysfs directory.
    pub fn sysfs_path(&self) -> &std::path::Path {
        &self.path.0
    }

    /// Number of the bus the device is connected to.
    pub fn bus_number(&self) -> u8 {
        self.busnum
    }

    /// Number identifying the device within the bus.
    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    /// The 16-bit number identifying the device's vendor, from the `idVendor` device descriptor field.
    #[doc(alias = "idVendor")]
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    /// The 16-bit number identifying the product, from the `idProduct` device descriptor field.
    #[doc(alias = "idProduct")]
    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    /// The device version, normally encoded as BCD, from the `bcdDevice` device descriptor field.
    #[doc(alias = "bcdDevice")]
    pub fn device_version(&self) -> u16 {
        self.device_version
    }

    /// Code identifying the standard device class, from the `bDeviceClass` device descriptor field.
    ///
    /// MIDI devices normally report 0 here and declare the class per interface.
    #[doc(alias = "bDeviceClass")]
    pub fn class(&self) -> u8 {
        self.class
    }

    /// Standard subclass, from the `bDeviceSubClass` device descriptor field.
    #[doc(alias = "bDeviceSubClass")]
    pub fn subclass(&self) -> u8 {
        self.subclass
    }

    /// Standard protocol, from the `bDeviceProtocol` device descriptor field.
    #[doc(alias = "bDeviceProtocol")]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// `bConfigurationValue` of the active configuration, or `None` if the
    /// device is unconfigured.
    pub fn active_configuration(&self) -> Option<u8> {
        self.active_configuration
    }

    /// Manufacturer string, if available without device IO.
    #[doc(alias = "iManufacturer")]
    pub fn manufacturer_string(&self) -> Option<&str> {
        self.manufacturer_string.as_deref()
    }

    /// Product string, if available without device IO.
    #[doc(alias = "iProduct")]
    pub fn product_string(&self) -> Option<&str> {
        self.product_string.as_deref()
    }

    /// Serial number string, if available without device IO.
    #[doc(alias = "iSerial")]
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Iterator over the device's interfaces in the active configuration.
    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceInfo> {
        self.interfaces.iter()
    }

    /// Whether the active configuration has an Audio / MIDI Streaming interface.
    ///
    /// This is a cheap pre-filter; [`MidiDevice::new`][crate::MidiDevice::new]
    /// still scans the full configuration descriptor.
    pub fn has_midi_streaming_interface(&self) -> bool {
        self.interfaces.iter().any(InterfaceInfo::is_midi_streaming)
    }

    /// Open the device
    pub fn open(&self) -> Result<LinuxDevice, Error> {
        LinuxDevice::from_device_info(self)
    }
}

// Not derived so that we can format some fields in hex
impl std::fmt::Debug for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceInfo")
            .field("busnum", &self.busnum)
            .field("device_address", &self.device_address)
            .field("vendor_id", &format_args!("0x{:04X}", self.vendor_id))
            .field("product_id", &format_args!("0x{:04X}", self.product_id))
            .field(
                "device_version",
                &format_args!("0x{:04X}", self.device_version),
            )
            .field("class", &format_args!("0x{:02X}", self.class))
            .field("subclass", &format_args!("0x{:02X}", self.subclass))
            .field("protocol", &format_args!("0x{:02X}", self.protocol))
            .field("active_configuration", &self.active_configuration)
            .field("manufacturer_string", &self.manufacturer_string)
            .field("product_string", &self.product_string)
            .field("serial_number", &self.serial_number)
            .field("sysfs_path", &self.path)
            .field("interfaces", &self.interfaces)
            .finish()
    }
}

/// Summary information about a device's interface, available before opening a device.
#[derive(Clone)]
pub struct InterfaceInfo {
    pub(crate) interface_number: u8,
    pub(crate) class: u8,
    pub(crate) subclass: u8,
    pub(crate) protocol: u8,
    pub(crate) interface_string: Option<String>,
}

impl InterfaceInfo {
    /// Identifier for the interface from the `bInterfaceNumber` descriptor field.
    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    /// Code identifying the standard interface class, from the `bInterfaceClass` interface descriptor field.
    pub fn class(&self) -> u8 {
        self.class
    }

    /// Standard subclass, from the `bInterfaceSubClass` interface descriptor field.
    pub fn subclass(&self) -> u8 {
        self.subclass
    }

    /// Standard protocol, from the `bInterfaceProtocol` interface descriptor field.
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Interface string descriptor value as cached by the OS.
    pub fn interface_string(&self) -> Option<&str> {
        self.interface_string.as_deref()
    }

    /// Audio class, MIDI Streaming subclass.
    pub fn is_midi_streaming(&self) -> bool {
        self.class == AUDIO_CLASS && self.subclass == MIDI_STREAMING_SUBCLASS
    }
}

// Not derived so that we can format some fields in hex
impl std::fmt::Debug for InterfaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceInfo")
            .field("interface_number", &self.interface_number)
            .field("class", &format_args!("0x{:02X}", self.class))
            .field("subclass", &format_args!("0x{:02X}", self.subclass))
            .field("protocol", &format_args!("0x{:02X}", self.protocol))
            .field("interface_string", &self.interface_string)
            .finish()
    }
}

#[test]
fn test_midi_streaming_prefilter() {
    let intf = |number, class, subclass| InterfaceInfo {
        interface_number: number,
        class,
        subclass,
        protocol: 0,
        interface_string: None,
    };

    let mut dev = DeviceInfo {
        path: SysfsPath("/sys/bus/usb/devices/1-2".into()),
        busnum: 1,
        device_address: 5,
        vendor_id: 0x0763,
        product_id: 0x2001,
        device_version: 0x0100,
        class: 0,
        subclass: 0,
        protocol: 0,
        active_configuration: Some(1),
        manufacturer_string: None,
        product_string: Some("MIDI Keyboard".into()),
        serial_number: None,
        interfaces: vec![intf(0, 0x01, 0x01), intf(1, 0x01, 0x03)],
    };
    assert!(dev.has_midi_streaming_interface());
    assert_eq!(dev.product_string(), Some("MIDI Keyboard"));

    dev.interfaces = vec![intf(0, 0x01, 0x01), intf(1, 0x01, 0x02)];
    assert!(!dev.has_midi_streaming_interface());
}
