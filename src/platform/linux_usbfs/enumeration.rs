use std::{
    ffi::OsStr,
    fmt, fs, io,
    path::PathBuf,
    str::FromStr,
};

use log::{debug, warn};

use crate::{enumeration::InterfaceInfo, DeviceInfo, Error};

const SYSFS_USB_PREFIX: &str = "/sys/bus/usb/devices/";

#[derive(Debug, Clone)]
pub struct SysfsPath(pub(crate) PathBuf);

/// A sysfs attribute that could not be read or parsed.
#[derive(Debug)]
pub enum SysfsError {
    Read(PathBuf, io::Error),
    Parse(PathBuf, String),
}

impl fmt::Display for SysfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SysfsError::Read(path, e) => write!(f, "can't read {}: {e}", path.display()),
            SysfsError::Parse(path, v) => write!(f, "bad value {v:?} in {}", path.display()),
        }
    }
}

impl SysfsPath {
    fn attr(&self, attr: &str) -> Result<(PathBuf, String), SysfsError> {
        let path = self.0.join(attr);
        match fs::read_to_string(&path) {
            Ok(v) => Ok((path, v.trim().to_owned())),
            Err(e) => Err(SysfsError::Read(path, e)),
        }
    }

    pub(crate) fn read_attr<T: FromStr>(&self, attr: &str) -> Result<T, SysfsError> {
        let (path, v) = self.attr(attr)?;
        v.parse().map_err(|_| SysfsError::Parse(path, v))
    }

    /// Read a hex attribute like `idVendor` or `bInterfaceClass`.
    fn read_hex<T: TryFrom<u16>>(&self, attr: &str) -> Result<T, SysfsError> {
        let (path, v) = self.attr(attr)?;
        u16::from_str_radix(v.strip_prefix("0x").unwrap_or(&v), 16)
            .ok()
            .and_then(|n| T::try_from(n).ok())
            .ok_or(SysfsError::Parse(path, v))
    }

    fn subdirs(&self) -> impl Iterator<Item = SysfsPath> {
        fs::read_dir(&self.0)
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| SysfsPath(e.path()))
    }
}

/// `1-6` and `1-6.4.2` are devices; `usb1` (root hub) and `1-6:1.0`
/// (interface) are not.
fn is_device_name(name: &OsStr) -> bool {
    let name = name.as_encoded_bytes();
    !name.is_empty()
        && name
            .iter()
            .all(|c| matches!(c, b'0'..=b'9' | b'-' | b'.'))
}

/// List the USB devices attached to the system.
///
/// Devices whose sysfs attributes can't be read are logged and skipped.
pub fn list_devices() -> Result<impl Iterator<Item = DeviceInfo>, Error> {
    let entries = fs::read_dir(SYSFS_USB_PREFIX)
        .map_err(|e| Error::new_io("failed to read /sys/bus/usb/devices", e).log_error())?;

    Ok(entries.filter_map(|entry| {
        let path = entry.ok()?.path();
        if !is_device_name(path.file_name()?) {
            return None;
        }

        probe_device(SysfsPath(path))
            .inspect_err(|e| warn!("ignoring device: {e}"))
            .ok()
    }))
}

fn probe_interface(path: &SysfsPath) -> Option<InterfaceInfo> {
    Some(InterfaceInfo {
        interface_number: path.read_hex("bInterfaceNumber").ok()?,
        class: path.read_hex("bInterfaceClass").ok()?,
        subclass: path.read_hex("bInterfaceSubClass").ok()?,
        protocol: path.read_hex("bInterfaceProtocol").ok()?,
        interface_string: path.read_attr("interface").ok(),
    })
}

pub fn probe_device(path: SysfsPath) -> Result<DeviceInfo, SysfsError> {
    debug!("Probing device {:?}", path.0);

    // Interface directories are named `<device>:<config>.<interface>`
    let mut interfaces: Vec<_> = path
        .subdirs()
        .filter(|i| {
            i.0.file_name()
                .map(OsStr::as_encoded_bytes)
                .is_some_and(|n| n.contains(&b':'))
        })
        .filter_map(|i| probe_interface(&i))
        .collect();
    interfaces.sort_unstable_by_key(|i| i.interface_number);

    Ok(DeviceInfo {
        busnum: path.read_attr("busnum")?,
        device_address: path.read_attr("devnum")?,
        vendor_id: path.read_hex("idVendor")?,
        product_id: path.read_hex("idProduct")?,
        device_version: path.read_hex("bcdDevice")?,
        class: path.read_hex("bDeviceClass")?,
        subclass: path.read_hex("bDeviceSubClass")?,
        protocol: path.read_hex("bDeviceProtocol")?,
        // empty while the device is unconfigured
        active_configuration: path.read_attr("bConfigurationValue").ok(),
        manufacturer_string: path.read_attr("manufacturer").ok(),
        product_string: path.read_attr("product").ok(),
        serial_number: path.read_attr("serial").ok(),
        interfaces,
        path,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn write_attrs(dir: &Path, attrs: &[(&str, &str)]) {
        fs::create_dir_all(dir).unwrap();
        for (name, value) in attrs {
            fs::write(dir.join(name), format!("{value}\n")).unwrap();
        }
    }

    #[test]
    fn test_device_names() {
        assert!(is_device_name(OsStr::new("1-6")));
        assert!(is_device_name(OsStr::new("3-1.4.2")));
        assert!(!is_device_name(OsStr::new("usb1")));
        assert!(!is_device_name(OsStr::new("1-6:1.0")));
        assert!(!is_device_name(OsStr::new("")));
    }

    #[test]
    fn test_probe_device() {
        let root = std::env::temp_dir().join(format!("usb-host-midi-sysfs-{}", std::process::id()));
        let dev = root.join("1-2");
        write_attrs(
            &dev,
            &[
                ("busnum", "1"),
                ("devnum", "5"),
                ("idVendor", "0763"),
                ("idProduct", "2001"),
                ("bcdDevice", "0100"),
                ("bDeviceClass", "00"),
                ("bDeviceSubClass", "00"),
                ("bDeviceProtocol", "00"),
                ("bConfigurationValue", ""),
                ("product", "MIDI Keyboard"),
            ],
        );
        let intf = |n: &str, class: &str, subclass: &str| {
            [
                ("bInterfaceNumber", n.to_owned()),
                ("bInterfaceClass", class.to_owned()),
                ("bInterfaceSubClass", subclass.to_owned()),
                ("bInterfaceProtocol", "00".to_owned()),
            ]
        };
        for (dir, attrs) in [
            ("1-2:1.1", intf("01", "01", "03")),
            ("1-2:1.0", intf("00", "01", "01")),
        ] {
            let attrs: Vec<_> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
            write_attrs(&dev.join(dir), &attrs);
        }
        fs::create_dir_all(dev.join("power")).unwrap();

        let info = probe_device(SysfsPath(dev.clone())).unwrap();
        assert_eq!(info.bus_number(), 1);
        assert_eq!(info.device_address(), 5);
        assert_eq!(info.vendor_id(), 0x0763);
        assert_eq!(info.product_id(), 0x2001);
        assert_eq!(info.active_configuration(), None);
        assert_eq!(info.product_string(), Some("MIDI Keyboard"));
        assert_eq!(info.manufacturer_string(), None);
        let numbers: Vec<u8> = info.interfaces().map(|i| i.interface_number()).collect();
        assert_eq!(numbers, [0, 1]);
        assert!(info.has_midi_streaming_interface());

        // a u8 attribute that doesn't fit
        fs::write(dev.join("bDeviceClass"), "1ff\n").unwrap();
        let err = probe_device(SysfsPath(dev.clone())).unwrap_err();
        assert!(matches!(err, SysfsError::Parse(_, ref v) if v == "1ff"));

        fs::remove_dir_all(&root).unwrap();
    }
}
