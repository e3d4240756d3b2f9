use std::{
    ffi::{c_uint, c_void},
    fs::File,
    io::Read,
    path::PathBuf,
};

use log::{debug, warn};
use rustix::{
    fd::OwnedFd,
    fs::{Mode, OFlags},
    io::Errno,
};

use super::usbfs;
use crate::{
    descriptors::{parse_concatenated_config_descriptors, DeviceDescriptor, DESCRIPTOR_LEN_DEVICE},
    transport::{ReadOutcome, Transport},
    DeviceInfo, Error, ErrorKind,
};

/// Timeout for the standard control requests made while setting up the device.
const CONTROL_TIMEOUT_MS: u32 = 1000;

const REQUEST_GET_CONFIGURATION: u8 = 0x08;

/// An opened usbfs device node, `/dev/bus/usb/BBB/DDD`.
///
/// Interfaces claimed through [`Transport::claim_interface`] are released
/// when this is dropped.
pub struct LinuxDevice {
    fd: OwnedFd,
    busnum: u8,
    devnum: u8,

    /// Read from the fd, consists of device descriptor followed by configuration descriptors
    descriptors: Vec<u8>,

    /// From sysfs at open time, if the device was opened from a [`DeviceInfo`]
    active_configuration: Option<u8>,
    manufacturer_string: Option<String>,
    product_string: Option<String>,

    claimed: Vec<u8>,
}

impl LinuxDevice {
    pub(crate) fn from_device_info(d: &DeviceInfo) -> Result<LinuxDevice, Error> {
        let mut dev = Self::open(d.bus_number(), d.device_address())?;
        dev.active_configuration = d.active_configuration();
        dev.manufacturer_string = d.manufacturer_string().map(str::to_owned);
        dev.product_string = d.product_string().map(str::to_owned);
        Ok(dev)
    }

    /// Open the device with the given bus number and address.
    pub fn open(busnum: u8, devnum: u8) -> Result<LinuxDevice, Error> {
        let path = PathBuf::from(format!("/dev/bus/usb/{busnum:03}/{devnum:03}"));
        debug!("Opening usbfs device {}", path.display());
        let fd = rustix::fs::open(&path, OFlags::RDWR | OFlags::CLOEXEC, Mode::empty())
            .map_err(|e| Error::new_errno("failed to open device", e).log_error())?;

        let mut file = File::from(fd);
        let mut descriptors = Vec::new();
        file.read_to_end(&mut descriptors)
            .map_err(|e| Error::new_io("failed to read descriptors", e).log_error())?;

        match DeviceDescriptor::new(&descriptors) {
            Some(desc) => debug!(
                "Opened device bus={busnum} addr={devnum} ({:04x}:{:04x}), {} configuration(s)",
                desc.vendor_id(),
                desc.product_id(),
                desc.num_configurations()
            ),
            None => warn!("Opened device bus={busnum} addr={devnum} without a valid device descriptor"),
        }

        Ok(LinuxDevice {
            fd: OwnedFd::from(file),
            busnum,
            devnum,
            descriptors,
            active_configuration: None,
            manufacturer_string: None,
            product_string: None,
            claimed: Vec::new(),
        })
    }

    /// Number of the bus the device is connected to.
    pub fn bus_number(&self) -> u8 {
        self.busnum
    }

    /// Address of the device on its bus.
    pub fn device_address(&self) -> u8 {
        self.devnum
    }

    /// The device descriptor, as cached by the kernel.
    pub fn device_descriptor(&self) -> Option<DeviceDescriptor> {
        DeviceDescriptor::new(&self.descriptors)
    }

    /// The device's configuration descriptors, each including its trailing
    /// interface and endpoint descriptors.
    pub fn configuration_descriptors(&self) -> impl Iterator<Item = &[u8]> {
        let start = (DESCRIPTOR_LEN_DEVICE as usize).min(self.descriptors.len());
        parse_concatenated_config_descriptors(&self.descriptors[start..])
    }

    /// `bConfigurationValue` of the active configuration, 0 if unconfigured.
    ///
    /// Uses the value read from sysfs when the device was opened from a
    /// [`DeviceInfo`], otherwise asks the device with `GET_CONFIGURATION`.
    pub fn active_configuration(&self) -> Result<u8, Error> {
        if let Some(value) = self.active_configuration {
            return Ok(value);
        }

        let mut value = 0u8;
        let transfer = usbfs::CtrlTransfer {
            bRequestType: 0x80, // device-to-host, standard, device
            bRequest: REQUEST_GET_CONFIGURATION,
            wValue: 0,
            wIndex: 0,
            wLength: 1,
            timeout: CONTROL_TIMEOUT_MS,
            data: &mut value as *mut u8 as *mut c_void,
        };

        // SAFETY: `data` points to one writable byte, matching `wLength`.
        match unsafe { usbfs::control(&self.fd, transfer) } {
            Ok(1) => Ok(value),
            Ok(_) => Err(Error::new(
                ErrorKind::Other,
                "short response to GET_CONFIGURATION",
            )),
            Err(e) => Err(Error::new_errno("GET_CONFIGURATION failed", e)),
        }
    }
}

impl Transport for LinuxDevice {
    fn configuration_descriptor(&mut self, index: u8) -> Result<Vec<u8>, Error> {
        self.configuration_descriptors()
            .nth(index.into())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound, "configuration descriptor not found").log_error()
            })
    }

    fn activate_configuration(&mut self, configuration_value: u8) -> Result<(), Error> {
        // Setting the configuration fails with EBUSY while kernel drivers are
        // bound to other interfaces, even if the value is unchanged.
        if self.active_configuration().ok() == Some(configuration_value) {
            debug!("Configuration {configuration_value} already active");
            return Ok(());
        }

        usbfs::set_configuration(&self.fd, configuration_value).map_err(|e| {
            Error::new_errno("failed to set configuration", e).log_error()
        })?;
        debug!("Set configuration {configuration_value}");
        self.active_configuration = Some(configuration_value);
        Ok(())
    }

    fn claim_interface(&mut self, interface_number: u8) -> Result<(), Error> {
        match usbfs::detach_and_claim_interface(&self.fd, interface_number) {
            Ok(()) => {}
            Err(Errno::NOTTY | Errno::INVAL) => {
                // USBDEVFS_DISCONNECT_CLAIM is missing on older kernels
                debug!("Detach-and-claim unsupported, detaching interface {interface_number} separately");
                match usbfs::detach_kernel_driver(&self.fd, interface_number) {
                    Ok(()) | Err(Errno::NODATA) => {}
                    Err(e) => {
                        return Err(
                            Error::new_errno("failed to detach kernel driver", e).log_error()
                        )
                    }
                }
                usbfs::claim_interface(&self.fd, interface_number).map_err(|e| {
                    Error::new_errno("failed to claim interface", e).log_error()
                })?;
            }
            Err(e) => {
                return Err(Error::new_errno("failed to claim interface", e).log_error());
            }
        }

        debug!(
            "Claimed interface {interface_number} on device bus={} addr={}",
            self.busnum, self.devnum
        );
        self.claimed.push(interface_number);
        Ok(())
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<ReadOutcome, Error> {
        let transfer = usbfs::BulkTransfer {
            ep: endpoint.into(),
            len: c_uint::try_from(buf.len()).unwrap_or(c_uint::MAX),
            timeout: timeout_ms,
            data: buf.as_mut_ptr() as *mut c_void,
        };

        // SAFETY: `data` is valid for `len` bytes for the duration of the ioctl.
        match unsafe { usbfs::bulk(&self.fd, transfer) } {
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(Errno::TIMEDOUT) => Ok(ReadOutcome::TimedOut),
            Err(e) => Err(Error::new_errno("bulk transfer failed", e).log_debug()),
        }
    }

    fn manufacturer_string(&self) -> Option<&str> {
        self.manufacturer_string.as_deref()
    }

    fn product_string(&self) -> Option<&str> {
        self.product_string.as_deref()
    }
}

impl Drop for LinuxDevice {
    fn drop(&mut self) {
        for interface in self.claimed.drain(..) {
            let res = usbfs::release_interface(&self.fd, interface);
            debug!(
                "Released interface {interface} on device bus={} addr={}: {res:?}",
                self.busnum, self.devnum
            );
        }
    }
}

impl std::fmt::Debug for LinuxDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxDevice")
            .field("busnum", &self.busnum)
            .field("devnum", &self.devnum)
            .field("device_descriptor", &self.device_descriptor())
            .field("claimed", &self.claimed)
            .finish()
    }
}
