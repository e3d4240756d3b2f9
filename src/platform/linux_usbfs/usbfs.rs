//! Wrappers for the [usbfs] character device ioctls, translated from the
//! [C structures and ioctl definitions][uapi].
//!
//! Only the synchronous ioctls are used: a MIDI reader makes one blocking
//! bulk transfer at a time, so there is no URB submission or reaping.
//!
//! [usbfs]: https://www.kernel.org/doc/html/latest/driver-api/usb/usb.html#the-usb-character-device-nodes
//! [uapi]: https://github.com/torvalds/linux/blob/master/tools/include/uapi/linux/usbdevice_fs.h
use std::ffi::{c_uchar, c_uint, c_void};

use rustix::{
    fd::AsFd,
    io,
    ioctl::{self, Ioctl, IoctlOutput, Opcode},
};

pub fn set_configuration<Fd: AsFd>(fd: Fd, configuration: u8) -> io::Result<()> {
    unsafe {
        let ctl = ioctl::Setter::<{ ioctl::opcode::read::<c_uint>(b'U', 5) }, c_uint>::new(
            configuration.into(),
        );
        ioctl::ioctl(fd, ctl)
    }
}

pub fn claim_interface<Fd: AsFd>(fd: Fd, interface: u8) -> io::Result<()> {
    unsafe {
        let ctl = ioctl::Setter::<{ ioctl::opcode::read::<c_uint>(b'U', 15) }, c_uint>::new(
            interface.into(),
        );
        ioctl::ioctl(fd, ctl)
    }
}

pub fn release_interface<Fd: AsFd>(fd: Fd, interface: u8) -> io::Result<()> {
    unsafe {
        let ctl = ioctl::Setter::<{ ioctl::opcode::read::<c_uint>(b'U', 16) }, c_uint>::new(
            interface.into(),
        );
        ioctl::ioctl(fd, ctl)
    }
}

#[repr(C)]
struct DetachAndClaim {
    interface: c_uint,
    flags: c_uint,
    driver: [c_uchar; 255 + 1],
}

pub fn detach_and_claim_interface<Fd: AsFd>(fd: Fd, interface: u8) -> io::Result<()> {
    const USBDEVFS_DISCONNECT_CLAIM_EXCEPT_DRIVER: c_uint = 0x02;
    unsafe {
        let mut dc = DetachAndClaim {
            interface: interface.into(),
            flags: USBDEVFS_DISCONNECT_CLAIM_EXCEPT_DRIVER,
            driver: [0; 256],
        };

        dc.driver[0..6].copy_from_slice(b"usbfs\0");

        let ctl = ioctl::Setter::<{ opcodes::USBDEVFS_DISCONNECT_CLAIM }, DetachAndClaim>::new(dc);

        ioctl::ioctl(&fd, ctl)
    }
}

#[repr(C)]
struct UsbFsIoctl {
    interface: c_uint,
    ioctl_code: c_uint,
    data: *mut c_void,
}

/// Opcodes used in ioctl with the usb device fs.
///
/// Taken from https://github.com/torvalds/linux/blob/e9680017b2dc8686a908ea1b51941a91b6da9f1d/include/uapi/linux/usbdevice_fs.h#L187
// We repeat the USBDEVFS_ prefix to help keep the same names as what linux uses.
#[allow(non_camel_case_types)]
mod opcodes {
    use rustix::ioctl::Opcode;

    use super::*;

    pub const USBDEVFS_CONTROL: Opcode = ioctl::opcode::read_write::<CtrlTransfer>(b'U', 0);
    pub const USBDEVFS_BULK: Opcode = ioctl::opcode::read_write::<BulkTransfer>(b'U', 2);
    pub const USBDEVFS_IOCTL: Opcode = ioctl::opcode::read_write::<UsbFsIoctl>(b'U', 18);
    pub const USBDEVFS_DISCONNECT_CLAIM: Opcode = ioctl::opcode::read::<DetachAndClaim>(b'U', 27);

    /// These opcodes are nested inside a [`USBDEVFS_IOCTL`] operation.
    pub mod nested {
        use super::*;

        pub const USBDEVFS_DISCONNECT: Opcode = ioctl::opcode::none(b'U', 22);
    }
}

/// Detach the kernel driver bound to `interface`.
///
/// Fails with `ENODATA` if no driver is bound.
pub fn detach_kernel_driver<Fd: AsFd>(fd: Fd, interface: u8) -> io::Result<()> {
    let command = UsbFsIoctl {
        interface: interface.into(),
        // NOTE: Cast needed since on android this type is i32 vs u32 on linux
        ioctl_code: opcodes::nested::USBDEVFS_DISCONNECT as _,
        data: std::ptr::null_mut(),
    };
    unsafe {
        let ctl = ioctl::Setter::<{ opcodes::USBDEVFS_IOCTL }, UsbFsIoctl>::new(command);
        ioctl::ioctl(fd, ctl)
    }
}

/// An ioctl whose return value is a byte count.
pub struct Transfer<const OPCODE: Opcode, Input> {
    input: Input,
}

impl<const OPCODE: Opcode, Input> Transfer<OPCODE, Input> {
    /// # Safety
    ///
    /// Any pointers in `input` must be valid for the lengths given alongside them.
    #[inline]
    pub unsafe fn new(input: Input) -> Self {
        Self { input }
    }
}

unsafe impl<const OPCODE: Opcode, Input> Ioctl for Transfer<OPCODE, Input> {
    type Output = usize;

    const IS_MUTATING: bool = true;

    fn opcode(&self) -> ioctl::Opcode {
        OPCODE
    }

    fn as_ptr(&mut self) -> *mut c_void {
        &mut self.input as *mut Input as *mut c_void
    }

    unsafe fn output_from_ptr(r: IoctlOutput, _: *mut c_void) -> io::Result<usize> {
        Ok(r as usize)
    }
}

#[repr(C)]
#[allow(non_snake_case)]
pub struct CtrlTransfer {
    pub bRequestType: u8,
    pub bRequest: u8,
    pub wValue: u16,
    pub wIndex: u16,
    pub wLength: u16,
    pub timeout: u32, /* in milliseconds */
    pub data: *mut c_void,
}

/// # Safety
///
/// `transfer.data` must be valid for `transfer.wLength` bytes.
pub unsafe fn control<Fd: AsFd>(fd: Fd, transfer: CtrlTransfer) -> io::Result<usize> {
    unsafe {
        let ctl = Transfer::<{ opcodes::USBDEVFS_CONTROL }, CtrlTransfer>::new(transfer);
        ioctl::ioctl(fd, ctl)
    }
}

#[repr(C)]
pub struct BulkTransfer {
    pub ep: c_uint,
    pub len: c_uint,
    pub timeout: c_uint, /* in milliseconds, 0 waits forever */
    pub data: *mut c_void,
}

/// Synchronous bulk transfer. Returns the number of bytes transferred.
///
/// # Safety
///
/// `transfer.data` must be valid for writes of `transfer.len` bytes.
pub unsafe fn bulk<Fd: AsFd>(fd: Fd, transfer: BulkTransfer) -> io::Result<usize> {
    unsafe {
        let ctl = Transfer::<{ opcodes::USBDEVFS_BULK }, BulkTransfer>::new(transfer);
        ioctl::ioctl(fd, ctl)
    }
}
