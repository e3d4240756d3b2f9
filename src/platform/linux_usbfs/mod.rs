mod usbfs;

mod enumeration;
pub use enumeration::{list_devices, SysfsPath};

mod device;
pub use device::LinuxDevice;

use rustix::io::Errno;

use crate::{Error, ErrorKind};

pub fn format_os_error_code(f: &mut std::fmt::Formatter<'_>, code: u32) -> std::fmt::Result {
    write!(
        f,
        "errno {}: {}",
        code,
        Errno::from_raw_os_error(code as i32)
    )
}

fn errno_to_error_kind(errno: Errno) -> ErrorKind {
    match errno {
        Errno::NODEV | Errno::SHUTDOWN => ErrorKind::Disconnected,
        Errno::BUSY => ErrorKind::Busy,
        Errno::ACCESS | Errno::PERM => ErrorKind::PermissionDenied,
        Errno::NOENT => ErrorKind::NotFound,
        Errno::NOTTY | Errno::NOSYS => ErrorKind::Unsupported,
        _ => ErrorKind::Other,
    }
}

impl Error {
    pub(crate) fn new_errno(message: &'static str, errno: Errno) -> Self {
        Error::new_os(
            errno_to_error_kind(errno),
            message,
            errno.raw_os_error() as u32,
        )
    }

    pub(crate) fn new_io(message: &'static str, err: std::io::Error) -> Self {
        match Errno::from_io_error(&err) {
            Some(errno) => Error::new_errno(message, errno),
            None => Error::new(ErrorKind::Other, message),
        }
    }
}

#[test]
fn test_errno_kinds() {
    let e = Error::new_errno("failed to claim interface", Errno::BUSY);
    assert_eq!(e.kind(), ErrorKind::Busy);
    assert_eq!(e.os_error(), Some(Errno::BUSY.raw_os_error() as u32));

    assert_eq!(
        Error::new_errno("bulk transfer failed", Errno::NODEV).kind(),
        ErrorKind::Disconnected
    );
    assert_eq!(
        Error::new_io(
            "failed to open device",
            std::io::Error::from_raw_os_error(Errno::ACCESS.raw_os_error())
        )
        .kind(),
        ErrorKind::PermissionDenied
    );
}
