//! Kernel uevent subscription over a `NETLINK_KOBJECT_UEVENT` socket.

use std::os::fd::{AsRawFd, OwnedFd};

use nix::errno::Errno;
use nix::sys::socket::{
    AddressFamily, MsgFlags, NetlinkAddr, SockFlag, SockProtocol, SockType, bind, recv,
    setsockopt, socket, sockopt,
};
use nix::sys::time::TimeVal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::DeviceError;
use crate::uevent::{SUBSYSTEM_USB, SUBSYSTEM_VIDEO, Uevent};

/// Kernel broadcast multicast group.
const KERNEL_GROUP: u32 = 1;
const RECV_BUFFER: usize = 8192;

/// Open the socket and forward video4linux and usb uevents until `cancel`
/// fires or the receiver is dropped.
pub fn subscribe(
    cancel: CancellationToken,
    capacity: usize,
) -> Result<mpsc::Receiver<Uevent>, DeviceError> {
    let fd = socket(
        AddressFamily::Netlink,
        SockType::Datagram,
        SockFlag::SOCK_CLOEXEC,
        SockProtocol::NetlinkKObjectUEvent,
    )
    .map_err(DeviceError::Subscribe)?;
    bind(fd.as_raw_fd(), &NetlinkAddr::new(0, KERNEL_GROUP)).map_err(DeviceError::Subscribe)?;
    // Bounded reads so the loop notices cancellation.
    setsockopt(&fd, sockopt::ReceiveTimeout, &TimeVal::new(1, 0))
        .map_err(DeviceError::Subscribe)?;

    let (tx, rx) = mpsc::channel(capacity);
    tokio::task::spawn_blocking(move || read_loop(fd, tx, cancel));
    Ok(rx)
}

fn read_loop(fd: OwnedFd, tx: mpsc::Sender<Uevent>, cancel: CancellationToken) {
    let mut buf = vec![0u8; RECV_BUFFER];
    while !cancel.is_cancelled() {
        let n = match recv(fd.as_raw_fd(), &mut buf, MsgFlags::empty()) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(Errno::EAGAIN | Errno::EINTR) => continue,
            Err(e) => {
                warn!(error = %e, "uevent socket read failed");
                return;
            }
        };
        let Some(event) = Uevent::parse(&buf[..n]) else {
            continue;
        };
        if event.subsystem != SUBSYSTEM_VIDEO && event.subsystem != SUBSYSTEM_USB {
            continue;
        }
        debug!(action = %event.action, subsystem = %event.subsystem, devname = %event.devname, "uevent");
        if tx.blocking_send(event).is_err() {
            return;
        }
    }
}
