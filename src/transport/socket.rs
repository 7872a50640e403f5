//! Unix datagram socket wrapper for the daemon link.
//!
//! The only raw libc calls in the crate live here.

use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

/// Binding for a local datagram socket.
#[derive(Debug)]
pub struct SocketBinding {
    socket: UnixDatagram,
}

impl SocketBinding {
    /// Bind to the provided filesystem path.
    pub fn bind(path: &Path) -> io::Result<Self> {
        let socket = UnixDatagram::bind(path)?;
        socket.set_nonblocking(false)?;
        Ok(Self { socket })
    }

    /// Ask the kernel for a receive buffer of `size` bytes.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        let value = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);
        // SAFETY: the fd stays open for the borrow of `self`. The pointer and
        // length describe `value`, a live `c_int` on this stack frame, and
        // SO_RCVBUF only reads it.
        let ret = unsafe {
            libc::setsockopt(
                self.socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                std::ptr::from_ref(&value).cast::<libc::c_void>(),
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Adjust the non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.socket.set_nonblocking(nonblocking)
    }

    /// Wait until a datagram can be read.
    ///
    /// `timeout_ms` of `-1` waits forever. An interrupted wait reports
    /// "not ready".
    pub fn poll_readable(&self, timeout_ms: libc::c_int) -> io::Result<bool> {
        let mut fds = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: `fds` is one initialised pollfd on this stack frame and
        // nfds is 1, so the kernel writes only its `revents`. Its fd stays
        // open for the borrow of `self`.
        let ret = unsafe { libc::poll(&raw mut fds, 1, timeout_ms) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(ret > 0 && fds.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
    }

    /// Send bytes to the socket bound at `path`.
    pub fn send_to(&self, buf: &[u8], path: &Path) -> io::Result<usize> {
        self.socket.send_to(buf, path)
    }

    /// Receive one datagram into `buf`, with the sender's path when it has one.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<PathBuf>)> {
        let (len, addr) = self.socket.recv_from(buf)?;
        Ok((len, addr.as_pathname().map(Path::to_path_buf)))
    }

    /// Filesystem path this socket is bound to, if it has one.
    pub fn local_path(&self) -> io::Result<Option<PathBuf>> {
        let addr = self.socket.local_addr()?;
        Ok(addr.as_pathname().map(Path::to_path_buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_reports_pending_datagram() {
        let dir = tempfile::tempdir().unwrap();
        let a = SocketBinding::bind(&dir.path().join("a.socket")).unwrap();
        let b_path = dir.path().join("b.socket");
        let b = SocketBinding::bind(&b_path).unwrap();
        b.set_recv_buffer_size(128 * 1024).unwrap();

        assert!(!b.poll_readable(0).unwrap());
        a.send_to(b"ping", &b_path).unwrap();
        assert!(b.poll_readable(1000).unwrap());

        let mut buf = [0u8; 16];
        let (len, sender) = b.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(sender, Some(dir.path().join("a.socket")));
        assert_eq!(b.local_path().unwrap(), Some(b_path));
    }

    #[test]
    fn poll_times_out_on_quiet_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = SocketBinding::bind(&dir.path().join("quiet.socket")).unwrap();
        socket.set_recv_buffer_size(usize::from(u16::MAX)).unwrap();

        let started = std::time::Instant::now();
        assert!(!socket.poll_readable(50).unwrap());
        assert!(started.elapsed() >= std::time::Duration::from_millis(40));
    }
}
