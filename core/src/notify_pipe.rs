//! Self-pipe used to wake client sender threads without per-client polling
//! of every pane (§4.2). Both ends are non-blocking; `signal()` never
//! blocks and a full pipe is treated as "there is already pending work",
//! not an error.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::{pipe, read, write};

/// One process-wide notify pipe. Cheap to clone (it's just two fds shared
/// behind `Arc` at the call site); signalling and draining are lock-free.
pub struct NotifyPipe {
    read_fd: OwnedFd,
    write_fd: OwnedFd,
}

impl NotifyPipe {
    pub fn new() -> std::io::Result<Self> {
        let (read_fd, write_fd) = pipe().map_err(to_io_err)?;
        set_nonblocking(&read_fd)?;
        set_nonblocking(&write_fd)?;
        Ok(Self { read_fd, write_fd })
    }

    /// Write one byte, non-blocking. EAGAIN (pipe buffer full) is ignored:
    /// a full pipe already means a reader has pending work to discover.
    pub fn signal(&self) {
        match write(&self.write_fd, &[0u8]) {
            Ok(_) => {}
            Err(nix::errno::Errno::EAGAIN) => {}
            Err(_) => {}
        }
    }

    /// Drain all pending bytes. Called by a waker right after it observes
    /// the pipe as readable, before re-checking per-pane generations.
    pub fn drain(&self) {
        let mut buf = [0u8; 4096];
        loop {
            match read(self.read_fd.as_raw_fd(), &mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(_) => break,
            }
        }
    }

    /// Raw fd for poll/select readiness on the read end. The write end is
    /// never polled (§4.2 invariant).
    pub fn read_fd(&self) -> RawFd {
        self.read_fd.as_raw_fd()
    }
}

fn set_nonblocking(fd: &OwnedFd) -> std::io::Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(to_io_err)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(to_io_err)?;
    Ok(())
}

fn to_io_err(e: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_then_drain_leaves_pipe_empty() {
        let pipe = NotifyPipe::new().unwrap();
        pipe.signal();
        pipe.signal();
        pipe.signal();
        pipe.drain();
        // A second drain should be a cheap no-op (EAGAIN immediately).
        pipe.drain();
    }

    #[test]
    fn full_pipe_signal_does_not_panic() {
        let pipe = NotifyPipe::new().unwrap();
        for _ in 0..100_000 {
            pipe.signal();
        }
        pipe.drain();
    }
}
