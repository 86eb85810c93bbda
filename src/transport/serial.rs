//! # Serial Transport
//!
//! Drives a TIJ printer over a serial TTY (RS-232 or a USB-serial adapter).
//!
//! ## TTY Configuration
//!
//! The device is opened non-blocking and switched to raw mode so binary
//! frames pass through untouched:
//!
//! - **No input processing**: IGNBRK, BRKINT, PARMRK, ISTRIP, INLCR, IGNCR, ICRNL off
//! - **No software flow control**: IXON, IXOFF, IXANY off
//! - **No output processing**: OPOST off
//! - **Non-canonical, no echo**: ECHO, ECHONL, ICANON, ISIG, IEXTEN off
//! - **8-N-1**: CS8, no parity, one stop bit, no RTS/CTS, CLOCAL and CREAD on
//!
//! Software flow control must stay off: 0x11 (XON) and 0x13 (XOFF) are the
//! start-printing and trigger-print command ids.
//!
//! Readiness comes from the tokio reactor through [`AsyncFd`], so the port
//! is a regular `AsyncRead + AsyncWrite` stream.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::info;

use crate::error::TijError;

/// An open, raw-mode serial port.
#[derive(Debug)]
pub struct SerialPort {
    inner: AsyncFd<File>,
}

impl SerialPort {
    /// Open `path` at `baud_rate`, 8-N-1, no flow control.
    ///
    /// ## Errors
    ///
    /// - `Validation` if the baud rate is not a standard rate on this platform
    /// - `TransportUnavailable` if the device can't be opened or configured
    ///   (missing device, permission denied, not a TTY)
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TijError> {
        let speed = baud_constant(baud_rate).ok_or_else(|| {
            TijError::Validation(format!("unsupported baud rate {}", baud_rate))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| TijError::TransportUnavailable(format!("Failed to open {}: {}", path, e)))?;

        configure_tty_raw(file.as_raw_fd(), speed)?;

        let inner = AsyncFd::new(file).map_err(|e| {
            TijError::TransportUnavailable(format!("Failed to register {}: {}", path, e))
        })?;

        info!(path, baud_rate, "serial port opened");
        Ok(Self { inner })
    }
}

impl AsyncRead for SerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;

            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(unfilled)
            }) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for SerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;

            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.write(data)
            }) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // write(2) on a TTY hands bytes straight to the driver
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Map a numeric baud rate to its termios speed constant.
pub fn baud_constant(baud_rate: u32) -> Option<libc::speed_t> {
    let speed = match baud_rate {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        460800 => libc::B460800,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        921600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}

/// Put a TTY into raw 8-N-1 mode at `speed`.
fn configure_tty_raw(fd: RawFd, speed: libc::speed_t) -> Result<(), TijError> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(TijError::TransportUnavailable(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);

    termios.c_oflag &= !libc::OPOST;

    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);

    termios.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CRTSCTS);
    termios.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;

    // Reads return whatever is available; readiness comes from the reactor
    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = 0;

    let result = unsafe {
        libc::cfsetispeed(&mut termios, speed) | libc::cfsetospeed(&mut termios, speed)
    };
    if result != 0 {
        return Err(TijError::TransportUnavailable(format!(
            "cfsetspeed failed: {}",
            io::Error::last_os_error()
        )));
    }

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(TijError::TransportUnavailable(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
