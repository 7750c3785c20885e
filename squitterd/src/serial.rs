//! Serial attachment for USB receivers
//!
//! The Mode-S Beast and the GNS 5892/5894T show up as USB serial devices.
//! The port runs raw: 8 data bits, no parity, one stop bit, hardware flow
//! control, no modem controls, and non-blocking zero-VMIN/VTIME reads so
//! the event loop never stalls on the device.

use std::{
    fs::File,
    io::Read,
    os::unix::fs::OpenOptionsExt,
    path::Path,
    pin::Pin,
    task::{
        Context,
        Poll,
        ready,
    },
};

use nix::sys::termios::{
    self,
    BaudRate,
    ControlFlags,
    FlushArg,
    InputFlags,
    LocalFlags,
    OutputFlags,
    SetArg,
    SpecialCharacterIndices,
};
use tokio::io::{
    AsyncRead,
    ReadBuf,
    unix::AsyncFd,
};

#[derive(Debug)]
pub struct SerialPort {
    fd: AsyncFd<File>,
}

impl SerialPort {
    pub fn open(path: &Path, baud: BaudRate) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)?;

        let mut term = termios::tcgetattr(&file)?;
        term.input_flags = InputFlags::IGNBRK;
        term.output_flags = OutputFlags::empty();
        term.local_flags = LocalFlags::empty();
        term.control_flags = ControlFlags::CREAD
            | ControlFlags::CS8
            | ControlFlags::CLOCAL
            | ControlFlags::CRTSCTS;
        term.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        term.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::cfsetspeed(&mut term, baud)?;

        termios::tcsetattr(&file, SetArg::TCSAFLUSH, &term)?;
        termios::tcflush(&file, FlushArg::TCIFLUSH)?;

        Ok(Self {
            fd: AsyncFd::new(file)?,
        })
    }
}

impl AsyncRead for SerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        loop {
            let mut guard = ready!(this.fd.poll_read_ready(cx))?;

            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(buf.initialize_unfilled())
            }) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(error)) => return Poll::Ready(Err(error)),
                Err(_would_block) => {}
            }
        }
    }
}
