//! Arrival feed: turns an input stream into commands to admit.
//!
//! In batch mode the whole stream is read on the first poll, blocking until
//! end of input. In interactive mode each poll takes whatever bytes are
//! available right now and hands out the complete lines among them; a
//! trailing partial line waits for the next poll.

use nix::{
    fcntl::{FcntlArg, OFlag, fcntl},
    unistd,
};
use std::{
    io::{self, ErrorKind, Read},
    os::fd::{AsRawFd, RawFd},
};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    Batch,
    Interactive,
}

#[derive(Debug)]
pub struct ArrivalFeed<R> {
    reader: R,
    mode: FeedMode,
    pending: Vec<u8>,
    exhausted: bool,
}

impl<R: Read> ArrivalFeed<R> {
    pub fn new(reader: R, mode: FeedMode) -> Self {
        Self {
            reader,
            mode,
            pending: Vec::new(),
            exhausted: false,
        }
    }

    pub fn batch(reader: R) -> Self {
        Self::new(reader, FeedMode::Batch)
    }

    pub fn interactive(reader: R) -> Self {
        Self::new(reader, FeedMode::Interactive)
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    /// End of input reached and every line handed out.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending.is_empty()
    }

    pub fn poll(&mut self) -> io::Result<Vec<String>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                // Nothing more right now; the next pass tries again.
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => break,
                Err(e) => return Err(e),
            }
        }

        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            lines.extend(self.normalize(&raw));
        }
        if self.exhausted && !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            lines.extend(self.normalize(&raw));
        }
        Ok(lines)
    }

    fn normalize(&self, raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        let mut line = text.trim_end_matches(['\n', '\r']);
        if self.mode == FeedMode::Batch {
            line = line.trim_start_matches(' ');
        }
        (!line.is_empty()).then(|| line.to_owned())
    }
}

/// Standard input switched to non-blocking reads. The original file status
/// flags are restored on drop so the terminal is left as it was found.
#[derive(Debug)]
pub struct NonBlockingStdin {
    fd: RawFd,
    original: OFlag,
}

impl NonBlockingStdin {
    pub fn new() -> io::Result<Self> {
        let fd = io::stdin().as_raw_fd();
        let original = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
        fcntl(fd, FcntlArg::F_SETFL(original | OFlag::O_NONBLOCK))?;
        Ok(Self { fd, original })
    }
}

impl Read for NonBlockingStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        unistd::read(self.fd, buf).map_err(io::Error::from)
    }
}

impl Drop for NonBlockingStdin {
    fn drop(&mut self) {
        let _ = fcntl(self.fd, FcntlArg::F_SETFL(self.original));
    }
}
