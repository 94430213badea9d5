use std::{error::Error, fmt, io};

use super::state::JobId;
use crate::platform::PlatformError;

/// A level queue had no free slot left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFull {
    pub job: JobId,
    pub capacity: usize,
}

/// The job table refused another admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFull {
    pub command: String,
    pub capacity: usize,
}

impl fmt::Display for TableFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job table full ({} jobs), dropping {:?}",
            self.capacity, self.command
        )
    }
}

impl Error for TableFull {}

#[derive(Debug)]
pub enum SchedError {
    QueueFull(QueueFull),
    NotSpawned(JobId),
    Platform(PlatformError),
    Io(io::Error),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull(QueueFull { job, capacity }) => {
                write!(f, "level queue full ({capacity} slots) enqueueing job {job}")
            }
            Self::NotSpawned(job) => write!(f, "job {job} has no process"),
            Self::Platform(err) => write!(f, "process control failed: {err}"),
            Self::Io(err) => write!(f, "report i/o failed: {err}"),
        }
    }
}

impl Error for SchedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Platform(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QueueFull> for SchedError {
    fn from(err: QueueFull) -> Self {
        Self::QueueFull(err)
    }
}

impl From<PlatformError> for SchedError {
    fn from(err: PlatformError) -> Self {
        Self::Platform(err)
    }
}

impl From<io::Error> for SchedError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
