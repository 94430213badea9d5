//! Whitespace-only command tokenizing. No quoting, no expansion.

use std::{
    error::Error,
    ffi::{CStr, CString, NulError, c_char},
    fmt, ptr,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    InteriorNul(NulError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::InteriorNul(err) => write!(f, "command contains a NUL byte: {err}"),
        }
    }
}

impl Error for CommandError {}

/// Program plus argument vector, ready for `execvp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<CString>,
}

impl CommandLine {
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let argv = text
            .split_whitespace()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CommandError::InteriorNul)?;
        if argv.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(Self { argv })
    }

    pub fn program(&self) -> &CStr {
        &self.argv[0]
    }

    // argv[0] is the program itself
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// NULL-terminated pointer array for `execvp(3)`. The pointers borrow
    /// from `self`, which must outlive every use of them.
    pub fn exec_argv(&self) -> Vec<*const c_char> {
        self.argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect()
    }
}
