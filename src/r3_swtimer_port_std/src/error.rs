use std::{fmt, io};

/// Error type for [`Kernel::boot`](crate::Kernel::boot).
#[derive(Debug)]
pub enum BootError {
    /// The dispatch queue couldn't be allocated because its capacity is zero.
    QueueAllocation,
    /// The timer service rejected the configuration.
    Service(r3_swtimer::BootError),
    /// A worker thread couldn't be spawned.
    Spawn(io::Error),
}

impl From<r3_swtimer::BootError> for BootError {
    fn from(e: r3_swtimer::BootError) -> Self {
        Self::Service(e)
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::QueueAllocation => f.write_str("could not allocate the dispatch queue"),
            Self::Service(e) => write!(f, "could not create the timer service: {e}"),
            Self::Spawn(e) => write!(f, "could not spawn a worker thread: {e}"),
        }
    }
}

impl std::error::Error for BootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}
