//! PM core error type.

/// Errors returned by the PM core.
///
/// Every variant is recoverable: the worst outcome of any failure is that
/// the system stays in a shallower sleep state than it could have reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PmError {
    /// Argument outside its domain (raw id, mismatched wakeup parameter).
    InvalidParam,
    /// Raw module id is not below the module count.
    InvalidModule,
    /// Message queue full; the message was dropped.
    QueueFull,
    /// Fixed-capacity registry has no free slot.
    OutOfMemory,
    /// Unregister for an entry that is not registered.
    NotFound,
    /// The board HAL rejected the request.
    Hal,
}

#[cfg(feature = "std")]
impl std::error::Error for PmError {}

impl core::fmt::Display for PmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidParam => write!(f, "Invalid parameter"),
            Self::InvalidModule => write!(f, "Invalid module id"),
            Self::QueueFull => write!(f, "PM message queue full"),
            Self::OutOfMemory => write!(f, "Registry full"),
            Self::NotFound => write!(f, "Entry not registered"),
            Self::Hal => write!(f, "Board HAL error"),
        }
    }
}
