use std::fmt;

/// Error taxonomy of the simulator.
///
/// The first three variants invalidate a whole run and abort it; the
/// remaining ones are local to a single process or a single access and the
/// driver recovers by skipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A configuration document is missing fields or carries values that
    /// cannot be interpreted.
    MalformedDescriptor { details: String },

    /// The active processes do not fit into effective RAM plus swap.
    CapacityExceeded {
        required_bytes: u64,
        available_bytes: u64,
    },

    /// The page tables of all active processes together would exceed the
    /// RAM share reserved for table frames.
    TableFootprintExceeded {
        required_bytes: u64,
        limit_bytes: u64,
    },

    /// A process's last virtual page lies beyond the configured virtual
    /// address width. The process is skipped, the run continues.
    AddressWidthExceeded {
        process_id: String,
        last_byte: u128,
        va_limit: u128,
    },

    /// The selected placement policy could not place the request.
    AllocationFailure {
        process_id: String,
        details: String,
    },

    /// Both the data pool and the swap pool were empty while handling a
    /// page fault.
    FrameExhaustion {
        process_id: String,
        page_number: u64,
    },

    /// The watchdog deadline expired before the run finished.
    Timeout,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::MalformedDescriptor { details } => {
                write!(f, "malformed descriptor: {}", details)
            }
            SimError::CapacityExceeded {
                required_bytes,
                available_bytes,
            } => write!(
                f,
                "process sizes ({} bytes) exceed effective RAM plus swap ({} bytes)",
                required_bytes, available_bytes
            ),
            SimError::TableFootprintExceeded {
                required_bytes,
                limit_bytes,
            } => write!(
                f,
                "aggregate page table size ({} bytes) exceeds the table frame reserve ({} bytes)",
                required_bytes, limit_bytes
            ),
            SimError::AddressWidthExceeded {
                process_id,
                last_byte,
                va_limit,
            } => write!(
                f,
                "process {}: last page ends at {:#x}, beyond the {:#x} address limit",
                process_id, last_byte, va_limit
            ),
            SimError::AllocationFailure {
                process_id,
                details,
            } => write!(f, "process {}: allocation failed: {}", process_id, details),
            SimError::FrameExhaustion {
                process_id,
                page_number,
            } => write!(
                f,
                "process {}: no frame left to resolve the fault on page {}",
                process_id, page_number
            ),
            SimError::Timeout => write!(f, "simulation timed out"),
        }
    }
}

impl std::error::Error for SimError {}
