//! Guest physical memory for the Slate board.
//!
//! [`phys`] holds the storage backends; [`view`] holds the scoped accessors device models use to
//! read and write guest memory without keeping Rust references into it. [`mmio`] is the register
//! window interface devices expose to the machine.
#![forbid(unsafe_code)]

pub mod mmio;
pub mod phys;
pub mod view;

pub use mmio::MmioHandler;
pub use phys::{DenseMemory, GuestMemory, GuestMemoryError, GuestMemoryResult, SparseMemory};
pub use view::{shared, MemoryView, SharedGuestMemory, WriteMapping};
