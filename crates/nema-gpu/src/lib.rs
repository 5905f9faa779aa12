//! NEMA software GPU device model.
//!
//! The device interprets guest command lists: texture binds, clip and blend state, then draws that
//! go either to the rectangle compositor ([`compositor`]) or to the path rasterizer ([`vector`]).
//! Both share the destination binding and the device-lifetime clip ([`clip`]).
//!
//! The main entry point is [`NemaDevice`], which exposes:
//! - the register window through [`slate_memory::MmioHandler`],
//! - [`NemaDevice::submit_command_list`] for callers that want the fault as a `Result`, and
//! - the completion interrupt via a [`slate_interrupts::IrqLine`].
#![forbid(unsafe_code)]

pub mod clip;
pub mod compositor;
pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod surface;
pub mod vector;

pub use clip::ClipState;
pub use config::{AssetWindow, FaultPolicy, MemoryMap, NemaDeviceConfig};
pub use device::{NemaDevice, NemaStats};
pub use error::{FaultKind, ListFault, NemaError};
pub use pipeline::PipelineContext;
pub use surface::{PixelFormat, Surface, SurfaceAcquirer, SurfaceLayout};
