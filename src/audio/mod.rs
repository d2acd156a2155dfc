//! Audio device abstraction
//!
//! The voice engine never touches sound hardware directly. It schedules
//! oscillator lifetimes and gain automation against an [`AudioDevice`],
//! which owns the audio clock and applies those changes on its own time.

mod device;
mod render;
mod timeline;

pub use device::{AudioDevice, DeviceState, NodeId};
pub use render::{RenderDevice, SharedDevice};
pub use timeline::{AutomationEvent, ParamTimeline, RampKind};
