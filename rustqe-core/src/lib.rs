//! rustqe-core: Core types for time-of-flight kinematics.
//!
//! This crate provides the foundational types shared by the simulation,
//! unwrapping and kinematics crates: 3-vectors, context tags for runs,
//! monitors and detector banks, event batches, and neutron unit conversions.
//!

pub mod context;
pub mod error;
pub mod event;
pub mod geometry;
pub mod units;

pub use context::{Axis, AxisValue, BankId, Context, MonitorId, RunKind};
pub use error::{Error, Result};
pub use event::{ConvertedBatch, ConvertedEvent, EventBatch, MonitorBatch};
pub use geometry::{Vec3, VerticalRotation};
