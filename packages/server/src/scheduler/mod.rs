//! The Scheduler Control Plane: cron-driven recurring jobs (refill-from-
//! leads, retention sweep) and pause/resume of the whole control plane.

pub mod control_plane;
pub mod cron;
pub mod service;

pub use control_plane::{ControlPlane, ControlPlaneState};
pub use cron::start_scheduler;
pub use service::{
    RunRefillNowInput, ScheduleCallInput, ScheduleDelayedOptions, ScheduleInfo, ScheduleKind,
    ScheduleRefillInput, SchedulerControlPlane, SchedulerError,
};
