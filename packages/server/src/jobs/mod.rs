//! The durable Job Store and Worker Pool.

pub mod families;
pub mod model;
pub mod rate_limit;
pub mod store;
pub mod worker;

pub use model::{ErrorKind, Job, JobPriority, JobStatus, NewJob};
pub use rate_limit::RateLimiter;
pub use store::{JobStore, PostgresJobStore};
pub use worker::{JobHandler, Worker, WorkerConfig};
