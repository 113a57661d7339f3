//! Job family handlers: each `job_type` maps to exactly one handler.

pub mod place_call;
pub mod refill_from_leads;

pub use place_call::{PlaceCallHandler, PlaceCallPayload, JOB_TYPE as PLACE_CALL_JOB_TYPE};
pub use refill_from_leads::{
    RefillFromLeadsHandler, RefillFromLeadsPayload, JOB_TYPE as REFILL_FROM_LEADS_JOB_TYPE,
};
