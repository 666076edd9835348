//! HTTP front door for the Usher scheduler.
//!
//! Exposes the scheduling API consumed by operators and the calendar
//! sweep: register a join job, enumerate pending jobs, and bulk-cancel.
//! The join workflow itself runs asynchronously after the scheduling call
//! has returned; no workflow failure is surfaced through these routes.

mod routes;

pub use routes::{AppState, create_router};
