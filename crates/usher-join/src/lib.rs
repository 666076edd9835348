//! Meeting-join workflow for Usher.
//!
//! One invocation of [`JoinWorkflow::run`] drives a single meeting to a
//! terminal state: claim the meeting in the shared store, resolve an API
//! credential, create a bot resource on the remote joining service, then
//! poll it on a fixed interval up to a fixed budget. Every observed state
//! is persisted so other worker processes can see what has been attempted.

mod client;
mod credentials;
mod error;
mod workflow;

pub use client::{AttendeeClient, CreatedBot};
pub use credentials::CredentialResolver;
pub use error::{CredentialError, JoinError};
pub use workflow::{JoinWorkflow, WorkflowConfig};
