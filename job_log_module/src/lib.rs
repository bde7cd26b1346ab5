pub mod adapters;
pub mod attachments;
pub mod chat;
pub mod collaborators;
pub mod dispatcher;
pub mod google_auth;
pub mod job_number;
pub mod service;
pub mod thread_registry;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use job_number::{extract_job_number, JobNumber};
pub use thread_registry::{RegisterOutcome, ThreadRegistry, TrackedThread};
