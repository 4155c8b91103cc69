//! Time-bounded admission of new chat members.
//!
//! New members are restricted until they answer a one-tap challenge. A deadline
//! check evicts anyone who has not answered in time.

mod challenge;
mod machine;
pub mod persistence;
mod registry;
pub mod scheduler;

pub use challenge::ChallengeRef;
pub use machine::{
    AdmissionConfig, AdmissionStateMachine, ExpireOutcome, VerifyOutcome, MAX_GRACE, MAX_TIMEOUT,
};
pub use persistence::{open_db, SledAdmissionRegistry};
pub use registry::{AdmissionRegistry, ExpiryCheck, InMemoryAdmissionRegistry, PendingAdmission};
pub use scheduler::{DeadlineHandler, DeadlineScheduler, SchedulerStats};
