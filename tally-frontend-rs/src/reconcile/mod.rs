//! Merging mutation responses into the cache and the unsynced ledger.
//!
//! Responses are trusted only as far as their tags: anything unexpected is
//! logged and skipped at the smallest granularity possible, so one odd item
//! never undoes the rest of the response.

mod create;
mod update;

pub use create::reconcile_create_experiences;
pub use update::{reconcile_update_experiences, update_experiences_reconciler};
