//! Bill inbox pipeline.
//!
//! Every run flows through:
//! 1. `Mailbox::fetch_unseen()`: collaborator I/O
//! 2. PDF text extraction, one document per attachment
//! 3. `BillExtractor::invoke()`: one model call per batch
//! 4. `parse_bills()`: strict, order-preserving parse
//! 5. `NotificationSink::send()`: one notification per bill
//!
//! Runs are triggered on demand and serialized through `RunQueue`.

pub mod processor;
pub mod types;
pub mod worker;

pub use processor::{InboxProcessor, RunState};
pub use types::{Attachment, DeliveryOutcome, Email, Mailbox, Message, NotificationSink, RunReport};
pub use worker::{EnqueueError, RunQueue, RunTrigger, spawn_run_worker};
