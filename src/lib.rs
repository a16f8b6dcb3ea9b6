//! Bill Inbox: turns PDF bills in unseen email into chat notifications.

pub mod channels;
pub mod config;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod pipeline;
pub mod server;
