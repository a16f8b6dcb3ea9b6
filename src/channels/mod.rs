//! Mailbox and notification adapters: pure I/O behind the pipeline traits.

pub mod discord;
pub mod email;

pub use discord::DiscordNotifier;
pub use email::ImapMailbox;
