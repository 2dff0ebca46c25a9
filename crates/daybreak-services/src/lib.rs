//! Daybreak — service adapters.
//!
//! HTTP clients for the narrative, NPC and media generators, an offline
//! generator for running without any of them, and publishers for the chat
//! transport.

pub mod chat;
mod http;
pub mod media;
pub mod offline;
pub mod publishers;

pub use chat::ChatCompletionGenerator;
pub use media::MediaServiceClient;
pub use offline::OfflineGenerator;
pub use publishers::{LogPublisher, WebhookPublisher};
