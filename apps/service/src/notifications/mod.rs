/// Notification module - turns status transitions into channel deliveries
///
/// This module is responsible for:
/// - Typed channel configuration per channel kind
/// - Rendering alert messages
/// - Fan-out delivery with per-channel timeouts
pub mod dispatcher;
pub mod message;
pub mod models;
pub mod senders;

pub use dispatcher::{DeliveryOutcome, Dispatcher, DispatcherSettings};
pub use message::AlertMessage;
pub use models::{ChannelConfig, ChannelKind, NotificationChannel};
