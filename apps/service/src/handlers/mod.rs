/// Event subscribers
///
/// Persistence, logging and the per-family notification fan-out all hang off
/// the [`crate::events::EventDispatcher`].
pub mod database;
pub mod formatter;
pub mod log;
pub mod notification;
pub mod pagerduty;

pub use database::DatabaseEventHandler;
pub use formatter::{
    DiscordFormatter, MessageFormatter, PlainTextFormatter, SlackFormatter, TelegramFormatter,
};
pub use log::LogEventHandler;
pub use notification::TextNotificationHandler;
pub use pagerduty::PagerdutyEventHandler;
