//! Best-effort notifications for finished tasks.
//!
//! Workers hand events to a [`NotificationHandle`] and move on; a
//! [`NotificationDispatcher`] running in the background delivers them with
//! a bounded number of attempts. Delivery failures are logged and counted,
//! never reported back to the task.

mod config;
mod dispatcher;
mod events;
mod handle;
mod log;
mod traits;
mod webhook;

pub use config::NotifierConfig;
pub use dispatcher::{create_notification_system, NotificationDispatcher};
pub use events::NotificationEvent;
pub use handle::NotificationHandle;
pub use log::LogNotifier;
pub use traits::{NotifyError, Notifier};
pub use webhook::WebhookNotifier;
