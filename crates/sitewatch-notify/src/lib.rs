pub mod notifier;
pub mod providers;

pub use notifier::{Notification, Notifier, NotifyError, NotifyResult};
pub use providers::{LogNotifier, WebhookNotifier};
