//! NotificationHandler port - Interface for consumers of pushed notifications.
//!
//! The push bridge fans every normalised notification out to the registered
//! handlers, in the order they subscribed.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::notification::Notification;

/// Handler for pushed notifications.
///
/// Implementations should be:
/// - **Idempotent** - the same notification may be delivered again after a reconnect
/// - **Quick** - delivery to later handlers waits for this one
/// - **Isolated** - an error is logged and does not stop delivery to others
///
/// # Example
///
/// ```ignore
/// struct ToastHandler;
///
/// #[async_trait]
/// impl NotificationHandler for ToastHandler {
///     async fn handle(&self, notification: Notification) -> Result<(), DomainError> {
///         if notification.message.is_empty() {
///             return Err(DomainError::new(ErrorCode::HandlerFailed, "nothing to show"));
///         }
///         println!("{} {}", notification.kind.icon(), notification.message);
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "ToastHandler"
///     }
/// }
/// ```
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Process one notification.
    async fn handle(&self, notification: Notification) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_handler_object_safe(_: &dyn NotificationHandler) {}

    #[allow(dead_code)]
    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn notification_handler_is_send_sync() {
        #[allow(dead_code)]
        fn check<T: NotificationHandler>() {
            assert_send_sync::<T>();
        }
    }
}
