//! Notification API Port - Interface to the server's notification REST API.
//!
//! The inbox only needs four calls: list a page, read the unread count, and
//! mark one or all notifications read. Adapters translate these to whatever
//! wire format the server speaks.
//!
//! # Example
//!
//! ```ignore
//! let page = api.list_page(PageRequest::first(20)).await?;
//! store.apply_fetched_page(page.current_page, page.items, page.total_pages);
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::NotificationId;
use crate::domain::notification::Notification;

/// Port for the notification REST API.
///
/// Implementations are scoped to a single identity; the bearer token is part
/// of the adapter, not of each call.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Fetch one page of the inbox, newest first.
    async fn list_page(&self, request: PageRequest) -> Result<NotificationPage, ApiError>;

    /// Fetch the server's unread count.
    async fn unread_count(&self) -> Result<u32, ApiError>;

    /// Mark one notification read.
    async fn mark_read(&self, id: &NotificationId) -> Result<(), ApiError>;

    /// Mark every notification read.
    async fn mark_all_read(&self) -> Result<(), ApiError>;
}

/// Parameters of a list call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Only return unread notifications.
    pub unread_only: bool,
}

impl PageRequest {
    /// Request for page 1.
    pub fn first(limit: u32) -> Self {
        Self::page(1, limit)
    }

    /// Request for an arbitrary page.
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit,
            unread_only: false,
        }
    }

    /// Restricts the request to unread notifications.
    pub fn unread_only(mut self) -> Self {
        self.unread_only = true;
        self
    }
}

/// One page returned by the list call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationPage {
    /// Notifications on this page, in server order.
    pub items: Vec<Notification>,
    /// Total notifications matching the request.
    pub total: u32,
    /// Number of pages available.
    pub total_pages: u32,
    /// The page these items belong to.
    pub current_page: u32,
}

/// Errors from the notification API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Could not reach the server.
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// Token rejected by the server.
    #[error("unauthorized")]
    Unauthorized,

    /// The notification does not exist for this user.
    #[error("notification not found: {0}")]
    NotFound(String),

    /// Server answered with an unexpected status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Body or reason phrase.
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// True for failures a later retry might not hit.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Unauthorized | ApiError::NotFound(_) | ApiError::Parse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_api_object_safe(_: &dyn NotificationApi) {}

    #[allow(dead_code)]
    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn notification_api_is_send_sync() {
        #[allow(dead_code)]
        fn check<T: NotificationApi>() {
            assert_send_sync::<T>();
        }
    }

    #[test]
    fn page_request_clamps_to_first_page() {
        assert_eq!(PageRequest::page(0, 20).page, 1);
        assert!(!PageRequest::first(20).unread_only);
        assert!(PageRequest::first(20).unread_only().unread_only);
    }

    #[test]
    fn transient_errors_are_classified() {
        assert!(ApiError::Network("reset".into()).is_transient());
        assert!(ApiError::Timeout { timeout_secs: 10 }.is_transient());
        assert!(ApiError::Status { status: 503, message: "busy".into() }.is_transient());
        assert!(!ApiError::Status { status: 400, message: "bad".into() }.is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
    }

    #[test]
    fn errors_display_lowercase_messages() {
        assert_eq!(
            ApiError::Status { status: 500, message: "boom".into() }.to_string(),
            "server returned 500: boom"
        );
        assert_eq!(ApiError::Unauthorized.to_string(), "unauthorized");
    }
}
