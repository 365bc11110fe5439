//! Wire shapes of the notification REST API.

use serde::{Deserialize, Serialize};

use crate::domain::notification::Notification;
use crate::ports::NotificationPage;

/// Body of `GET /notifications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default = "default_current_page")]
    pub current_page: u32,
}

fn default_current_page() -> u32 {
    1
}

impl From<ListResponse> for NotificationPage {
    fn from(body: ListResponse) -> Self {
        NotificationPage {
            items: body.notifications,
            total: body.total,
            total_pages: body.pages,
            current_page: body.current_page,
        }
    }
}

/// Body of `GET /notifications/unread-count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: u32,
}

/// Error body the server sends alongside non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(alias = "message")]
    pub error: String,
}
