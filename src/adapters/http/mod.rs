//! HTTP adapter - REST client for the notification API.

mod dto;
mod rest_api;

pub use dto::{ListResponse, UnreadCountResponse};
pub use rest_api::{RestApiConfig, RestNotificationApi};
