use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::AdminView;

const DEFAULT_PAGE_LIMIT: u32 = 10;
const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

/// Success envelope: `{status, message, data}` plus page info on listings.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub status: u16,
    pub message: &'static str,
    pub data: T,
    #[serde(flatten)]
    pub pagination: Option<Pagination>,
}

impl<T> DataResponse<T> {
    pub fn new(status: u16, message: &'static str, data: T) -> Self {
        Self {
            status,
            message,
            data,
            pagination: None,
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: u32,
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl PaginationQuery {
    /// Clamped `(limit, page)`; both are at least 1.
    pub fn resolve(&self) -> (u32, u32) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let page = self.page.unwrap_or(1).max(1);
        (limit, page)
    }
}

#[derive(Debug, Serialize)]
pub struct JwtResponse {
    pub token: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "user")]
    pub admin: AdminView,
}

#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub username: String,
}
