//! User model. Login and registration flows live outside this service; the
//! core only resolves users and their contact details.

use clubpulse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub tenant_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub phone: Option<String>,
    pub full_name: String,
    pub role: Option<String>,
}
