use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::permissions::Permissions;
use crate::schema::users;

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub is_verified: bool,
}

#[derive(Queryable, Debug)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub is_verified: Option<bool>,
    pub permissions: i16,
}

impl User {
    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits(self.permissions)
    }
}
