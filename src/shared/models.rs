use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::shared::enums::{UserRole, UserStatus};
use crate::shared::schema::users;

#[derive(Debug, Clone, Serialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub department: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Display fields a response embeds when a record references a user.
#[derive(Debug, Clone, Serialize)]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

pub fn find_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<User>> {
    let user = users::table
        .filter(users::id.eq(user_id))
        .first::<User>(conn)
        .optional()?;
    Ok(user)
}

/// Batch-resolves user references for response population. Ids that do not
/// resolve are simply absent from the map.
pub fn load_user_refs(conn: &mut PgConnection, ids: &[Uuid]) -> Result<HashMap<Uuid, UserRef>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<User> = users::table.filter(users::id.eq_any(ids)).load(conn)?;
    Ok(rows.iter().map(|u| (u.id, UserRef::from(u))).collect())
}
