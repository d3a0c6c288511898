//! Operator-side administration of the `users` table.

use std::fmt;
use std::str::FromStr;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_query;
use diesel::sql_types::Text;
use failure::Fail;
use log::{debug, info};
use uuid::Uuid;

use crate::db::SchemaError;
use crate::hash;
use crate::models::{NewUser, User};
use crate::permissions::{Permission, PermissionError, Permissions};
use crate::schema::users;

#[derive(Debug, Fail)]
pub enum AdminError {
    #[fail(display = "{}", _0)]
    Schema(SchemaError),
    #[fail(display = "User not found: {}", _0)]
    NotFound(String),
    #[fail(display = "Email already registered: {}", _0)]
    EmailTaken(String),
    #[fail(display = "Expected column=value, got {:?}", _0)]
    Malformed(String),
    #[fail(display = "Column {} cannot be used here", _0)]
    Column(String),
    #[fail(display = "Invalid value for {}: {:?}", column, value)]
    Value { column: &'static str, value: String },
    #[fail(display = "{}", _0)]
    Permission(PermissionError),
    #[fail(display = "Could not gather randomness for the password salt")]
    Random,
}

impl From<SchemaError> for AdminError {
    fn from(err: SchemaError) -> Self {
        AdminError::Schema(err)
    }
}

impl From<DieselError> for AdminError {
    fn from(err: DieselError) -> Self {
        AdminError::Schema(err.into())
    }
}

impl From<PermissionError> for AdminError {
    fn from(err: PermissionError) -> Self {
        AdminError::Permission(err)
    }
}

/// Columns an operator may name in lookups and updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    Id,
    Email,
    Name,
    IsVerified,
    Permissions,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Email => "email",
            Column::Name => "name",
            Column::IsVerified => "is_verified",
            Column::Permissions => "permissions",
        }
    }

    fn sql_type(self) -> &'static str {
        match self {
            Column::Id => "uuid",
            Column::Email | Column::Name => "varchar",
            Column::IsVerified => "boolean",
            Column::Permissions => "smallint",
        }
    }

    /// Check `value` against the column type and return its canonical text.
    fn normalize(self, value: &str) -> Result<String, AdminError> {
        let invalid = || AdminError::Value {
            column: self.name(),
            value: value.to_string(),
        };
        match self {
            Column::Id => Uuid::parse_str(value)
                .map(|id| id.to_string())
                .map_err(|_| invalid()),
            Column::Email | Column::Name => Ok(value.to_string()),
            Column::IsVerified => match value.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok("true".to_string()),
                "false" | "f" | "0" => Ok("false".to_string()),
                _ => Err(invalid()),
            },
            Column::Permissions => match value.parse::<i16>() {
                Ok(bits) if bits >= 0 && bits <= 255 => Ok(bits.to_string()),
                _ => Err(invalid()),
            },
        }
    }
}

impl FromStr for Column {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Column::Id),
            "email" => Ok(Column::Email),
            "name" => Ok(Column::Name),
            "is_verified" => Ok(Column::IsVerified),
            "permissions" => Ok(Column::Permissions),
            _ => Err(AdminError::Column(s.to_string())),
        }
    }
}

/// A validated `column=value` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub column: Column,
    pub value: String,
}

impl FromStr for Assignment {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(column), Some(value)) if !column.trim().is_empty() => {
                let column: Column = column.trim().parse()?;
                let value = column.normalize(value.trim())?;
                Ok(Assignment { column, value })
            }
            _ => Err(AdminError::Malformed(s.to_string())),
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.column.name(), self.value)
    }
}

/// How to pick out a single user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserKey {
    Id(Uuid),
    Email(String),
    Name(String),
}

impl FromStr for UserKey {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let assignment: Assignment = s.parse()?;
        match assignment.column {
            Column::Id => Uuid::parse_str(&assignment.value)
                .map(UserKey::Id)
                .map_err(|_| AdminError::Malformed(s.to_string())),
            Column::Email => Ok(UserKey::Email(assignment.value)),
            Column::Name => Ok(UserKey::Name(assignment.value)),
            other => Err(AdminError::Column(other.name().to_string())),
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserKey::Id(id) => write!(f, "id={}", id),
            UserKey::Email(email) => write!(f, "email={}", email),
            UserKey::Name(name) => write!(f, "name={}", name),
        }
    }
}

/// `SELECT * FROM users WHERE <attr> = <val>`, first match.
pub fn find(conn: &mut PgConnection, key: &UserKey) -> Result<User, AdminError> {
    debug!("Looking up user by {}", key);
    let query = users::table.into_boxed();
    let query = match key {
        UserKey::Id(id) => query.filter(users::id.eq(*id)),
        UserKey::Email(email) => query.filter(users::email.eq(email.clone())),
        UserKey::Name(name) => query.filter(users::name.eq(name.clone())),
    };
    query
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| AdminError::NotFound(key.to_string()))
}

/// The parameterised statement behind [`update`]. Values are bound as `$1`
/// and `$2`; `id` may only appear in the condition.
fn update_statement(set: &Assignment, condition: &Assignment) -> Result<String, AdminError> {
    if set.column == Column::Id {
        return Err(AdminError::Column(set.column.name().to_string()));
    }
    Ok(format!(
        "UPDATE users SET {} = $1::{} WHERE {} = $2::{}",
        set.column.name(),
        set.column.sql_type(),
        condition.column.name(),
        condition.column.sql_type(),
    ))
}

/// `UPDATE users SET <set> WHERE <condition>`; returns the number of rows
/// changed.
pub fn update(
    conn: &mut PgConnection,
    set: &Assignment,
    condition: &Assignment,
) -> Result<usize, AdminError> {
    let statement = update_statement(set, condition)?;
    debug!("{}", statement);
    let changed = sql_query(statement)
        .bind::<Text, _>(set.value.clone())
        .bind::<Text, _>(condition.value.clone())
        .execute(conn)?;
    info!("Set {} where {}: {} row(s)", set, condition, changed);
    Ok(changed)
}

/// Delete every user matching `key`. Face records are kept.
pub fn delete(conn: &mut PgConnection, key: &UserKey) -> Result<usize, AdminError> {
    let deleted = match key {
        UserKey::Id(id) => diesel::delete(users::table.filter(users::id.eq(*id))).execute(conn)?,
        UserKey::Email(email) => {
            diesel::delete(users::table.filter(users::email.eq(email.clone()))).execute(conn)?
        }
        UserKey::Name(name) => {
            diesel::delete(users::table.filter(users::name.eq(name.clone()))).execute(conn)?
        }
    };
    if deleted == 0 {
        return Err(AdminError::NotFound(key.to_string()));
    }
    info!("Deleted {} user(s) by {}", deleted, key);
    Ok(deleted)
}

/// Seed an account directly, bypassing registration.
pub fn create(
    conn: &mut PgConnection,
    email: &str,
    name: &str,
    password: &str,
    is_verified: bool,
) -> Result<User, AdminError> {
    let new_user = NewUser {
        email: email.to_string(),
        password_hash: hash::hash_password(password).map_err(|_| AdminError::Random)?,
        name: name.to_string(),
        is_verified,
    };

    let user = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result::<User>(conn)
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AdminError::EmailTaken(email.to_string())
            }
            other => other.into(),
        })?;
    info!("Created user {}", user.id);
    Ok(user)
}

fn change_permissions<F>(
    conn: &mut PgConnection,
    key: &UserKey,
    change: F,
) -> Result<Permissions, AdminError>
where
    F: FnOnce(Permissions) -> Result<Permissions, PermissionError>,
{
    conn.transaction(|conn| {
        let user = find(conn, key)?;
        let permissions = change(user.permissions())?;
        diesel::update(users::table.find(user.id))
            .set(users::permissions.eq(permissions.bits()))
            .execute(conn)?;
        info!("Permissions of {} are now {}", user.id, permissions);
        Ok(permissions)
    })
}

pub fn grant(
    conn: &mut PgConnection,
    key: &UserKey,
    permission: Permission,
) -> Result<Permissions, AdminError> {
    change_permissions(conn, key, |p| p.grant(permission.0))
}

pub fn revoke(
    conn: &mut PgConnection,
    key: &UserKey,
    permission: Permission,
) -> Result<Permissions, AdminError> {
    change_permissions(conn, key, |p| p.revoke(permission.0))
}

/// Whether the user holds `permission`.
pub fn has_permission(
    conn: &mut PgConnection,
    key: &UserKey,
    permission: Permission,
) -> Result<bool, AdminError> {
    let user = find(conn, key)?;
    Ok(user.permissions().check(permission.0)?)
}

/// Whether `password` matches the stored hash of the user.
pub fn check_password(
    conn: &mut PgConnection,
    key: &UserKey,
    password: &str,
) -> Result<bool, AdminError> {
    let user = find(conn, key)?;
    Ok(user
        .password_hash
        .as_ref()
        .map_or(false, |encoded| hash::verify_password(encoded, password)))
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let a: Assignment = "is_verified=T".parse().unwrap();
        assert_eq!(a.column, Column::IsVerified);
        assert_eq!(a.value, "true");

        let a: Assignment = "name=a=b".parse().unwrap();
        assert_eq!(a.value, "a=b");
    }

    #[test]
    fn test_reject_unknown_column() {
        match "password_hash=x".parse::<Assignment>() {
            Err(AdminError::Column(column)) => assert_eq!(column, "password_hash"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            "users; DROP TABLE users=1".parse::<Assignment>(),
            Err(AdminError::Column(_))
        ));
    }

    #[test]
    fn test_reject_bad_values() {
        assert!(matches!(
            "permissions=256".parse::<Assignment>(),
            Err(AdminError::Value { column: "permissions", .. })
        ));
        assert!(matches!(
            "id=not-a-uuid".parse::<Assignment>(),
            Err(AdminError::Value { column: "id", .. })
        ));
        assert!(matches!(
            "no-equals-sign".parse::<Assignment>(),
            Err(AdminError::Malformed(_))
        ));
    }

    #[test]
    fn test_user_key() {
        let id = Uuid::new_v4();
        assert_eq!(
            format!("id={}", id).parse::<UserKey>().unwrap(),
            UserKey::Id(id)
        );
        assert_eq!(
            "email=a@b.c".parse::<UserKey>().unwrap(),
            UserKey::Email("a@b.c".to_string())
        );
        assert!(matches!(
            "is_verified=true".parse::<UserKey>(),
            Err(AdminError::Column(_))
        ));
    }

    #[test]
    fn test_update_statement() {
        let set: Assignment = "permissions=143".parse().unwrap();
        let condition: Assignment = "email=a@b.c".parse().unwrap();
        assert_eq!(
            update_statement(&set, &condition).unwrap(),
            "UPDATE users SET permissions = $1::smallint WHERE email = $2::varchar"
        );
    }

    #[test]
    fn test_update_cannot_assign_id() {
        let set: Assignment = format!("id={}", Uuid::new_v4()).parse().unwrap();
        let condition: Assignment = "email=a@b.c".parse().unwrap();
        match update_statement(&set, &condition) {
            Err(AdminError::Column(column)) => assert_eq!(column, "id"),
            other => panic!("unexpected {:?}", other),
        }

        // id is fine as the condition
        assert!(update_statement(&condition, &set).is_ok());
    }
}
