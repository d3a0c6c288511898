//! Drop-and-recreate routines for the user store and the face store.
//!
//! The two stores share no tables and no foreign keys, so each reset can
//! run on its own. Each one runs in its own transaction; nothing
//! coordinates them.

use std::fmt;

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::Connection;
use log::{debug, info};

use crate::config::Config;
use crate::db::{self, SchemaError};
use crate::permissions::DEFAULT_PERMISSIONS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Store {
    Users,
    Faces,
}

impl Store {
    /// Order an operator resets everything in.
    pub const ALL: [Store; 2] = [Store::Users, Store::Faces];

    pub fn tables(self) -> &'static [&'static str] {
        match self {
            Store::Users => &["users"],
            Store::Faces => &["faces"],
        }
    }

    /// DDL recreating the store, in execution order.
    pub fn create_statements(self, default_verified: bool) -> Vec<String> {
        match self {
            Store::Users => vec![
                format!(
                    "CREATE TABLE users (\
                     id UUID PRIMARY KEY DEFAULT uuid_generate_v4(), \
                     created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                     email VARCHAR, \
                     password_hash VARCHAR, \
                     name VARCHAR, \
                     is_verified BOOLEAN DEFAULT {}, \
                     permissions SMALLINT NOT NULL DEFAULT {})",
                    default_verified, DEFAULT_PERMISSIONS
                ),
                "CREATE INDEX ix_users_id ON users (id)".to_string(),
                "CREATE UNIQUE INDEX ix_users_email ON users (email)".to_string(),
            ],
            Store::Faces => vec![
                "CREATE TABLE faces (\
                 id UUID PRIMARY KEY DEFAULT uuid_generate_v4(), \
                 uploaded_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                 uploaded_by UUID NOT NULL, \
                 blob BYTEA NOT NULL, \
                 feature JSON NOT NULL, \
                 description VARCHAR)"
                    .to_string(),
                "CREATE INDEX ix_faces_id ON faces (id)".to_string(),
                "CREATE INDEX ix_faces_uploaded_by ON faces (uploaded_by)".to_string(),
            ],
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Store::Users => write!(f, "users"),
            Store::Faces => write!(f, "faces"),
        }
    }
}

/// Connect with `DATABASE_URL` and reset `store`.
pub fn reset(config: &Config, store: Store) -> Result<(), SchemaError> {
    let mut conn = db::establish(&config.database_url)?;
    reset_with(&mut conn, store, config.default_verified)
}

/// Reset `store` on an open connection.
pub fn reset_with(
    conn: &mut PgConnection,
    store: Store,
    default_verified: bool,
) -> Result<(), SchemaError> {
    info!("Resetting the {} store", store);
    conn.transaction::<_, SchemaError, _>(|conn| {
        db::enable_uuid_extension(conn)?;
        for table in store.tables() {
            debug!("Dropping table {}", table);
            conn.batch_execute(&format!("DROP TABLE IF EXISTS {} CASCADE", table))?;
        }
        for statement in store.create_statements(default_verified) {
            debug!("{}", statement);
            conn.batch_execute(&statement)?;
        }
        Ok(())
    })?;
    info!("The {} store is empty and ready", store);
    Ok(())
}

/// Reset every store in operator order, stopping at the first failure.
pub fn reset_all(config: &Config) -> Result<(), SchemaError> {
    for store in Store::ALL.iter() {
        reset(config, *store)?;
    }
    Ok(())
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn test_stores_do_not_share_tables() {
        for table in Store::Users.tables() {
            assert!(!Store::Faces.tables().contains(table));
        }
    }

    #[test]
    fn test_faces_do_not_reference_users() {
        for statement in Store::Faces.create_statements(false) {
            assert!(!statement.contains("REFERENCES"));
            assert!(!statement.contains("users"));
        }
    }

    #[test]
    fn test_verified_default_follows_config() {
        let ddl = Store::Users.create_statements(true);
        assert!(ddl[0].contains("is_verified BOOLEAN DEFAULT true"));
        assert!(ddl[0].contains("permissions SMALLINT NOT NULL DEFAULT 15"));
    }

    #[test]
    fn test_reset_order() {
        assert_eq!(Store::ALL, [Store::Users, Store::Faces]);
    }

    #[test]
    fn test_reset_all_stops_when_unreachable() {
        let pairs = crate::config::test::minimal()
            .into_iter()
            .map(|(k, v)| match k {
                "DATABASE_URL" => (k, "postgres://nobody@127.0.0.1:1/none"),
                _ => (k, v),
            });
        let config = Config::from_pairs(pairs).unwrap();
        assert!(matches!(
            reset_all(&config),
            Err(SchemaError::Connection(_))
        ));
    }
}
