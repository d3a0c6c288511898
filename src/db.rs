//! Connections and administrative queries against the configured database.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::result::{ConnectionError, Error as DieselError};
use diesel::sql_query;
use diesel::sql_types::Text;
use failure::Fail;
use log::{debug, info};

use crate::schema::{faces, users};

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Extension providing `uuid_generate_v4()`.
pub static UUID_EXTENSION: &str = "uuid-ossp";

#[derive(Debug, Fail)]
pub enum SchemaError {
    #[fail(display = "Could not connect to the database: {}", _0)]
    Connection(String),
    #[fail(display = "Insufficient privilege: {}", _0)]
    InsufficientPrivilege(String),
    #[fail(display = "Query failed: {}", _0)]
    Query(String),
}

fn is_privilege_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("permission denied") || message.starts_with("must be owner")
}

impl From<DieselError> for SchemaError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(_, info) => {
                let message = info.message().to_string();
                if is_privilege_message(&message) {
                    SchemaError::InsufficientPrivilege(message)
                } else {
                    SchemaError::Query(message)
                }
            }
            other => SchemaError::Query(other.to_string()),
        }
    }
}

impl From<ConnectionError> for SchemaError {
    fn from(err: ConnectionError) -> Self {
        let message = err.to_string();
        if is_privilege_message(&message) {
            SchemaError::InsufficientPrivilege(message)
        } else {
            SchemaError::Connection(message)
        }
    }
}

impl From<r2d2::PoolError> for SchemaError {
    fn from(err: r2d2::PoolError) -> Self {
        SchemaError::Connection(err.to_string())
    }
}

/// Open a single connection to `database_url`.
pub fn establish(database_url: &str) -> Result<PgConnection, SchemaError> {
    debug!("Connecting to the database");
    PgConnection::establish(database_url).map_err(From::from)
}

/// Build a connection pool. Fails if no connection can be made.
pub fn pool(database_url: &str) -> Result<Pool, SchemaError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder().build(manager).map_err(From::from)
}

#[derive(QueryableByName)]
struct Named {
    #[diesel(sql_type = Text)]
    name: String,
}

/// Names of all non-template databases.
pub fn list_databases(conn: &mut PgConnection) -> Result<Vec<String>, SchemaError> {
    let rows = sql_query(
        "SELECT datname::text AS name FROM pg_database WHERE NOT datistemplate ORDER BY datname",
    )
    .load::<Named>(conn)?;
    Ok(rows.into_iter().map(|row| row.name).collect())
}

/// Names of the tables in the `public` schema.
pub fn list_tables(conn: &mut PgConnection) -> Result<Vec<String>, SchemaError> {
    let rows = sql_query(
        "SELECT tablename::text AS name FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename",
    )
    .load::<Named>(conn)?;
    Ok(rows.into_iter().map(|row| row.name).collect())
}

/// Enable `uuid-ossp` in the connected database; a no-op when it is
/// already enabled.
pub fn enable_uuid_extension(conn: &mut PgConnection) -> Result<(), SchemaError> {
    sql_query(format!("CREATE EXTENSION IF NOT EXISTS \"{}\"", UUID_EXTENSION)).execute(conn)?;
    info!("Extension {} enabled", UUID_EXTENSION);
    Ok(())
}

/// Whether the `public` schema currently has a table called `table`.
pub fn table_exists(conn: &mut PgConnection, table: &str) -> Result<bool, SchemaError> {
    Ok(list_tables(conn)?.iter().any(|name| name == table))
}

#[derive(Debug, PartialEq, Eq)]
pub struct Status {
    pub users: i64,
    pub faces: i64,
}

/// Row counts of the owned tables.
pub fn status(conn: &mut PgConnection) -> Result<Status, SchemaError> {
    Ok(Status {
        users: users::table.count().get_result(conn)?,
        faces: faces::table.count().get_result(conn)?,
    })
}

/// Round trip used by the health check.
pub fn ping(conn: &mut PgConnection) -> Result<(), SchemaError> {
    sql_query("SELECT 1").execute(conn)?;
    Ok(())
}
