//! Long-running service and its service-manager unit.
//!
//! The service does not know whether a terminal is attached. Keeping it
//! alive across operator logouts is the job of the service manager, for
//! which [`render_unit`] produces a systemd unit.

use std::io;
use std::path::{Path, PathBuf};

use actix_web::{middleware, web, App, HttpServer};
use failure::Fail;
use log::info;

use crate::config::Config;
use crate::db::{self, SchemaError};
use crate::resource;

#[derive(Debug, Fail)]
pub enum ServiceError {
    #[fail(display = "{}", _0)]
    Schema(SchemaError),
    #[fail(display = "Http server error: {}", _0)]
    Io(io::Error),
}

impl From<SchemaError> for ServiceError {
    fn from(err: SchemaError) -> Self {
        ServiceError::Schema(err)
    }
}

impl From<io::Error> for ServiceError {
    fn from(err: io::Error) -> Self {
        ServiceError::Io(err)
    }
}

/// Serve until SIGINT or SIGTERM.
pub async fn run(config: &Config) -> Result<(), ServiceError> {
    let pool = db::pool(&config.database_url)?;
    let address = config.bind_address();

    info!("Starting HTTP server on {}", address);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(resource::health))
            .route("/health/db", web::get().to(resource::health_db))
    })
    .bind(address.as_str())?
    .run()
    .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Inputs of [`render_unit`].
#[derive(Clone, Debug)]
pub struct UnitOptions {
    pub exe: PathBuf,
    pub env_file: PathBuf,
    pub working_dir: PathBuf,
    pub user: Option<String>,
}

/// One `ExecStart` word: double-quoted, with `\`, `"`, `$` and `%`
/// escaped so systemd passes the path through unchanged.
fn exec_arg(path: &Path) -> String {
    let mut arg = String::from("\"");
    for c in path.display().to_string().chars() {
        match c {
            '\\' | '"' => {
                arg.push('\\');
                arg.push(c);
            }
            '$' => arg.push_str("$$"),
            '%' => arg.push_str("%%"),
            _ => arg.push(c),
        }
    }
    arg.push('"');
    arg
}

/// A systemd unit that keeps `serve` running.
pub fn render_unit(options: &UnitOptions) -> String {
    let mut unit = String::new();
    unit.push_str("[Unit]\n");
    unit.push_str("Description=posture-face backend\n");
    unit.push_str("After=network.target postgresql.service\n");
    unit.push('\n');
    unit.push_str("[Service]\n");
    unit.push_str("Type=simple\n");
    if let Some(user) = &options.user {
        unit.push_str(&format!("User={}\n", user));
    }
    unit.push_str(&format!(
        "WorkingDirectory={}\n",
        options.working_dir.display().to_string().replace('%', "%%")
    ));
    unit.push_str("Environment=RUST_LOG=posture_face=info,actix_web=info\n");
    unit.push_str(&format!(
        "ExecStart={} --env-file {} serve\n",
        exec_arg(&options.exe),
        exec_arg(&options.env_file)
    ));
    unit.push_str("Restart=always\n");
    unit.push_str("RestartSec=5\n");
    unit.push('\n');
    unit.push_str("[Install]\n");
    unit.push_str("WantedBy=multi-user.target\n");
    unit
}
