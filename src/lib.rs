//! Operational tooling for the posture-face backend: configuration
//! loading, host bootstrap, schema resets, user administration and the
//! long-running service.

#[macro_use]
extern crate diesel;

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod mail;
pub mod models;
pub mod permissions;
pub mod reset;
pub mod resource;
pub mod schema;
pub mod secret;
pub mod service;
pub mod users;

use std::io::Write;

use chrono::Utc;

/// Filter used when `RUST_LOG` is unset.
pub static DEFAULT_LOG_FILTER: &str = "posture_face=info,actix_web=info,diesel=info";

/// Install the global logger. `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`].
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .format(|formatter, record| {
            writeln!(
                formatter,
                "{} - {:5} - {}",
                Utc::now().to_rfc3339(),
                record.level(),
                record.args()
            )
        })
        .init();
}
