use actix_web::{web, HttpResponse};
use log::error;
use serde::Serialize;

use crate::db::{self, Pool};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

impl HealthResponse {
    fn new(status: &'static str) -> Self {
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// GET /health: the process is up.
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::new("ok"))
}

/// GET /health/db: a pooled connection can round-trip a query.
pub async fn health_db(pool: web::Data<Pool>) -> HttpResponse {
    let result = web::block(move || {
        let mut conn = pool.get()?;
        db::ping(&mut conn)
    })
    .await;

    match result {
        Ok(Ok(())) => HttpResponse::Ok().json(HealthResponse::new("ok")),
        Ok(Err(e)) => {
            error!("Database health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse::new("unavailable"))
        }
        Err(e) => {
            error!("Database health check was cancelled: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse::new("unavailable"))
        }
    }
}
