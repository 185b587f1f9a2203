use crate::{
    GIT_COMMIT_HASH,
    api::Database,
    core::Core,
};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::Connection;
use tracing::{Instrument, debug, error, info_span};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    email_queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_emails: Option<u64>,
}

async fn database_ok(database: &Database) -> bool {
    let Database::Postgres(pool) = database else {
        return true;
    };
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    match pool.acquire().instrument(acquire_span).await {
        Ok(mut conn) => {
            let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
            match conn.ping().instrument(ping_span).await {
                Ok(()) => true,
                Err(error) => {
                    error!("Failed to ping database: {}", error);
                    false
                }
            }
        }
        Err(error) => {
            error!("Failed to acquire database connection: {}", error);
            false
        }
    }
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Database and email queue are healthy", body = [Health]),
        (status = 503, description = "Database or email queue is unhealthy", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(
    method: Method,
    database: Extension<Database>,
    core: Extension<Core>,
) -> impl IntoResponse {
    let database_ok = database_ok(&database.0).await;
    let queue = match core.queue.stats().await {
        Ok(stats) => Ok(stats.pending),
        Err(err) => {
            error!("Failed to read email queue stats: {err:#}");
            Err(())
        }
    };
    let is_healthy = database_ok && queue.is_ok();

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: match (&database.0, database_ok) {
            (Database::InMemory, _) => "memory".to_string(),
            (Database::Postgres(_), true) => "ok".to_string(),
            (Database::Postgres(_), false) => "error".to_string(),
        },
        email_queue: if queue.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
        pending_emails: queue.ok(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            error!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    if is_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
