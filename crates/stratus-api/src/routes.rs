//! API route configuration.
//!
//! All `/api` routes sit behind the session gateway; `/health` is open.
//!
//! - `POST /api/query/execute`, `GET /api/query/status/{id}`,
//!   `POST /api/query/cancel/{id}`, `GET /api/query/active`,
//!   `POST /api/query/validate`
//! - `POST /api/redis/execute`, `POST /api/redis/scan`,
//!   `GET /api/redis/scan/{id}`, `POST /api/redis/scan/{id}/cancel`
//! - `GET /health`

use actix_web::web;

use crate::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::health_handler).service(
        web::scope("/api")
            .service(
                web::scope("/query")
                    .service(handlers::execute_query)
                    .service(handlers::query_status)
                    .service(handlers::cancel_query)
                    .service(handlers::active_executions)
                    .service(handlers::validate_query),
            )
            .service(
                web::scope("/redis")
                    .service(handlers::execute_kv)
                    .service(handlers::scan_start)
                    .service(handlers::scan_status)
                    .service(handlers::scan_cancel),
            ),
    );
}
