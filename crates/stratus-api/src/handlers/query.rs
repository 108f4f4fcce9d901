//! SQL execution endpoints: submit, poll, cancel, list, validate.

use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse, Responder};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use stratus_commons::ExecutionId;
use stratus_commons::validation::validate_schema_identifier;
use stratus_exec::{QueryRequest, SqlFanoutExecutor};
use stratus_policy::{authorize, classify_sql, split_statements};
use stratus_pools::PoolRegistry;
use stratus_store::{ActiveClientRegistry, ExecutionStore};

use crate::auth::{Operator, PasswordVerifier};
use crate::models::{AcceptedResponse, ErrorBody, ErrorCode, ValidateResponse};

/// Submission body: the executor request plus the optional re-auth
/// password, which never travels further than this handler.
#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    #[serde(flatten)]
    pub query: QueryRequest,
    #[serde(default)]
    pub password: Option<String>,
}

/// POST /api/query/execute - admit and launch an SQL fan-out.
///
/// The policy engine runs first; nothing is recorded for a denied batch.
/// Dangerous verbs under MASTER require a verified password. On success
/// the execution proceeds asynchronously and the returned id is pollable
/// via `GET /api/query/status/{id}`.
#[post("/execute")]
pub async fn execute_query(
    operator: Operator,
    body: web::Json<ExecuteQueryRequest>,
    store: web::Data<Arc<ExecutionStore>>,
    pools: web::Data<Arc<PoolRegistry>>,
    executor: web::Data<Arc<SqlFanoutExecutor>>,
    verifier: web::Data<Arc<dyn PasswordVerifier>>,
) -> impl Responder {
    let req = body.into_inner();

    let categories = classify_sql(&req.query.query);
    if categories.is_empty() {
        return HttpResponse::BadRequest().json(ErrorBody::new(
            ErrorCode::EmptySql,
            "No SQL statements provided",
        ));
    }

    let decision = authorize(operator.role, &categories);
    if !decision.allowed {
        let reason = decision.reason.unwrap_or_else(|| "Denied by policy".into());
        warn!(
            "Denied SQL submission from {} ({}): {}",
            operator.user_id, operator.role, reason
        );
        return HttpResponse::Forbidden().json(ErrorBody::new(ErrorCode::PermissionDenied, reason));
    }

    if decision.requires_password_reauth {
        let Some(password) = req.password.as_deref() else {
            return HttpResponse::BadRequest().json(ErrorBody::new(
                ErrorCode::PasswordRequired,
                "Password verification required",
            ));
        };
        if !verifier.verify(&operator.user_id, password).await {
            warn!(
                "Password re-auth failed for {} on dangerous statement",
                operator.user_id
            );
            return HttpResponse::Unauthorized().json(ErrorBody::new(
                ErrorCode::InvalidPassword,
                "Password verification failed",
            ));
        }
    }

    if let Some(schema) = req.query.pg_schema.as_deref() {
        if let Err(e) = validate_schema_identifier(schema) {
            return HttpResponse::BadRequest().json(ErrorBody::new(
                ErrorCode::InvalidSchema,
                format!("Invalid schema name '{}': {}", schema, e),
            ));
        }
    }

    // Unknown cloud/database is a 400 at admission; a secondary cloud
    // missing the database stays a per-target failure in the result.
    let config = pools.config();
    if req.query.targets_all_clouds() {
        if config.primary.db(&req.query.database).is_none() {
            return HttpResponse::BadRequest().json(ErrorBody::new(
                ErrorCode::UnknownDatabase,
                format!(
                    "Database '{}' is not configured on primary cloud '{}'",
                    req.query.database, config.primary.cloud_name
                ),
            ));
        }
    } else {
        let Some(cloud) = config.sql_cloud(&req.query.mode) else {
            return HttpResponse::BadRequest().json(ErrorBody::new(
                ErrorCode::UnknownCloud,
                format!("Unknown cloud '{}'", req.query.mode),
            ));
        };
        if cloud.db(&req.query.database).is_none() {
            return HttpResponse::BadRequest().json(ErrorBody::new(
                ErrorCode::UnknownDatabase,
                format!(
                    "Database '{}' is not configured on cloud '{}'",
                    req.query.database, cloud.cloud_name
                ),
            ));
        }
    }

    let id = ExecutionId::new();
    if let Err(e) = store.init(&id, Some(operator.user_id.clone())).await {
        warn!("Failed to initialise execution record: {}", e);
        return HttpResponse::InternalServerError().json(ErrorBody::new(
            ErrorCode::InternalError,
            "Failed to initialise execution record",
        ));
    }

    info!(
        "Accepted SQL execution {} from {} ({} statement(s), mode={})",
        id,
        operator.user_id,
        categories.len(),
        req.query.mode
    );
    let executor = Arc::clone(executor.get_ref());
    tokio::spawn(Box::pin(executor.run(id.clone(), req.query)));

    HttpResponse::Ok().json(AcceptedResponse {
        execution_id: id.to_string(),
    })
}

/// GET /api/query/status/{id} - poll an execution record.
#[get("/status/{id}")]
pub async fn query_status(
    _operator: Operator,
    path: web::Path<String>,
    store: web::Data<Arc<ExecutionStore>>,
) -> impl Responder {
    let id = ExecutionId::from(path.into_inner());
    match store.get(&id).await {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => HttpResponse::NotFound()
            .json(ErrorBody::new(ErrorCode::NotFound, "Execution not found")),
        Err(e) => {
            warn!("Status read for {} failed: {}", id, e);
            HttpResponse::InternalServerError()
                .json(ErrorBody::new(ErrorCode::InternalError, e.to_string()))
        }
    }
}

/// POST /api/query/cancel/{id} - initiate cancellation. MASTER may cancel
/// any execution; other roles only their own.
#[post("/cancel/{id}")]
pub async fn cancel_query(
    operator: Operator,
    path: web::Path<String>,
    store: web::Data<Arc<ExecutionStore>>,
    executor: web::Data<Arc<SqlFanoutExecutor>>,
) -> impl Responder {
    let id = ExecutionId::from(path.into_inner());
    let record = match store.get(&id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ErrorBody::new(ErrorCode::NotFound, "Execution not found"))
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ErrorBody::new(ErrorCode::InternalError, e.to_string()))
        }
    };

    let owns = record.user_id.as_ref() == Some(&operator.user_id);
    if !operator.role.is_master() && !owns {
        return HttpResponse::Forbidden().json(ErrorBody::new(
            ErrorCode::PermissionDenied,
            "Only MASTER may cancel another operator's execution",
        ));
    }

    if let Err(e) = executor.cancel(&id).await {
        warn!("Cancel of {} failed: {}", id, e);
        return HttpResponse::InternalServerError()
            .json(ErrorBody::new(ErrorCode::InternalError, e.to_string()));
    }
    info!("Cancellation of {} initiated by {}", id, operator.user_id);
    HttpResponse::Ok().json(json!({ "success": true, "executionId": id.to_string() }))
}

/// GET /api/query/active - executions in flight on this replica.
#[get("/active")]
pub async fn active_executions(
    _operator: Operator,
    registry: web::Data<Arc<ActiveClientRegistry>>,
) -> impl Responder {
    HttpResponse::Ok().json(registry.list_active())
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub query: String,
}

/// POST /api/query/validate - run the policy engine and shape splitter
/// only; nothing executes.
#[post("/validate")]
pub async fn validate_query(
    operator: Operator,
    body: web::Json<ValidateRequest>,
) -> impl Responder {
    let statements = split_statements(&body.query);
    if statements.is_empty() {
        return HttpResponse::Ok().json(ValidateResponse {
            valid: false,
            error: Some("No SQL statements provided".to_string()),
            statement_count: 0,
            categories: Vec::new(),
            requires_password_reauth: false,
        });
    }
    let categories = classify_sql(&body.query);
    let decision = authorize(operator.role, &categories);
    HttpResponse::Ok().json(ValidateResponse {
        valid: decision.allowed,
        error: decision.reason,
        statement_count: statements.len(),
        categories,
        requires_password_reauth: decision.requires_password_reauth,
    })
}
