//! Cache-cluster endpoints: command fan-out and the async SCAN engine.

use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse, Responder};
use log::{info, warn};
use serde_json::json;
use stratus_commons::ExecutionId;
use stratus_exec::{CacheScanExecutor, KvCommandExecutor, KvCommandRequest, ScanAction, ScanRequest};
use stratus_policy::{
    authorize_kv, classify_kv_command, validate_kv_args, validate_raw_command,
    validate_scan_pattern, KvCommandClass, PolicyError,
};
use stratus_pools::PoolRegistry;
use stratus_store::ExecutionStore;

use crate::auth::Operator;
use crate::models::{AcceptedResponse, ErrorBody, ErrorCode};

fn policy_rejection(error: PolicyError) -> HttpResponse {
    match &error {
        PolicyError::BlockedCommand(_) => {
            HttpResponse::Forbidden().json(ErrorBody::new(ErrorCode::BlockedCommand, error.to_string()))
        }
        PolicyError::WildcardPattern(_) => {
            HttpResponse::Forbidden().json(ErrorBody::new(ErrorCode::InvalidPattern, error.to_string()))
        }
        PolicyError::Denied(_) => {
            HttpResponse::Forbidden().json(ErrorBody::new(ErrorCode::PermissionDenied, error.to_string()))
        }
        _ => HttpResponse::BadRequest().json(ErrorBody::new(ErrorCode::InvalidInput, error.to_string())),
    }
}

/// POST /api/redis/execute - synchronous-appearing command fan-out: blocks
/// until every target cloud has answered, then returns the cloud-keyed
/// result object.
#[post("/execute")]
pub async fn execute_kv(
    operator: Operator,
    body: web::Json<KvCommandRequest>,
    pools: web::Data<Arc<PoolRegistry>>,
    executor: web::Data<Arc<KvCommandExecutor>>,
) -> impl Responder {
    let req = body.into_inner();

    let class = match classify_kv_command(&req.command) {
        Ok(class) => class,
        Err(e) => return policy_rejection(e),
    };
    let decision = authorize_kv(operator.role, class, &req.command);
    if !decision.allowed {
        let reason = decision.reason.unwrap_or_else(|| "Denied by policy".into());
        warn!(
            "Denied cache command from {} ({}): {}",
            operator.user_id, operator.role, reason
        );
        let code = if class == KvCommandClass::Blocked {
            ErrorCode::BlockedCommand
        } else {
            ErrorCode::PermissionDenied
        };
        return HttpResponse::Forbidden().json(ErrorBody::new(code, reason));
    }

    // Raw mode re-checks the payload's own verb against the blocked list.
    let tokens = if class == KvCommandClass::Raw {
        match validate_raw_command(&req.args.join(" ")) {
            Ok(tokens) => tokens,
            Err(e) => return policy_rejection(e),
        }
    } else {
        if let Err(e) = validate_kv_args(&req.args) {
            return policy_rejection(e);
        }
        let mut tokens = vec![req.command.clone()];
        tokens.extend(req.args.iter().cloned());
        tokens
    };

    if let Some(cloud) = req.cloud.as_deref() {
        if pools.config().kv_cloud(cloud).is_none() {
            return HttpResponse::BadRequest().json(ErrorBody::new(
                ErrorCode::UnknownCloud,
                format!("Unknown KV cloud '{}'", cloud),
            ));
        }
    }

    let response = executor.execute(&req, &tokens).await;
    HttpResponse::Ok().json(response)
}

/// POST /api/redis/scan - launch an asynchronous cluster-wide scan.
#[post("/scan")]
pub async fn scan_start(
    operator: Operator,
    body: web::Json<ScanRequest>,
    pools: web::Data<Arc<PoolRegistry>>,
    store: web::Data<Arc<ExecutionStore>>,
    executor: web::Data<Arc<CacheScanExecutor>>,
) -> impl Responder {
    let req = body.into_inner();

    // Wildcard-only patterns never reach SCAN, regardless of role.
    if let Err(e) = validate_scan_pattern(&req.pattern) {
        return policy_rejection(e);
    }

    // Preview is a read; deleting what the scan finds is a write.
    let decision = match req.action {
        ScanAction::Preview => authorize_kv(operator.role, KvCommandClass::Read, "SCAN"),
        ScanAction::Delete => authorize_kv(operator.role, KvCommandClass::Write, "UNLINK"),
    };
    if !decision.allowed {
        let reason = decision.reason.unwrap_or_else(|| "Denied by policy".into());
        return HttpResponse::Forbidden().json(ErrorBody::new(ErrorCode::PermissionDenied, reason));
    }

    if let Some(cloud) = req.cloud.as_deref() {
        if pools.config().kv_cloud(cloud).is_none() {
            return HttpResponse::BadRequest().json(ErrorBody::new(
                ErrorCode::UnknownCloud,
                format!("Unknown KV cloud '{}'", cloud),
            ));
        }
    }

    let id = ExecutionId::new();
    if let Err(e) = store.init(&id, Some(operator.user_id.clone())).await {
        warn!("Failed to initialise scan record: {}", e);
        return HttpResponse::InternalServerError().json(ErrorBody::new(
            ErrorCode::InternalError,
            "Failed to initialise execution record",
        ));
    }

    info!(
        "Accepted scan {} from {} (pattern={:?}, action={:?})",
        id, operator.user_id, req.pattern, req.action
    );
    let executor = Arc::clone(executor.get_ref());
    tokio::spawn(executor.run(id.clone(), req));

    HttpResponse::Ok().json(AcceptedResponse {
        execution_id: id.to_string(),
    })
}

/// GET /api/redis/scan/{id} - poll a scan record.
#[get("/scan/{id}")]
pub async fn scan_status(
    _operator: Operator,
    path: web::Path<String>,
    store: web::Data<Arc<ExecutionStore>>,
) -> impl Responder {
    let id = ExecutionId::from(path.into_inner());
    match store.get(&id).await {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => {
            HttpResponse::NotFound().json(ErrorBody::new(ErrorCode::NotFound, "Scan not found"))
        }
        Err(e) => HttpResponse::InternalServerError()
            .json(ErrorBody::new(ErrorCode::InternalError, e.to_string())),
    }
}

/// POST /api/redis/scan/{id}/cancel - halt a scan at its next check.
#[post("/scan/{id}/cancel")]
pub async fn scan_cancel(
    operator: Operator,
    path: web::Path<String>,
    store: web::Data<Arc<ExecutionStore>>,
    executor: web::Data<Arc<CacheScanExecutor>>,
) -> impl Responder {
    let id = ExecutionId::from(path.into_inner());
    let record = match store.get(&id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ErrorBody::new(ErrorCode::NotFound, "Scan not found"))
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
            "Only MASTER may cancel another operator's scan",
        ));
    }

    if let Err(e) = executor.cancel(&id).await {
        return HttpResponse::InternalServerError()
            .json(ErrorBody::new(ErrorCode::InternalError, e.to_string()));
    }
    info!("Scan {} cancelled by {}", id, operator.user_id);
    HttpResponse::Ok().json(json!({ "success": true, "executionId": id.to_string() }))
}
