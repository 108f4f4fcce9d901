// Stratus Server
//
// Multi-cloud query control plane: fans out operator SQL batches and
// cache commands across independently managed clusters.

mod config;
mod logging;
mod middleware;
mod operators;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use log::info;
use stratus_api::auth::{BcryptVerifier, PasswordVerifier};
use stratus_api::routes;
use stratus_commons::{CloudConfig, EnvSettings};
use stratus_exec::{CacheScanExecutor, KvCommandExecutor, SqlFanoutExecutor};
use stratus_pools::PoolRegistry;
use stratus_store::{ActiveClientRegistry, ExecutionStore};

use crate::operators::FilePasswordSource;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match config::ServerConfig::from_file("stratus.toml") {
        Ok(cfg) => cfg,
        Err(_) => {
            eprintln!("Warning: stratus.toml not found, using defaults");
            config::ServerConfig::default()
        }
    };

    // Initialize logging
    logging::init_logging(
        &config.logging.level,
        &config.logging.file_path,
        config.logging.log_to_console,
    )?;

    info!("Starting Stratus Server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: host={}, port={}",
        config.server.host, config.server.port
    );

    // Cloud topology (fatal if invalid)
    let clouds = Arc::new(CloudConfig::from_file(&config.clouds.file)?);
    info!(
        "Cloud topology loaded from {}: primary='{}', {} secondary, {} kv",
        config.clouds.file,
        clouds.primary.cloud_name,
        clouds.secondary.len(),
        clouds.kv.len()
    );

    // Environment contract
    let env = EnvSettings::from_env();
    info!(
        "Environment: redis={}:{} cluster_mode={} execution_ttl={}s statement_timeout={}ms",
        env.redis_host,
        env.redis_port,
        env.redis_cluster_mode,
        env.execution_ttl_seconds,
        env.statement_timeout_ms
    );

    // Pool registry
    let pools = Arc::new(PoolRegistry::new(Arc::clone(&clouds)));
    info!("Pool registry initialized");

    // Execution store (+ in-memory sweeper in local dev)
    let store = Arc::new(ExecutionStore::from_env(&env)?);
    store.start_sweeper();

    // Per-replica active-client registry
    let active = Arc::new(ActiveClientRegistry::new());

    // Executors
    let sql_executor = Arc::new(SqlFanoutExecutor::new(
        Arc::clone(&pools),
        Arc::clone(&store),
        Arc::clone(&active),
        &env,
    ));
    let scan_executor = Arc::new(CacheScanExecutor::new(
        Arc::clone(&pools),
        Arc::clone(&store),
    ));
    let kv_executor = Arc::new(KvCommandExecutor::new(Arc::clone(&pools)));
    info!("Executors initialized");

    // Password re-auth source (external user subsystem export)
    let hash_source = match config.auth.operators_file.as_deref() {
        Some(path) => Arc::new(FilePasswordSource::load(path)?),
        None => {
            info!("No operators file configured; dangerous-verb re-auth will always fail");
            Arc::new(FilePasswordSource::empty())
        }
    };
    let verifier: Arc<dyn PasswordVerifier> = Arc::new(BcryptVerifier::new(hash_source));

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting HTTP server on {}", bind_addr);

    let workers = if config.server.workers == 0 {
        num_cpus::get()
    } else {
        config.server.workers
    };

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::request_logger())
            .wrap(middleware::build_cors())
            .app_data(web::Data::new(Arc::clone(&pools)))
            .app_data(web::Data::new(Arc::clone(&store)))
            .app_data(web::Data::new(Arc::clone(&active)))
            .app_data(web::Data::new(Arc::clone(&sql_executor)))
            .app_data(web::Data::new(Arc::clone(&scan_executor)))
            .app_data(web::Data::new(Arc::clone(&kv_executor)))
            .app_data(web::Data::new(Arc::clone(&verifier)))
            .configure(routes::configure_routes)
    })
    .bind(&bind_addr)?
    .workers(workers)
    .run()
    .await?;

    info!("Server shutdown complete");
    Ok(())
}
