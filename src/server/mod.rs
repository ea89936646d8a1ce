use crate::{
    audit::AuditService,
    auth::{
        AuthorizationGuard, JwtIssuer, TokenIssuer, TokenService,
        middleware::{
            api_rate_limit, auth_rate_limit, authenticate, require_admin, sensitive_rate_limit,
        },
        parse_algorithm,
    },
    config::Config,
    database::{DatabaseManager, DatabaseManagerImpl},
    error::AuthError,
    health::HealthService,
    jobs::{AuditRetentionJob, Job, JobScheduler, RateLimitSweepJob, TokenCleanupJob},
    rate_limit::RateLimitService,
    routes::{
        create_admin_audit_routes, create_auth_routes, create_health_routes,
        create_maintenance_routes, create_session_routes,
    },
    shutdown::ShutdownCoordinator,
};
use axum::{Router, extract::DefaultBodyLimit, middleware};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// Auth payloads are small; anything larger is not a legitimate request.
const MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub database: Arc<dyn DatabaseManager>,
    pub issuer: Arc<dyn TokenIssuer>,
    pub token_service: Arc<TokenService>,
    pub rate_limiter: Arc<RateLimitService>,
    pub guard: Arc<AuthorizationGuard>,
    pub audit: Arc<AuditService>,
    pub health_service: Arc<HealthService>,
    pub shutdown_coordinator: Arc<ShutdownCoordinator>,
    pub job_scheduler: Arc<RwLock<JobScheduler>>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AuthError> {
        // Boot gate: constructing the issuer runs the secret strength
        // validator and fails hard on a weak secret.
        let algorithm = parse_algorithm(&config.jwt.algorithm)?;
        let jwt_issuer = JwtIssuer::new(
            &config.jwt.secret,
            algorithm,
            config.jwt.access_token_ttl_secs,
        )?;
        info!(
            score = jwt_issuer.validation_report().score,
            strength = jwt_issuer.validation_report().strength.as_str(),
            "Signing secret accepted"
        );
        let issuer: Arc<dyn TokenIssuer> = Arc::new(jwt_issuer.clone());

        let database_impl = Arc::new(DatabaseManagerImpl::new_from_config(&config.database).await?);
        let database: Arc<dyn DatabaseManager> = database_impl.clone();

        let audit = Arc::new(AuditService::new(
            database.clone(),
            config.audit.retention_days,
        ));
        let token_service = Arc::new(TokenService::new(
            database.clone(),
            issuer.clone(),
            audit.clone(),
            config.jwt.refresh_token_ttl_days,
        ));
        let rate_limiter = Arc::new(RateLimitService::new(config.rate_limit.clone()));
        let guard = Arc::new(AuthorizationGuard::new(database.clone(), audit.clone()));

        let health_service = Arc::new(HealthService::new());
        health_service.register(database_impl).await;
        health_service.register(jwt_issuer.health_checker()).await;

        let shutdown_coordinator = Arc::new(ShutdownCoordinator::new());
        let job_scheduler = Arc::new(RwLock::new(JobScheduler::with_shutdown_coordinator(
            config.jobs.clone(),
            shutdown_coordinator.subscribe(),
        )));

        Ok(Self {
            config: Arc::new(config),
            database,
            issuer,
            token_service,
            rate_limiter,
            guard,
            audit,
            health_service,
            shutdown_coordinator,
            job_scheduler,
        })
    }

    /// Assemble the router. Policies stack in fixed order on every
    /// protected surface: rate limit, then authentication, then
    /// authorization; auditing happens inside the services.
    pub fn build_router(&self) -> Router {
        let auth_routes = create_auth_routes().layer(middleware::from_fn_with_state(
            self.clone(),
            auth_rate_limit,
        ));

        let session_routes = create_session_routes()
            .layer(middleware::from_fn_with_state(self.clone(), authenticate))
            .layer(middleware::from_fn_with_state(self.clone(), api_rate_limit));

        let admin_routes = create_admin_audit_routes()
            .merge(create_maintenance_routes())
            .layer(middleware::from_fn_with_state(self.clone(), require_admin))
            .layer(middleware::from_fn_with_state(self.clone(), authenticate))
            .layer(middleware::from_fn_with_state(
                self.clone(),
                sensitive_rate_limit,
            ));

        Router::new()
            .merge(create_health_routes())
            .merge(auth_routes)
            .merge(session_routes)
            .merge(admin_routes)
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .with_state(self.clone())
    }

    pub async fn run(&self) -> Result<(), AuthError> {
        self.database.migrate().await?;

        let jobs: Vec<Arc<dyn Job>> = vec![
            Arc::new(TokenCleanupJob::new(self.database.clone())),
            Arc::new(AuditRetentionJob::new(self.audit.clone())),
            Arc::new(RateLimitSweepJob::new(self.rate_limiter.clone())),
        ];
        self.job_scheduler.write().await.start(jobs).await?;

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::Internal(format!("Failed to bind {addr}: {e}")))?;
        info!("WordVault auth service listening on {}", addr);

        let app = self
            .build_router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let coordinator = self.shutdown_coordinator.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                coordinator.wait_for_shutdown().await;
            })
            .await
            .map_err(|e| AuthError::Internal(format!("Server error: {e}")))?;

        self.job_scheduler.write().await.stop().await;
        info!("Server stopped");

        Ok(())
    }
}
