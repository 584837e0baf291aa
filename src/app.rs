use crate::cache::keys::InvalidationPlan;
use crate::cache::{CacheLayer, MemoryBackend};
use crate::config::Config;
use crate::data::facts::PgFactStore;
use crate::ingest::scheduler::Scheduler;
use crate::ingest::writer::RowContext;
use crate::ingest::{Orchestrator, PipelineConfig};
use crate::ogd::{OgdClient, RegionScope};
use crate::services::manager::ServiceManager;
use crate::services::scheduler::SchedulerService;
use crate::services::web::WebService;
use crate::state::{AppState, ServiceStatus};
use crate::utils::fmt_duration;
use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
    service_manager: ServiceManager,
}

impl App {
    /// Connect to the database, run migrations, and assemble the pipeline.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let slow_threshold = Duration::from_millis(500);

        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 4,
            acquire_timeout = "4s",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        let client = OgdClient::new(
            &config.ogd_base_url,
            &config.ogd_resource_id,
            config.ogd_api_key.clone(),
            config.ogd_request_timeout,
        )
        .context("Failed to create OGD client")?;

        let pipeline = PipelineConfig {
            periods: config.periods().context("Invalid INGEST_PERIODS")?,
            scope: RegionScope {
                state_name: config.ingest_state_name.clone(),
            },
            fetch: config.fetch_options(),
            rows: RowContext {
                default_state_code: config.ingest_state_code.clone(),
                source_url: client.endpoint().to_string(),
            },
            invalidation: InvalidationPlan::after_ingestion(&config.ingest_state_name),
        };
        info!(
            periods = ?pipeline.periods.iter().map(ToString::to_string).collect::<Vec<_>>(),
            state = %pipeline.scope.state_name,
            endpoint = %client.endpoint(),
            "Ingestion pipeline configured"
        );

        let cache = CacheLayer::new(Arc::new(MemoryBackend::new()), config.cache_ttls());
        let orchestrator = Orchestrator::new(
            Arc::new(client),
            Arc::new(PgFactStore::new(db_pool.clone())),
            cache,
            pipeline,
        );

        let app_state = AppState::new(db_pool, orchestrator, config.admin_api_key.clone());

        Ok(App {
            config,
            app_state,
            service_manager: ServiceManager::new(),
        })
    }

    /// Register the web service, and the scheduler when enabled.
    pub fn setup_services(&mut self) -> Result<(), anyhow::Error> {
        self.service_manager.register_service(Box::new(WebService::new(
            self.config.port,
            self.app_state.clone(),
        )));

        if self.config.enable_scheduler {
            let schedule = self
                .config
                .schedule()
                .context("Invalid CRON_SCHEDULE")?;
            let timezone = self
                .config
                .timezone()
                .map_err(|e| anyhow::anyhow!("Invalid SCHEDULE_TIMEZONE: {e}"))?;
            let scheduler = Scheduler::new(
                self.app_state.orchestrator.clone(),
                schedule,
                timezone,
                self.config.shutdown_timeout,
            );
            self.service_manager
                .register_service(Box::new(SchedulerService::new(
                    scheduler,
                    self.app_state.service_statuses.clone(),
                )));
        } else {
            info!("Scheduler disabled (set ENABLE_SCHEDULER=true to enable); manual trigger only");
            self.app_state
                .service_statuses
                .set("scheduler", ServiceStatus::Disabled);
        }

        if !self.service_manager.has_services() {
            error!("No services enabled. Cannot start application.");
            return Err(anyhow::anyhow!("No services enabled"));
        }
        Ok(())
    }

    /// Start all registered services
    pub fn start_services(&mut self) {
        self.service_manager.spawn_all();
    }

    /// Run the application and handle shutdown signals
    pub async fn run(self) -> ExitCode {
        use crate::services::signals::handle_shutdown_signals;
        handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await
    }
}
