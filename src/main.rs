use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sunready_api::config::Config;
use sunready_api::db::Database;
use sunready_api::genability::{DisabledTariffLookup, GenabilityClient, TariffLookup};
use sunready_api::handlers::AppState;
use sunready_api::lead_service::{FixedHardwareSelector, LeadService};
use sunready_api::lightfusion::LightFusionClient;
use sunready_api::repo::{PgDirectory, PgHouseRepo, PgLeadRepo};
use sunready_api::{obs, router};

/// Main entry point for the application.
///
/// Loads configuration, connects to Postgres (running migrations), builds the
/// vendor and tariff clients, wires the lead service and serves HTTP.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let timeout = Duration::from_secs(config.gateway_timeout_secs);

    let mut lightfusion = LightFusionClient::new(
        config.lightfusion_base_url.clone(),
        config.lightfusion_asset_base_url.clone(),
        config.media_dir.clone(),
        timeout,
    )?;
    if let (Some(email), Some(password)) = (
        config.lightfusion_email.clone(),
        config.lightfusion_password.clone(),
    ) {
        lightfusion = lightfusion.with_credentials(email, password);
    }
    tracing::info!("LightFusion client initialized: {}", config.lightfusion_base_url);

    let tariffs: Arc<dyn TariffLookup> =
        match (config.genability_app_id.clone(), config.genability_app_key.clone()) {
            (Some(app_id), Some(app_key)) => {
                tracing::info!("Genability tariff lookup enabled");
                Arc::new(GenabilityClient::new(
                    &config.genability_base_url,
                    app_id,
                    app_key,
                    timeout,
                    Duration::from_secs(config.tariff_cache_ttl_secs),
                )?)
            }
            _ => Arc::new(DisabledTariffLookup),
        };

    let lead_service = LeadService::new(
        Arc::new(PgLeadRepo::new(db.pool.clone())),
        Arc::new(PgHouseRepo::new(db.pool.clone())),
        Arc::new(PgDirectory::new(db.pool.clone())),
        Arc::new(lightfusion),
        tariffs,
        Arc::new(FixedHardwareSelector {
            panel_id: config.default_panel_id,
            inverter_id: config.default_inverter_id,
        }),
    );

    let app_state = Arc::new(AppState {
        config: config.clone(),
        leads: Arc::new(lead_service),
    });

    let app = router::build_router(app_state, true)?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
