use sync::api::ApiClient;
use sync::config::get_configuration;
use sync::service::SyncService;
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration().expect("failed to load configuration");
    common::setup_logging(config.log_level.clone(), config.environment.clone());

    tracing::info!(
        ws_url = %config.ws_url,
        api = %config.api_base_url,
        "Dashboard sync starting"
    );

    let base = Url::parse(&config.api_base_url)?;
    let api = ApiClient::new(base)?;

    let (service, handle) = SyncService::build(config, api);

    // Kiosk session: the handle lives for the whole process so the view
    // layer can read state and issue commands until teardown.
    let _session = handle;
    service.run().await
}
