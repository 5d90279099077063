use anyhow::Context;
use tokio::net::TcpListener;

use waitlist::configuration::get_configuration;
use waitlist::startup::{get_app_state, router, run};
use waitlist::telemetry::{get_subscriber, initialize_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("waitlist".into(), "info".into(), std::io::stdout);
    initialize_subscriber(subscriber);

    let configuration = get_configuration().context("Failed to read configuration")?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    let app_state = get_app_state(&configuration)?;
    let app = router(app_state, &configuration.application)?;

    tracing::info!(
        data_file = %configuration.storage.data_file.display(),
        "Waitlist API listening on http://{}",
        listener.local_addr()?
    );
    run(listener, app).await?;

    Ok(())
}
