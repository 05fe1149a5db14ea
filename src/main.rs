use anyhow::Context;
use ems_risk::{config::Config, pipeline::Pipeline};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use validator::Validate;

fn init_tracing(json: bool, default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ems_risk={}", default_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_tracing(config.observability.json_logs, &config.observability.log_level);

    tracing::info!("Starting EMS risk pipeline v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        input = %config.pipeline.input_path.display(),
        output = %config.pipeline.output_dir.display(),
        model = %config.llm.model,
        "Configuration loaded"
    );

    let pipeline = Pipeline::from_config(&config).context("failed to build pipeline")?;
    let report = pipeline.run().await.context("pipeline run failed")?;

    println!("{}", report);
    Ok(())
}
