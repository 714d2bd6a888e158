use std::sync::Arc;

use tgrelay_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), tgrelay_core::Error> {
    tgrelay_core::logging::init("tgrelay")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        annotate = cfg.annotate,
        rate_limit = cfg.rate_limit_enabled,
        "starting message relay"
    );

    tgrelay_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| tgrelay_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
