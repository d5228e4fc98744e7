use env::Env;
use eyre::Context;
use log::info;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let env = Env::load()?;
    pretty_env_logger::formatted_builder()
        .parse_filters(env.rust_log())
        .init();
    color_eyre::install()?;

    info!("connecting to mongo");
    let storage = storage::Storage::new(env.mongo_url(), env.mongo_db())
        .await
        .context("Failed to create storage")?;
    info!("creating ledger");
    let ledger = ledger::Ledger::new(storage);

    info!("Starting background jobs...");
    let mut sched = bg_process::start(ledger)
        .await
        .context("Failed to start scheduler")?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    sched.shutdown().await?;
    Ok(())
}
