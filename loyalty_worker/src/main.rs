use dotenvy::dotenv;
use log::{error, info};
use loyalty_worker::{config::WorkerConfig, service::run_worker};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = WorkerConfig::from_env_or_default();
    info!("🚀️ Starting the loyalty reconciliation worker");
    match run_worker(config).await {
        Ok(()) => println!("Bye!"),
        Err(e) => {
            error!("🚀️ The reconciliation worker could not start. {e}");
            eprintln!("{e}");
        },
    }
}
