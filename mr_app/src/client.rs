use clap::Parser;
use mr::config::WorkerArgs;
use mr::worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mr::telemetry::init("mr=info,client=info");
    let args = WorkerArgs::parse();

    let app = mr::apps::named(&args.app)?;
    let client = mr::rpc::connect(&args.endpoint.endpoint()).await?;
    let worker = Worker::new(client, app.map_fn, app.reduce_fn, args.worker_settings());
    tracing::info!("worker started, running {}", app.name);
    worker.run().await
}
