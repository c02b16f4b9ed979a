use clap::Parser;
use mr::config::CoordinatorArgs;
use mr::coordinator::Coordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mr::telemetry::init("mr=info,server=info");
    let args = CoordinatorArgs::parse();

    let coordinator = Coordinator::new(args.files.clone(), args.n_reduce, args.task_timeout())?;
    let endpoint = args.endpoint.endpoint();
    tracing::info!(
        "coordinating {} splits into {} partitions on {}",
        args.files.len(),
        args.n_reduce,
        endpoint
    );
    mr::coordinator::run(coordinator, endpoint, args.serve_settings()).await
}
