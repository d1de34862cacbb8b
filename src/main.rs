#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    runtime_cli::run().await
}
