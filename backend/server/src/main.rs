#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ranking::start_server().await
}
