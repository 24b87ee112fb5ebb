#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = early_warning::run().await {
        eprintln!("early-warning fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
