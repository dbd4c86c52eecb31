#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    presentation::cli::main_entry().await?;
    Ok(())
}
