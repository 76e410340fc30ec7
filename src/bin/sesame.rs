use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let action = sesame::cli::start()?;
    action.execute().await
}
