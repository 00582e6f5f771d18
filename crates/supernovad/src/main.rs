//! supernovad - Supernova node daemon

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    supernovad::run().await
}
