//! supernova-certsvc - Nebula certificate issuance and renewal

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    supernova_certsvc::cli::run().await
}
