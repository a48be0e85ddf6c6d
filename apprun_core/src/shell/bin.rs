// Binary entry point for apprun
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = apprun_core::shell::run().await {
        eprintln!("apprun fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
