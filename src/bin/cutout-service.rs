//! Cutout service binary
//!
//! Serves `POST /cutout` and friends; see `cutout-service --help`.

#[cfg(feature = "cli")]
use cutout_service::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
