use anyhow::Result;

use album_daemon::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = telemetry::init("album-daemon")?;
    album_daemon::server::run().await
}
