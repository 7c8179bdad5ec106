//! Serve the demo function set on a Unix socket until Ctrl-C.
//!
//! Run with:
//!   cargo run --example echo-server --features peer
//!
//! In another terminal:
//!   cargo run --features cli -- call /tmp/relayrpc-echo-<pid>/echo.sock \
//!     echoReverse --args '["hello"]'

use std::fs;

use relayrpc::demo::demo_functions;
use relayrpc::peer::Server;
use relayrpc::transport::Endpoint;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("relayrpc-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let endpoint = Endpoint::Unix(sock_dir.join("echo.sock"));

    let server = Server::bind(&endpoint, demo_functions()).await?;
    eprintln!("Listening on {}", server.local_endpoint());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        }
    });
    server.serve(shutdown).await?;

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
