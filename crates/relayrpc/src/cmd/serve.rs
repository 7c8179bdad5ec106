use relayrpc::demo::demo_functions;
use relayrpc_peer::{ConnectionConfig, HandshakeConfig, Mode, Server};
use relayrpc_transport::Endpoint;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{peer_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_listening, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint: Endpoint = args
        .endpoint
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))?;
    if args.serialization.is_empty() {
        return Err(CliError::new(USAGE, "at least one serialization is required"));
    }

    let modes: &[Mode] = if args.persistent_only {
        &[Mode::Persistent]
    } else {
        &[Mode::Persistent, Mode::SingleShot]
    };
    let handshake = HandshakeConfig::default()
        .with_timeout(parse_duration(&args.handshake_timeout)?)
        .with_accepted_modes(modes)
        .with_accepted_serializations(&args.serialization);
    let functions = demo_functions();
    let config = ConnectionConfig::default()
        .with_handshake(handshake)
        .with_functions(functions.clone());

    let server = Server::bind(&endpoint, functions.clone())
        .await
        .map_err(|err| peer_error("bind failed", err))?
        .with_config(config);
    let local = server.local_endpoint().to_string();
    print_listening(&local, functions.names(), format);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received; shutting down");
                    shutdown.cancel();
                }
                Err(err) => warn!(error = %err, "signal handler setup failed"),
            }
        }
    });

    server
        .serve(shutdown)
        .await
        .map_err(|err| peer_error("serve failed", err))?;
    Ok(SUCCESS)
}
