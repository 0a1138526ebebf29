use std::time::Duration;

use muxfwd_tunnel::{Forward, ForwardConfig, Role};
use tokio::net::TcpListener;
use tracing::info;

use crate::cmd::{drive, DaemonArgs};
use crate::exit::{io_error, tunnel_error, CliResult};
use crate::output::OutputFormat;

pub async fn run(args: DaemonArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = TcpListener::bind(args.transport)
        .await
        .map_err(|err| io_error("transport bind failed", err))?;
    info!(addr = %args.transport, "waiting for the service to connect");
    let (transport, peer) = listener
        .accept()
        .await
        .map_err(|err| io_error("transport accept failed", err))?;
    info!(%peer, "transport connected");

    let config = ForwardConfig {
        max_streams: args.max_streams,
        drain_timeout: Duration::from_secs(args.drain_timeout),
        ..ForwardConfig::default()
    };
    let (forward, events) = Forward::new(
        Role::Daemon {
            listen: args.listen,
        },
        config,
    );
    forward
        .start(transport)
        .map_err(|err| tunnel_error("forward start failed", err))?;

    Ok(drive(&forward, events, format).await)
}
