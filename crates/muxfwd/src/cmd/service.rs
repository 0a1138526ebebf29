use std::time::Duration;

use muxfwd_tunnel::{Forward, ForwardConfig, Role};
use tokio::net::TcpStream;
use tracing::info;

use crate::cmd::{drive, ServiceArgs};
use crate::exit::{io_error, tunnel_error, CliResult};
use crate::output::OutputFormat;

pub async fn run(args: ServiceArgs, format: OutputFormat) -> CliResult<i32> {
    let transport = TcpStream::connect(args.transport)
        .await
        .map_err(|err| io_error("transport connect failed", err))?;
    info!(addr = %args.transport, target = %args.target, "transport connected");

    let config = ForwardConfig {
        ready_timeout: Duration::from_secs(args.ready_timeout),
        ..ForwardConfig::default()
    };
    let (forward, events) = Forward::new(
        Role::Service {
            target: args.target,
        },
        config,
    );
    forward
        .start(transport)
        .map_err(|err| tunnel_error("forward start failed", err))?;

    Ok(drive(&forward, events, format).await)
}
