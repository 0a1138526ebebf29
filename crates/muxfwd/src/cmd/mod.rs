use std::net::SocketAddr;

use clap::{Args, Subcommand};
use muxfwd_tunnel::{Forward, ForwardEvent};
use tokio::sync::mpsc;
use tracing::info;

use crate::exit::{tunnel_exit_code, CliResult, SUCCESS};
use crate::output::{print_event, print_stats, OutputFormat};

pub mod daemon;
pub mod service;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the daemon side: accept local clients, multiplex them out.
    Daemon(DaemonArgs),
    /// Run the service side: dial the real target per forwarded stream.
    Service(ServiceArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Daemon(args) => daemon::run(args, format).await,
        Command::Service(args) => service::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Address to await the service's transport connection on.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:7070")]
    pub transport: SocketAddr,
    /// Local address to accept client connections on.
    #[arg(long, value_name = "ADDR")]
    pub listen: SocketAddr,
    /// Maximum concurrent streams; connections beyond it are refused.
    #[arg(long, default_value_t = 256)]
    pub max_streams: usize,
    /// Seconds to wait for open streams to drain on shutdown.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub drain_timeout: u64,
}

#[derive(Args, Debug)]
pub struct ServiceArgs {
    /// Transport address of the daemon to connect to.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:7070")]
    pub transport: SocketAddr,
    /// Target address to dial for each forwarded stream.
    #[arg(long, value_name = "ADDR")]
    pub target: SocketAddr,
    /// Seconds to wait for the daemon's REDY signal.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub ready_timeout: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Print forward events until the forward dies or the user interrupts.
pub(crate) async fn drive(
    forward: &Forward,
    mut events: mpsc::UnboundedReceiver<ForwardEvent>,
    format: OutputFormat,
) -> i32 {
    let mut code = SUCCESS;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; stopping forward");
                forward.stop().await;
                break;
            }
            event = events.recv() => match event {
                Some(event) => {
                    let fatal = match &event {
                        ForwardEvent::FatalError(err) => Some(tunnel_exit_code(err)),
                        _ => None,
                    };
                    print_event(&event, format);
                    if let Some(fatal_code) = fatal {
                        code = fatal_code;
                        break;
                    }
                }
                None => break,
            }
        }
    }

    // Flush whatever the shutdown produced before summarizing.
    while let Ok(event) = events.try_recv() {
        print_event(&event, format);
    }
    print_stats(&forward.stats(), format);
    code
}
