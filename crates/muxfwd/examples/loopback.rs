//! Loopback demo — daemon and service in one process over an in-memory pipe.
//!
//! Run with:
//!   cargo run --example loopback

use muxfwd::tunnel::{Forward, ForwardConfig, Role};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A local echo server stands in for the real target.
    let target_listener = TcpListener::bind("127.0.0.1:0").await?;
    let target = target_listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = target_listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    let (daemon_end, service_end) = tokio::io::duplex(64 * 1024);
    let (daemon, _daemon_events) = Forward::new(
        Role::Daemon {
            listen: "127.0.0.1:0".parse()?,
        },
        ForwardConfig::default(),
    );
    let (service, _service_events) =
        Forward::new(Role::Service { target }, ForwardConfig::default());

    daemon.start(daemon_end)?;
    service.start(service_end)?;
    daemon.wait_ready().await?;

    let addr = daemon.local_addr().expect("listener should be bound");
    eprintln!("tunnel is up; client entry point at {addr}");

    let mut client = TcpStream::connect(addr).await?;
    client.write_all(b"round and round").await?;
    let mut buf = [0u8; 15];
    client.read_exact(&mut buf).await?;
    eprintln!("echoed through the tunnel: {}", String::from_utf8_lossy(&buf));

    drop(client);
    daemon.stop().await;
    Ok(())
}
