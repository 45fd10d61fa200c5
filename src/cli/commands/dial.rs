//! Dial command - reach a target through a peer proxy
//!
//! Works like `ssh -W`: the connection to the target is bridged to
//! stdin/stdout, so it can serve as a `ProxyCommand`.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::cli::args::DialArgs;
use crate::config::load_config_or_default;
use crate::net::{Addr, Conn};
use crate::site::PeerDialer;
use crate::tunnel::{SshTunnelDialer, TunnelConnection};

/// Execute the dial command
pub async fn execute(args: DialArgs, config_path: Option<&Path>) -> Result<()> {
    let config_file =
        load_config_or_default(config_path).context("Failed to load configuration")?;
    let config = config_file
        .config
        .expand()
        .context("Invalid configuration")?;

    let tunnel_dialer = SshTunnelDialer::new(&config.ssh_tunnel_config())
        .context("Failed to set up SSH transport")?;
    let conn_info = TunnelConnection::new(
        format!("{}.{}", args.proxy_addr, args.cluster),
        args.cluster.as_str(),
        args.proxy_addr.as_str(),
        Utc::now(),
    );
    let dialer = PeerDialer::new(
        Arc::new(conn_info),
        Arc::new(tunnel_dialer),
        config.site_settings().dial_timeout,
    );

    let from = Addr::tcp(args.from.as_str());
    let to = Addr::new(args.network.as_str(), args.target.as_str());
    let conn = dialer
        .dial(&from, &to)
        .await
        .with_context(|| format!("Failed to dial {} through {}", to, args.proxy_addr))?;
    info!(to = %to, peer = %args.proxy_addr, "Connected");

    bridge(conn, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Copy `input` to `conn` and `conn` to `output` until the target hangs up
///
/// The target closing ends the bridge even while `input` is still open;
/// `input` reaching EOF only half-closes the connection.
async fn bridge<I, O>(conn: Conn, mut input: I, mut output: O) -> Result<()>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(conn);

    let upload = async {
        tokio::io::copy(&mut input, &mut writer).await?;
        writer.shutdown().await
    };
    let download = async {
        tokio::io::copy(&mut reader, &mut output).await?;
        output.flush().await
    };
    tokio::pin!(upload);
    tokio::pin!(download);

    tokio::select! {
        result = &mut download => result.context("Failed to copy from target")?,
        result = &mut upload => {
            result.context("Failed to copy to target")?;
            (&mut download).await.context("Failed to copy from target")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn conn(stream: tokio::io::DuplexStream) -> Conn {
        Conn::new(Box::new(stream), Addr::tcp("127.0.0.1:0"), Addr::tcp("10.0.0.5:22"))
    }

    #[tokio::test]
    async fn test_target_hangup_ends_bridge_with_input_open() {
        let (near, mut target) = tokio::io::duplex(64);
        // Input that never yields data or EOF, like an idle terminal
        let (input, _input_writer) = tokio::io::duplex(64);
        let (output, mut output_reader) = tokio::io::duplex(64);

        target.write_all(b"bye").await.unwrap();
        drop(target);

        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            bridge(conn(near), input, output),
        )
        .await
        .expect("bridge should end when the target hangs up")
        .unwrap();

        let mut received = Vec::new();
        output_reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
    }

    #[tokio::test]
    async fn test_input_eof_half_closes() {
        let (near, mut target) = tokio::io::duplex(64);
        let (input, mut input_writer) = tokio::io::duplex(64);
        let (output, mut output_reader) = tokio::io::duplex(64);

        let bridged = tokio::spawn(bridge(conn(near), input, output));

        input_writer.write_all(b"ping").await.unwrap();
        drop(input_writer);

        let mut sent = Vec::new();
        target.read_to_end(&mut sent).await.unwrap();
        assert_eq!(sent, b"ping");

        target.write_all(b"pong").await.unwrap();
        drop(target);
        bridged.await.unwrap().unwrap();

        let mut received = Vec::new();
        output_reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"pong");
    }
}
