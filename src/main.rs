//! relay-tunnel CLI - answers a bridge session request and prints the
//! peer's JSON-RPC traffic.
//!
//! See the `relay_tunnel` library for the protocol implementation.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_tunnel::config::Config;
use relay_tunnel::registry::WALLET_CONNECT;
use relay_tunnel::rpc::ClientInfo;
use relay_tunnel::{
    persistence, ConnectionDescriptor, ErrorKind, Registry, Tunnel, TunnelParams, WsTransport,
};

#[derive(Parser)]
#[command(name = "relay-tunnel")]
#[command(version)]
#[command(about = "Encrypted JSON-RPC tunnel over a publish/subscribe bridge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a connection URI and print its routing fields
    Inspect {
        /// Connection URI (wc:...)
        uri: String,
    },
    /// Answer the session request behind a connection URI
    Connect {
        /// Connection URI (wc:...)
        #[arg(long)]
        uri: String,
        /// Account exposed to the peer
        #[arg(long)]
        account: String,
        /// Wallet name shown to the peer
        #[arg(long, default_value = "relay-tunnel")]
        name: String,
        /// Wallet description shown to the peer
        #[arg(long, default_value = "")]
        description: String,
        /// Wallet home page
        #[arg(long, default_value = "")]
        url: String,
        /// Chain announced in the handshake reply
        #[arg(long, default_value_t = 1)]
        chain_id: i64,
        /// Ask on stdin before approving the session
        #[arg(long)]
        confirm: bool,
    },
    /// Reattach to the saved session
    Resume,
    /// Delete the saved session
    Forget,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { uri } => inspect(&uri),
        Commands::Connect {
            uri,
            account,
            name,
            description,
            url,
            chain_id,
            confirm,
        } => {
            let params = TunnelParams {
                uri,
                account,
                client_info: ClientInfo {
                    description,
                    url,
                    icons: Vec::new(),
                    name,
                },
                chain_id,
            };
            connect(params, confirm)
        }
        Commands::Resume => resume(),
        Commands::Forget => forget(),
    }
}

fn inspect(uri: &str) -> Result<()> {
    let descriptor = ConnectionDescriptor::parse(uri)?;
    println!("topic:   {}", descriptor.topic);
    println!("version: {}", descriptor.version);
    println!("bridge:  {}", descriptor.bridge);
    println!("key:     {} bytes", descriptor.key.len());
    Ok(())
}

fn connect(params: TunnelParams, confirm: bool) -> Result<()> {
    let config = Config::load()?;
    let mut tunnel_config = config.tunnel_config();
    if confirm {
        tunnel_config = tunnel_config.with_approver(prompt_approval);
    }

    let registry = Registry::with_defaults(tunnel_config);
    let mut tunnel = registry.new_tunnel(WALLET_CONNECT, &params.to_params()?)?;
    let mut transport = WsTransport::connect(tunnel.bridge())?;

    tunnel.connect(&mut transport)?;
    if tunnel.peer_id().is_none() {
        println!("Session rejected.");
        return Ok(());
    }
    println!("Session established. Waiting for requests...");

    save(tunnel.as_ref(), &config.context_file)?;
    pump(tunnel.as_mut(), &mut transport, &config.context_file)
}

fn resume() -> Result<()> {
    let config = Config::load()?;
    let saved = persistence::read_context(&config.context_file)?
        .context("No saved session; run `relay-tunnel connect` first")?;

    let registry = Registry::with_defaults(config.tunnel_config());
    let mut tunnel = registry.from_context(&saved.provider, &saved.context)?;
    let mut transport = WsTransport::connect(tunnel.bridge())?;

    tunnel.resubscribe(&mut transport)?;
    println!("Session resumed. Waiting for requests...");
    pump(tunnel.as_mut(), &mut transport, &config.context_file)
}

fn forget() -> Result<()> {
    let config = Config::load()?;
    if persistence::delete_context(&config.context_file)? {
        println!("Saved session deleted.");
    } else {
        println!("No saved session.");
    }
    Ok(())
}

/// Prints application messages until the peer ends the session.
fn pump(tunnel: &mut dyn Tunnel, transport: &mut WsTransport, context_file: &Path) -> Result<()> {
    loop {
        match tunnel.recv(transport) {
            Ok(message) => {
                println!("{}", String::from_utf8_lossy(&message));
                // Session updates may have changed chain or accounts.
                save(tunnel, context_file)?;
            }
            Err(e) if e.kind() == ErrorKind::PeerDisconnected => {
                println!("{e}");
                persistence::delete_context(context_file)?;
                break;
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::Authentication | ErrorKind::Format | ErrorKind::Protocol
                ) =>
            {
                log::warn!("Dropping inbound frame: {e}");
            }
            Err(e) => {
                save(tunnel, context_file)?;
                return Err(e).context("Tunnel receive failed");
            }
        }
    }

    if let Err(e) = transport.close() {
        log::debug!("{e:#}");
    }
    Ok(())
}

fn save(tunnel: &dyn Tunnel, context_file: &Path) -> Result<()> {
    persistence::write_context(context_file, WALLET_CONNECT, &tunnel.context()?)
}

fn prompt_approval(request: &[u8]) -> bool {
    eprintln!("Session request: {}", String::from_utf8_lossy(request));
    eprint!("Approve? [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}
