use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use hush_crypto::Identity;
use hush_session::config::default_settings_path;
use hush_session::{connect_tcp, ClientSettings, Session, SessionEvent};

mod input;

use crate::input::{Input, HELP};

#[derive(Parser, Debug)]
#[command(name = "hush", version, about = "End-to-end encrypted group chat client", long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to a relay and chat
    Connect {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Name announced to other peers
        #[arg(short, long)]
        username: Option<String>,
        /// RSA modulus size for both key pairs
        #[arg(long)]
        bits: Option<usize>,
    },
    /// Generate a throwaway identity and print its public keys
    Keygen {
        #[arg(default_value = "anonymous")]
        name: String,
        #[arg(long)]
        bits: Option<usize>,
    },
    /// Write a settings file with default values
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = ClientSettings::load(cli.config.as_deref())?;
    setup_logging(&settings.log_filter);

    match cli.command {
        Commands::Connect {
            host,
            port,
            username,
            bits,
        } => {
            if let Some(host) = host {
                settings.relay.host = host;
            }
            if let Some(port) = port {
                settings.relay.port = port;
            }
            if let Some(bits) = bits {
                settings.rsa_bits = bits;
            }
            settings.username = username.or(settings.username);
            settings.validate()?;
            connect_command(settings).await
        }
        Commands::Keygen { name, bits } => {
            keygen_command(name, bits.unwrap_or(settings.rsa_bits)).await
        }
        Commands::InitConfig { force } => init_config_command(cli.config, force),
    }
}

async fn generate_identity(name: String, bits: usize) -> Result<Identity> {
    info!(name = %name, bits, "generating identity keys");
    tokio::select! {
        id = Identity::generate_async(name, bits) => Ok(id?),
        _ = signal::ctrl_c() => bail!("key generation cancelled"),
    }
}

async fn keygen_command(name: String, bits: usize) -> Result<()> {
    let identity = generate_identity(name, bits).await?;
    println!("name:        {}", identity.display_name());
    println!("fingerprint: {}", identity.fingerprint()?);
    println!("\n# encryption key\n{}", identity.encryption_key().to_pem()?);
    println!("# signing key\n{}", identity.verification_key().to_pem()?);
    Ok(())
}

fn init_config_command(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => default_settings_path()?,
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ClientSettings::default().save(&path)?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn prompt_username() -> Result<String> {
    println!("username:");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading username")?;
    let name = line.trim();
    if name.is_empty() {
        bail!("a username is required");
    }
    Ok(name.to_string())
}

async fn connect_command(settings: ClientSettings) -> Result<()> {
    let username = match settings.username.clone() {
        Some(u) => u,
        None => prompt_username().await?,
    };
    let identity = Arc::new(generate_identity(username, settings.rsa_bits).await?);
    println!("you are {} ({})", identity.display_name(), identity.fingerprint()?);

    let addr = settings.relay_addr();
    let (sink, mut source) = connect_tcp(&addr)
        .await
        .with_context(|| format!("connecting to relay {addr}"))?;
    info!(relay = %addr, "connected");

    let session = Arc::new(Session::new(identity, sink));
    session.hello().await?;
    session.request_directory().await?;

    let (tx, mut events) = mpsc::channel(64);
    let inbound = {
        let session = session.clone();
        tokio::spawn(async move { session.run_inbound(&mut source, tx).await })
    };

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match input::parse(&line) {
                    Ok(Input::Quit) => break,
                    Ok(cmd) => {
                        if let Err(e) = run_input(&session, cmd).await {
                            println!("! {e}");
                        }
                    }
                    Err(usage) => println!("! {usage}"),
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    println!("! relay closed the connection");
                    break;
                };
                print_event(&event);
            }
            _ = signal::ctrl_c() => break,
        }
    }

    inbound.abort();
    match inbound.await {
        Ok(Err(e)) => warn!(error = %e, "inbound stream failed"),
        Err(e) if !e.is_cancelled() => return Err(anyhow!("inbound task panicked: {e}")),
        _ => {}
    }
    debug!("session closed");
    Ok(())
}

async fn run_input(session: &Session, cmd: Input) -> Result<()> {
    match cmd {
        Input::Refresh => session.request_directory().await?,
        Input::Peers => {
            let dir = session.directory();
            if dir.is_empty() {
                println!("no peers known yet, try /list");
            }
            for id in dir.peer_ids() {
                if let Some(peer) = dir.lookup(&id) {
                    let server = peer.server.as_deref().unwrap_or("-");
                    let verifiable = if peer.verification_key.is_some() { "" } else { " (unverified)" };
                    println!("  {id:<16} {server:<22} {}{verifiable}", peer.fingerprint);
                }
            }
        }
        Input::WhoAmI => {
            let id = session.identity();
            println!("{} {}", id.display_name(), id.fingerprint()?);
        }
        Input::Private {
            recipients,
            message,
        } => {
            let counter = session.send_chat(&recipients, &message).await?;
            debug!(counter, "private message sent");
        }
        Input::Public { message } => {
            session.send_public(&message).await?;
        }
        Input::Help => println!("{HELP}"),
        Input::Quit | Input::Empty => {}
    }
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::PeerAnnounced {
            peer_id,
            fingerprint,
            previous_fingerprint,
            at,
        } => {
            let at = at.format("%H:%M:%S");
            match previous_fingerprint {
                Some(old) => println!("[{at}] !! key changed for {peer_id}: {old} -> {fingerprint}"),
                None => println!("[{at}] * {peer_id} is here ({fingerprint})"),
            }
        }
        SessionEvent::DirectoryUpdated { peers, rejected, at } => {
            println!("[{}] * online: {}", at.format("%H:%M:%S"), peers.join(", "));
            for r in rejected {
                println!("  ! {r}");
            }
        }
        SessionEvent::DirectoryRequested { .. } => {}
        SessionEvent::Chat {
            from,
            participants,
            message,
            at,
            ..
        } => println!(
            "[{}] {from} -> {}: {message}",
            at.format("%H:%M:%S"),
            participants[1..].join(", ")
        ),
        SessionEvent::PublicChat { from, message, at, .. } => {
            println!("[{}] {from} (public): {message}", at.format("%H:%M:%S"))
        }
        SessionEvent::Rejected {
            reason,
            tampering,
            at,
        } => {
            if *tampering {
                println!("[{}] !! possible tampering: {reason}", at.format("%H:%M:%S"));
            } else {
                debug!(%reason, "frame dropped");
            }
        }
    }
}
