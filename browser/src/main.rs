use browser::config::{Settings, SettingsFavorites};
use browser::discovery::Discovery;
use browser::driver::{self, Shutdown};
use browser::favorites::FavoriteServerList;
use browser::lan::LanServerList;
use browser::transport::{Inbound, UdpTransport};
use browser::wan::{HttpDirectory, WanServerList};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (created on first favorite change)
    #[arg(short = 'c', long, default_value = "browser.toml")]
    config: PathBuf,

    /// Default game server port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Local address for the discovery socket
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Directory URL for the internet list
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// Scheduler tick in milliseconds
    #[arg(short = 't', long)]
    tick_ms: Option<u64>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    run_for_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll servers listed by the directory
    Wan,
    /// Discover servers on the local network
    Lan,
    /// Poll or edit favorite servers
    Favorites {
        #[command(subcommand)]
        action: Option<FavoriteAction>,
    },
}

#[derive(Subcommand, Debug)]
enum FavoriteAction {
    Add { address: String },
    Remove { address: String },
    Clear,
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut settings = Settings::load(&args.config)?;
    if let Some(port) = args.port {
        settings.network.port = port;
    }
    if let Some(bind) = args.bind {
        settings.network.bind = bind;
    }
    if let Some(url) = args.url {
        settings.network.url_servers = url;
    }
    if let Some(tick_ms) = args.tick_ms {
        settings.polling.tick_ms = tick_ms;
    }

    let port = settings.network.port;
    let timing = settings.polling.timing();
    let tick = settings.polling.tick();
    let run_for = args.run_for_secs.map(Duration::from_secs);

    let (transport, inbound) = UdpTransport::open(&settings.network.bind).await?;
    info!("Discovery socket on {}", transport.local_addr());

    match args.command {
        Command::Wan => {
            info!("Directory: {}", settings.network.url_servers);
            let directory = Arc::new(HttpDirectory::new(settings.network.url_servers.clone())?);
            let list = WanServerList::new(
                transport,
                directory,
                port,
                timing,
                settings.polling.wan_update_interval(),
            );
            poll(list, inbound, tick, run_for).await;
        }

        Command::Lan => {
            let list = LanServerList::new(
                transport,
                port,
                timing,
                settings.polling.lan_update_interval(),
            );
            poll(list, inbound, tick, run_for).await;
        }

        Command::Favorites { action } => {
            let store = SettingsFavorites::new(args.config.clone(), settings);
            let mut list = FavoriteServerList::open(transport, store, port, timing, Instant::now())?;

            match action {
                Some(FavoriteAction::Add { address }) => {
                    list.add(&address, Instant::now())?;
                    println!("Added {}", address);
                }
                Some(FavoriteAction::Remove { address }) => {
                    if list.remove(&address)? {
                        println!("Removed {}", address);
                    } else {
                        println!("{} is not a favorite", address);
                    }
                }
                Some(FavoriteAction::Clear) => {
                    list.clear()?;
                    println!("Cleared favorites");
                }
                Some(FavoriteAction::List) => {
                    for favorite in list.favorites() {
                        println!("{}", favorite);
                    }
                }
                None => {
                    poll(list, inbound, tick, run_for).await;
                    return Ok(());
                }
            }
            list.end();
        }
    }

    Ok(())
}

/// Drives `list` until Ctrl+C or the optional deadline, then prints it.
async fn poll<D: Discovery>(
    mut list: D,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    tick: Duration,
    run_for: Option<Duration>,
) {
    list.servers_mut()
        .subscribe(|event| info!("Server list changed: {:?}", event));

    let (mut shutdown, shutdown_rx) = Shutdown::channel();
    tokio::spawn(async move {
        match run_for {
            Some(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {},
                    _ = tokio::signal::ctrl_c() => {},
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        println!("Shutting down...");
        shutdown.trigger();
    });

    driver::run(&mut list, &mut inbound, tick, shutdown_rx).await;

    println!("{} servers:", list.servers().len());
    for server in list.servers() {
        println!("  {}", server);
    }
}
