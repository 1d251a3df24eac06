use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(name = "wlink-bridge")]
#[command(about = "Configure WiFi on this host from a paired phone over BLE")]
struct Cli {
    /// Config file (default: $WLINK_HOME/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bluetooth adapter, e.g. hci0
    #[arg(long, global = true)]
    adapter: Option<String>,

    /// Advertised device name
    #[arg(long, global = true)]
    name: Option<String>,

    /// WiFi interface to manage, e.g. wlan0
    #[arg(long, global = true)]
    interface: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Serve the command channel (default)
    Run,
    /// Print the effective configuration as JSON
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli: Cli = clap::Parser::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let mut config = wlink_bridge::BridgeConfig::load(cli.config.as_deref())?;
    if cli.adapter.is_some() {
        config.adapter = cli.adapter;
    }
    if cli.name.is_some() {
        config.device_name = cli.name;
    }
    if cli.interface.is_some() {
        config.interface = cli.interface;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::PrintConfig => println!("{}", config.to_json()),
        Commands::Run => wlink_bridge::run(&config).await?,
    }
    Ok(())
}
