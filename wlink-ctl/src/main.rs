//! Command-line client for wlink bridges
//!
//! ```text
//! wlink-ctl scan
//! wlink-ctl send scan
//! wlink-ctl send conn "Home Net" s3cr3t!
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use wlink_ctl::ble;

#[derive(Parser)]
#[command(name = "wlink-ctl")]
#[command(about = "Send commands to a wlink bridge over BLE")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for bridges
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Show every device, not only bridges
        #[arg(short, long)]
        all: bool,
    },
    /// Run one command on a bridge and print the reply
    Send {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
        /// Reply is complete after this much silence
        #[arg(long, default_value = "500")]
        quiet_ms: u64,
        /// Give up if no reply starts within this many seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
        /// Command and arguments, e.g. `conn "Home Net" secret`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Scan { duration, all } => {
            println!("Scanning for wlink bridges ({duration} seconds)...");
            let devices = ble::scan(duration).await?;
            let shown: Vec<_> = devices.iter().filter(|d| all || d.is_bridge).collect();

            println!("\nFound {} devices:", shown.len());
            for device in shown {
                let rssi = device
                    .rssi
                    .map(|r| format!("{r} dBm"))
                    .unwrap_or_else(|| "N/A".to_string());
                let marker = if device.is_bridge { " [WLINK]" } else { "" };
                println!("  {} ({}) RSSI: {rssi}{marker}", device.name, device.address);
            }
        }
        Commands::Send {
            device,
            quiet_ms,
            timeout,
            command,
        } => {
            let timing = ble::Timing {
                reply_timeout: Duration::from_secs(timeout),
                quiet: Duration::from_millis(quiet_ms),
                ..ble::Timing::default()
            };
            let line = wlink_ctl::command_line(&command);
            let reply = ble::send(device.as_deref(), &line, &timing).await?;

            println!("{}", reply.output);
            if reply.status != 0 {
                eprintln!("status {}", reply.status);
            }
            std::process::exit(reply.exit_code());
        }
    }

    Ok(())
}
