//! Demo CLI: connect to a bridge, mirror state changes to the log, and
//! optionally push a few settings. The session layer does the work;
//! this binary only parses arguments, configures logging, and presents
//! errors.

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use azurctl_client::{AvrClient, Subscription};

#[derive(Parser, Debug)]
#[command(
    name = "azurctl",
    about = "Monitor and control a Cambridge Audio Azur receiver over a TCP-serial bridge"
)]
struct Args {
    /// IP or FQDN of the bridge.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port of the bridge.
    #[arg(long, default_value_t = 14999)]
    port: u16,

    /// Power the receiver on after connecting.
    #[arg(long)]
    power_on: bool,

    /// Select an input by name after connecting (e.g. "CD/AUX").
    #[arg(long)]
    input: Option<String>,

    /// Ramp the volume to a 0-100 level after connecting.
    #[arg(long)]
    volume: Option<u8>,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(error) = run(args).await {
        eprintln!("azurctl: {}", error);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    info!(host = %args.host, port = args.port, "connecting");
    let client = AvrClient::connect(&args.host, args.port).await?;

    client.subscribe(Subscription::Any, |property, value| {
        info!(%property, %value, "state change");
    });

    if args.power_on {
        match client.set_power(true).await?.wait().await {
            Ok(_) => info!("receiver powered on"),
            Err(error) => warn!(%error, "power-on not confirmed"),
        }
    }

    if let Some(name) = &args.input {
        match client.select_input_by_name(name).await?.wait().await {
            Ok(_) => info!(input = %name, "input selected"),
            Err(error) => warn!(%error, "input select not confirmed"),
        }
    }

    if let Some(volume) = args.volume {
        client.set_volume(volume).await?;
        info!(volume, "volume ramp started");
    }

    info!("watching for state changes, press ctrl-c to exit");
    tokio::signal::ctrl_c().await?;

    let snapshot = client.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    client.disconnect().await;
    Ok(())
}
