use clap::{Parser, Subcommand};
use log::error;
use ppp::LinkConfig;
use std::time::Duration;

/// PPP link driver
#[derive(Parser, Debug)]
#[command(version, about = "PPP link driver", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Negotiate two in-process links over byte channels
    Loopback {
        /// Seconds to wait for both links to open
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },

    /// Run the link on a serial device
    #[cfg(feature = "serial")]
    Serial {
        /// Serial device, overrides the configured port
        #[arg(short, long)]
        port: Option<String>,
        /// Baud rate, overrides the configured one
        #[arg(short, long)]
        baud_rate: Option<u32>,
    },
}

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> ppp::Result<()> {
    let config = LinkConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Loopback { timeout } => {
            ppp::loopback::negotiate(&config, &config, Duration::from_secs(timeout))
        }
        #[cfg(feature = "serial")]
        Commands::Serial { port, baud_rate } => serial(config, port, baud_rate),
    }
}

#[cfg(feature = "serial")]
fn serial(mut config: LinkConfig, port: Option<String>, baud_rate: Option<u32>) -> ppp::Result<()> {
    use log::info;
    use ppp::serial::SerialTransport;
    use ppp::{PppLink, SegmentId, SegmentPool};

    if port.is_some() {
        config.port = port;
    }
    if let Some(baud_rate) = baud_rate {
        config.baud_rate = baud_rate;
    }
    let Some(path) = config.port.clone() else {
        return Err(ppp::Error::InvalidConfig("no serial port configured".to_string()));
    };

    let (transport, rx) = SerialTransport::open(&path, config.baud_rate, config.event_queue_depth)?;
    let mut link = PppLink::new(&config, transport)?;
    link.set_ip_handler(Box::new(|pool: &SegmentPool, packet: SegmentId| {
        info!("ip packet of {} bytes", pool.tot_length(packet));
    }));

    info!("running on {path} at {} baud", config.baud_rate);
    link.start_configuration()?;
    link.run(&rx);
    Ok(())
}
