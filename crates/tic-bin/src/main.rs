//! CLI Entry Point for the TIC500 driver
//!
//! One-shot access to a Cryovac TIC500: connects, brings the device up, runs
//! a single operation and shuts down again.
//!
//! # Usage
//!
//! ```bash
//! tic500 --host 192.168.1.50 get Out1 setpoint
//! tic500 --host 192.168.1.50 set In2 sensor_type Diode
//! tic500 --host 192.168.1.50 --dialect plain query "Out1.Value?"
//! tic500 --mock --host sim describe
//! tic500 list
//! ```
//!
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=tic_driver_cryovac=debug`
//! shows every line on the wire).

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Overrides;
use std::path::PathBuf;
use tic_core::capabilities::Lifecycle;
use tic_core::AttrValue;
use tic_driver_cryovac::codec::parse_value;
use tic_driver_cryovac::driver::attribute_name;
use tic_driver_cryovac::registry::{list_properties, resolve, PropertySpec, ValueType};
use tic_driver_cryovac::{Channel, Dialect, Tic500Driver};

#[derive(Parser)]
#[command(name = "tic500")]
#[command(about = "Command-line access to a Cryovac TIC500 temperature controller", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, default_value = "tic500.toml")]
    config: PathBuf,

    /// Instrument hostname or IP address
    #[arg(long)]
    host: Option<String>,

    /// Instrument TCP port
    #[arg(long)]
    port: Option<u16>,

    /// Command framing: plain or verbose
    #[arg(long)]
    dialect: Option<Dialect>,

    /// Reply timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Talk to a simulated instrument instead of the network
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a channel property
    Get {
        /// Channel id (Out1, Out2, In1..In4)
        channel: Channel,
        /// Property name (see `list`)
        property: String,
    },

    /// Write a channel property
    Set {
        /// Channel id (Out1, Out2, In1..In4)
        channel: Channel,
        /// Property name (see `list`)
        property: String,
        /// New value (number, text, enum symbol, or on/off)
        value: String,
    },

    /// Send a raw command and print the reply
    Query {
        /// Command line, e.g. "Out1.pid.Setpoint?"
        text: String,
    },

    /// Send a raw command without waiting for a reply
    Send {
        /// Command line, e.g. "Out1.pid.Mode=On"
        text: String,
    },

    /// Print the instrument's description
    Describe,

    /// List every attribute with its type and access mode
    List,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            dialect: self.dialect,
            timeout_ms: self.timeout_ms,
            mock: self.mock.then_some(true),
        }
    }
}

/// Parse a command-line value for `spec`.
///
/// Flags additionally accept on/off, true/false and 1/0 in any case.
fn parse_cli_value(spec: &PropertySpec, text: &str) -> Result<AttrValue> {
    if spec.value_type == ValueType::Bool {
        return match text.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Ok(AttrValue::Bool(true)),
            "off" | "false" | "0" => Ok(AttrValue::Bool(false)),
            _ => anyhow::bail!("'{}' is not an on/off value", text),
        };
    }
    parse_value(spec, text).with_context(|| format!("Invalid value for '{}'", spec.name))
}

fn list_attributes() -> Vec<String> {
    Channel::all()
        .flat_map(|channel| {
            list_properties(channel.kind()).iter().map(move |spec| {
                format!(
                    "{:<22} {:<7} {}  {}",
                    attribute_name(channel, spec),
                    spec.value_type.attr_type().dtype(),
                    spec.access,
                    spec.description
                )
            })
        })
        .collect()
}

fn print_attributes() {
    for line in list_attributes() {
        println!("{}", line);
    }
}

async fn run(driver: &Tic500Driver, command: Commands) -> Result<()> {
    match command {
        Commands::Get { channel, property } => {
            let value = driver.get(channel, &property).await?;
            println!("{}", value);
        }
        Commands::Set {
            channel,
            property,
            value,
        } => {
            let spec = resolve(channel.kind(), &property)?;
            let value = parse_cli_value(spec, &value)?;
            driver.set(channel, &property, value).await?;
        }
        Commands::Query { text } => {
            println!("{}", driver.raw_query(&text).await?);
        }
        Commands::Send { text } => {
            driver.raw_send(&text).await?;
        }
        Commands::Describe => {
            println!("{}", driver.describe().await?);
        }
        Commands::List => print_attributes(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // The attribute table is static; listing it needs no instrument
    if matches!(cli.command, Commands::List) {
        print_attributes();
        return Ok(());
    }

    let overrides = cli.overrides();
    let config = config::load(&cli.config, &overrides)?;
    tracing::debug!(?config, "Loaded configuration");

    let driver = Tic500Driver::new(&config)?;
    driver.on_init().await?;

    let result = run(&driver, cli.command).await;
    driver.on_shutdown().await?;
    result
}
