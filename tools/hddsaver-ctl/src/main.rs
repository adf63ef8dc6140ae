use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hddsaver::capability::DEFAULT_BOARD_VENDOR;
use hddsaver::sim::{Nct6791Config, SimulatedBoard};
use hddsaver::{DriverConfig, HddSaverDriver};
use hddsaver_platform::{BoardIdentity, MonotonicClock};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "hddsaver-ctl",
    version,
    about = "Inspect and switch the ASRock HDD Saver SATA power rail."
)]
struct Args {
    /// Super-I/O configuration index port (`0x2e` or `0x4e`).
    ///
    /// Environment variable: `HDDSAVER_SIO_ADDR`.
    #[arg(long, env = "HDDSAVER_SIO_ADDR", value_parser = parse_port, default_value = "0x2e")]
    sio_addr: u16,

    /// Talk to an emulated NCT6791 instead of `/dev/port`.
    ///
    /// Environment variable: `HDDSAVER_SIMULATE`.
    #[arg(
        long,
        env = "HDDSAVER_SIMULATE",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    simulate: bool,

    /// Board vendor to match against the allow-list instead of the DMI value.
    ///
    /// Environment variable: `HDDSAVER_BOARD_VENDOR`.
    #[arg(long, env = "HDDSAVER_BOARD_VENDOR")]
    board_vendor: Option<String>,

    /// Board name to match against the allow-list instead of the DMI value.
    ///
    /// Environment variable: `HDDSAVER_BOARD_NAME`.
    #[arg(long, env = "HDDSAVER_BOARD_NAME")]
    board_name: Option<String>,

    /// Log filter (tracing-subscriber EnvFilter syntax). Defaults to `RUST_LOG`, then `warn`.
    ///
    /// Environment variable: `HDDSAVER_LOG_LEVEL`.
    #[arg(long, env = "HDDSAVER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Report the chip and whether the board wires the HDD Saver.
    Probe,
    /// Print the switch position (`On` or `Off`).
    Status,
    /// Move the switch. Accepts `on`/`off`, `1`/`0`, `y`/`n` and friends.
    Set { value: String },
    /// Run a suspend/resume cycle and print the resulting position.
    SuspendResume,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;
    run(args)
}

fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => {
            EnvFilter::try_new(level).with_context(|| format!("invalid log filter {level:?}"))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    // Logs go to stderr so stdout stays machine readable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = DriverConfig::default().with_sio_base(args.sio_addr);

    if args.simulate {
        let board = with_overrides(
            BoardIdentity::new(DEFAULT_BOARD_VENDOR, "Z97 Extreme4"),
            &args,
        );
        let sim = SimulatedBoard::at(args.sio_addr, Nct6791Config::default(), board);
        tracing::debug!("using an emulated chip at {:#x}", args.sio_addr);
        let driver = HddSaverDriver::new(
            config,
            sim.bus(),
            sim.regions(),
            Arc::new(MonotonicClock::new()),
        );
        return execute(&args.command, &driver, sim.board());
    }

    let board = BoardIdentity::from_sysfs().context("read DMI board identity")?;
    let board = with_overrides(board, &args);
    let driver = host_driver(config)?;
    execute(&args.command, &driver, &board)
}

#[cfg(unix)]
fn host_driver(config: DriverConfig) -> anyhow::Result<HddSaverDriver> {
    use hddsaver_platform::DevPortBus;

    let bus = DevPortBus::open()
        .with_context(|| format!("open {} (needs CAP_SYS_RAWIO)", DevPortBus::DEFAULT_PATH))?;
    Ok(HddSaverDriver::with_defaults(config, Arc::new(bus)))
}

#[cfg(not(unix))]
fn host_driver(_config: DriverConfig) -> anyhow::Result<HddSaverDriver> {
    anyhow::bail!("raw port access is only available on Linux; use --simulate")
}

fn with_overrides(mut board: BoardIdentity, args: &Args) -> BoardIdentity {
    if let Some(vendor) = &args.board_vendor {
        board.vendor = Some(vendor.clone());
    }
    if let Some(name) = &args.board_name {
        board.name = Some(name.clone());
    }
    board
}

fn execute(
    command: &Command,
    driver: &HddSaverDriver,
    board: &BoardIdentity,
) -> anyhow::Result<()> {
    let device = driver.register(board).context("bind HDD Saver")?;

    match command {
        Command::Probe => {
            let identity = device.identity();
            println!("chip: {}", identity.kind.name());
            println!("config port: {:#x}", identity.sio_base);
            println!("hardware monitor: {:#x}", identity.hwm_base);
            let present = if device.has_hdd_saver() {
                "present"
            } else {
                "absent"
            };
            println!("HDD Saver: {present}");
        }
        Command::Status => print!("{}", device.show_status()),
        Command::Set { value } => {
            device
                .store_status(value)
                .with_context(|| format!("set status to {value:?}"))?;
            print!("{}", device.show_status());
        }
        Command::SuspendResume => {
            device.suspend();
            device.resume().context("resume")?;
            print!("{}", device.show_status());
        }
    }

    device.remove();
    Ok(())
}

fn parse_port(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    let port = parsed.map_err(|err| format!("invalid port {s:?}: {err}"))?;
    // The data port sits at `port + 1`.
    if port == u16::MAX {
        return Err(format!("invalid port {s:?}: the index/data pair needs two ports"));
    }
    Ok(port)
}
