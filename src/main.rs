use arcade_killswitch::button::{
    ActionDispatcher, KillSwitchHandle, KillSwitchSettings, RppalInput,
};
use arcade_killswitch::config::KillSwitchConfig;
use arcade_killswitch::system::signals::wait_for_shutdown_signal;
use arcade_killswitch::system::{
    CommandShutdown, DryRunProcessControl, DryRunSystemControl, ProcessControl,
    ProcfsProcessControl, SystemControl,
};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Physical kill switch for arcade cabinets
#[derive(Parser, Debug)]
#[command(name = "killswitch", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log actions instead of killing processes or halting the host
    #[arg(long)]
    dry_run: bool,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();

    let config = KillSwitchConfig::load(cli.config.as_deref())
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }
    config.log_summary();

    let dispatcher = build_dispatcher(&config, cli.dry_run)?;

    // GPIO is acquired once and released when the loop drops it
    let line = RppalInput::configure_input(config.button.pin, config.button.pull)
        .map_err(|e| eyre!("Cannot use the kill switch input: {}", e))?;

    let cancel = CancellationToken::new();
    let handle = KillSwitchHandle::spawn(
        Some(KillSwitchSettings::from(&config)),
        line,
        dispatcher,
        cancel.clone(),
    );

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            warn!("Could not install signal handlers: {}", e);
            return;
        }
        signal_cancel.cancel();
    });

    info!("Kill switch armed");
    match handle.join().await {
        Ok(stats) => {
            info!("Exiting after {} presses", stats.presses);
            Ok(())
        }
        Err(e) => {
            error!("Kill switch stopped: {}", e);
            Err(eyre!("Kill switch stopped: {}", e))
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn build_dispatcher(config: &KillSwitchConfig, dry_run: bool) -> Result<ActionDispatcher> {
    let (processes, system): (Box<dyn ProcessControl>, Box<dyn SystemControl>) = if dry_run {
        warn!("Dry run: no process will be signalled and the host will not halt");
        (Box::new(DryRunProcessControl), Box::new(DryRunSystemControl))
    } else {
        let signal = config
            .terminate_signal()
            .map_err(|e| eyre!("Invalid terminate signal: {}", e))?;
        (
            Box::new(ProcfsProcessControl::new(signal)),
            Box::new(CommandShutdown::new(config.actions.shutdown_command.clone())),
        )
    };

    Ok(ActionDispatcher::new(
        config.actions.process_names.clone(),
        processes,
        system,
    ))
}
