use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uvc_gadget::config::{self, AppConfig};
use uvc_gadget::gadget::{
    DescriptorTree, GadgetIdentity, GadgetLayout, StatusReport, SysConfigFs, SysHost,
    UvcFunction, UvcGadgetManager,
};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// uvc-gadget command line arguments
#[derive(Parser, Debug)]
#[command(name = "uvc-gadget")]
#[command(version, about = "Configure a USB Video Class gadget through ConfigFS", long_about = None)]
struct CliArgs {
    /// Configuration file (default: $UVC_GADGET_CONFIG or /etc/uvc-gadget/gadget.toml)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// usb_gadget ConfigFS base path (overrides config file)
    #[arg(long, value_name = "DIR", global = true)]
    configfs: Option<PathBuf>,

    /// Gadget name (overrides config file)
    #[arg(short = 'g', long, value_name = "NAME", global = true)]
    gadget_name: Option<String>,

    /// UDC to bind to (overrides config file)
    #[arg(long, value_name = "UDC", global = true)]
    udc: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the gadget (if absent) and bind it to a controller
    Start,
    /// Unbind from the controller, keep the configuration
    Stop,
    /// Remove the gadget, then start it again from the static frame list
    Restart,
    /// Tear the whole gadget down
    #[command(alias = "unload")]
    Remove,
    /// Show state and configured frames
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add one frame to a configured or running gadget
    Add {
        /// Frame name, unique across both formats
        name: String,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Comma-separated frame intervals in 100ns units, default first
        #[arg(value_parser = parse_intervals)]
        intervals: Intervals,
        /// yuy2, yuyv, uncompressed, mjpeg or jpeg
        format: String,
    },
}

/// Frame intervals given as `333333,666666`
#[derive(Debug, Clone, PartialEq)]
struct Intervals(Vec<u32>);

fn parse_intervals(s: &str) -> Result<Intervals, String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .map_err(|e| format!("invalid frame interval '{}': {}", part, e))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Intervals)
}

fn main() -> anyhow::Result<()> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help and version go to stdout with success, usage errors exit 1
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logging(args.log_level, args.verbose);

    let config_path = config::resolve_path(args.config.clone());
    let mut config = config::load(config_path.as_deref())?;
    apply_overrides(&mut config, &args);

    let manager = build_manager(&config)?;

    match args.command {
        Command::Start => print_status(&manager.start()?, false)?,
        Command::Stop => manager.stop()?,
        Command::Restart => print_status(&manager.restart()?, false)?,
        Command::Remove => manager.remove()?,
        Command::Status { json } => print_status(&manager.status()?, json)?,
        Command::Add {
            name,
            width,
            height,
            intervals,
            format,
        } => print_status(&manager.add(&name, width, height, intervals.0, &format)?, false)?,
    }

    Ok(())
}

/// Apply CLI argument overrides to config (only if explicitly specified)
fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(path) = &args.configfs {
        config.configfs_path = path.to_string_lossy().to_string();
    }
    if let Some(name) = &args.gadget_name {
        config.gadget_name = name.clone();
    }
    if let Some(udc) = &args.udc {
        config.udc = Some(udc.clone());
    }
}

fn build_manager(config: &AppConfig) -> anyhow::Result<UvcGadgetManager<SysConfigFs, SysHost>> {
    let base = Path::new(&config.configfs_path);
    if !SysConfigFs::is_available(base) {
        tracing::warn!(
            "ConfigFS not available at {}. Is it mounted at /sys/kernel/config?",
            base.display()
        );
    }

    let layout = GadgetLayout::new(base, &config.gadget_name, &config.function.instance);
    let tree = DescriptorTree::new(
        layout,
        UvcFunction::new(config.function.streaming_params()),
        config.function.max_power_ma,
    );
    let host = SysHost::new(&config.udc_class_path, config.udc.clone());

    Ok(UvcGadgetManager::new(
        SysConfigFs,
        host,
        &config.gadget_name,
        GadgetIdentity::from(&config.identity),
        tree,
        config::registry(config)?,
    )
    .with_settle_delay(Duration::from_millis(config.settle_delay_ms)))
}

fn print_status(status: &StatusReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
    } else {
        print!("{}", status);
    }
    Ok(())
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "uvc_gadget=error",
        LogLevel::Warn => "uvc_gadget=warn",
        LogLevel::Info => "uvc_gadget=info",
        LogLevel::Verbose => "uvc_gadget=debug",
        LogLevel::Debug => "uvc_gadget=debug",
        LogLevel::Trace => "uvc_gadget=trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    // stderr keeps stdout clean for status output
    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_add_arguments() {
        let args = CliArgs::try_parse_from([
            "uvc-gadget", "add", "hd", "1280", "720", "333333,666666", "mjpeg",
        ])
        .unwrap();
        match args.command {
            Command::Add {
                name,
                width,
                intervals,
                format,
                ..
            } => {
                assert_eq!(name, "hd");
                assert_eq!(width, 1280);
                assert_eq!(intervals, Intervals(vec![333_333, 666_666]));
                assert_eq!(format, "mjpeg");
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(parse_intervals("333333,abc").is_err());
        assert_eq!(parse_intervals("").unwrap(), Intervals(Vec::new()));

        // Exactly five positional arguments
        assert!(CliArgs::try_parse_from(["uvc-gadget", "add", "hd", "1280", "720"]).is_err());
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let args = CliArgs::try_parse_from([
            "uvc-gadget",
            "--configfs",
            "/tmp/usb_gadget",
            "-g",
            "cam0",
            "--udc",
            "musb-hdrc.1",
            "status",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.configfs_path, "/tmp/usb_gadget");
        assert_eq!(config.gadget_name, "cam0");
        assert_eq!(config.udc.as_deref(), Some("musb-hdrc.1"));

        // Global options are accepted after the subcommand too
        let args =
            CliArgs::try_parse_from(["uvc-gadget", "status", "--json", "--udc", "fe980000.usb"])
                .unwrap();
        assert!(matches!(args.command, Command::Status { json: true }));
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.udc.as_deref(), Some("fe980000.usb"));
        assert_eq!(config.gadget_name, AppConfig::default().gadget_name);
        assert_eq!(config.configfs_path, AppConfig::default().configfs_path);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = CliArgs::try_parse_from(["uvc-gadget", "stop"]).unwrap();
        let mut config = AppConfig {
            udc: Some("from-file".to_string()),
            ..AppConfig::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.udc.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_unload_alias() {
        let args = CliArgs::try_parse_from(["uvc-gadget", "unload"]).unwrap();
        assert!(matches!(args.command, Command::Remove));
    }
}
