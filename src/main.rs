use clap::{value_parser, Arg, Command};
use colored::Colorize;

use railbench::commands;

fn build_cli() -> Command {
    Command::new("railbench")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lab-automation harness for power-cycling mobile devices and recording synchronized power telemetry")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to the devices configuration file"),
        )
        .subcommand(Command::new("devices").about("List configured devices"))
        .subcommand(
            Command::new("init-state")
                .about("Init every rail channel and the supply relay to off (required once per host boot)"),
        )
        .subcommand(
            Command::new("switch")
                .about("Power a device on or off on the shared rail, or read its state back")
                .arg(Arg::new("device").required(true).help("Device name"))
                .arg(
                    Arg::new("state")
                        .required(true)
                        .value_parser(["on", "off", "read-state"])
                        .help("Target power state, or 'read-state' to print the current one"),
                )
                .arg(
                    Arg::new("auto-recharge")
                        .long("auto-recharge")
                        .value_name("RATIO")
                        .value_parser(value_parser!(f64))
                        .help("Recharge to full first if battery is below RATIO (Android only)"),
                ),
        )
        .subcommand(
            Command::new("measuring")
                .about("Start or stop the telemetry collectors for a device")
                .arg(Arg::new("device").required(true).help("Device name"))
                .arg(
                    Arg::new("action")
                        .required(true)
                        .value_parser(["start", "stop"])
                        .help("Session action"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("DIR")
                        .help("Output directory for the measurement batch [default: measurements-<timestamp>]"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_parser(["csv", "parquet"])
                        .help("Hardware-sampler output format [default: csv]"),
                )
                .arg(
                    Arg::new("granularity")
                        .short('g')
                        .long("granularity")
                        .value_name("1..100")
                        .value_parser(value_parser!(usize))
                        .help("Keep every g-th hardware sample"),
                )
                .arg(
                    Arg::new("auto-recharge")
                        .long("auto-recharge")
                        .value_name("RATIO")
                        .value_parser(value_parser!(f64))
                        .help("Top the battery up to RATIO before starting"),
                )
                .arg(
                    Arg::new("pid-dir")
                        .long("pid-dir")
                        .value_name("DIR")
                        .help("Session-scoped directory for collector handles"),
                ),
        )
        .subcommand(
            Command::new("supply")
                .about("Control the power supply directly")
                .subcommand_required(true)
                .subcommand(
                    Command::new("init-state")
                        .about("Init the supply's GPIO relay to off (required once per host boot)"),
                )
                .subcommand(Command::new("read-state").about("Read the supply's relay state"))
                .subcommand(
                    Command::new("switch")
                        .about("Switch the supply's mains relay")
                        .arg(Arg::new("state").required(true).value_parser(["on", "off"])),
                )
                .subcommand(
                    Command::new("set-voltage")
                        .about("Program the rail output voltage (0 de-energizes)")
                        .arg(
                            Arg::new("volts")
                                .required(true)
                                .value_parser(value_parser!(f64)),
                        ),
                )
                .subcommand(
                    Command::new("collect")
                        .about("Run the power sampling loop")
                        .arg(
                            Arg::new("output")
                                .short('o')
                                .long("output")
                                .value_name("FILE")
                                .default_value("measurements.csv")
                                .help("Output file; columns: time (s), current (mA), voltage (V)"),
                        )
                        .arg(
                            Arg::new("format")
                                .long("format")
                                .value_parser(["csv", "parquet"])
                                .help("Output format [default: csv]"),
                        )
                        .arg(
                            Arg::new("duration")
                                .short('d')
                                .long("duration")
                                .value_name("SECS")
                                .value_parser(value_parser!(u64))
                                .help("Collection duration; omit to run until interrupted"),
                        )
                        .arg(
                            Arg::new("granularity")
                                .short('g')
                                .long("granularity")
                                .value_name("1..100")
                                .value_parser(value_parser!(usize))
                                .help("Keep every g-th sample"),
                        )
                        .arg(
                            Arg::new("t-sleep")
                                .long("t-sleep")
                                .value_name("MS")
                                .value_parser(value_parser!(u64))
                                .help("Sleep per poll, in ms, for rate control"),
                        ),
                ),
        )
        .subcommand(
            Command::new("barrier")
                .about("Host/device execution barrier over HTTP")
                .subcommand_required(true)
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .global(true)
                        .value_parser(value_parser!(u16))
                        .help("Listen port [default: 5100]"),
                )
                .subcommand(Command::new("serve").about("Run the always-listening await service"))
                .subcommand(
                    Command::new("await")
                        .about("Arm a wait and block until /continue or timeout")
                        .arg(
                            Arg::new("timeout")
                                .short('t')
                                .long("timeout")
                                .value_name("SECS")
                                .value_parser(value_parser!(u64))
                                .help("Give up after this many seconds"),
                        ),
                ),
        )
}

fn main() {
    railbench::init_logging();

    let matches = build_cli().get_matches();
    let result = match matches.subcommand() {
        Some(("devices", sub)) => commands::devices::execute(sub),
        Some(("init-state", sub)) => commands::init_state::execute(sub),
        Some(("switch", sub)) => commands::switch::execute(sub),
        Some(("measuring", sub)) => commands::measuring::execute(sub),
        Some(("supply", sub)) => commands::supply::execute(sub),
        Some(("barrier", sub)) => commands::barrier::execute(sub),
        _ => {
            build_cli().print_help().ok();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("{} {e:#}", "Error:".red().bold());
        std::process::exit(1);
    }
}
