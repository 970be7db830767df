use clap::Parser;
use dotenv::dotenv;
use portrelay::{setup_tracing, AppResult, Bridge, RelayConfig, GLOBAL_CONFIG};
use std::path::PathBuf;
use tokio::runtime;

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    PrintConfig,
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let relay_config = RelayConfig::set_up_config(config_path)?;

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", relay_config);
        return Ok(());
    }

    GLOBAL_CONFIG
        .set(relay_config)
        .expect("set relay config failed");

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let _log_guard = setup_tracing();

    let bridge = Bridge::new();
    rt.block_on(bridge.run(portrelay::global_config()))?;

    Ok(())
}
