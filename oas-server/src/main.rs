use oas_core::{LoggingObserver, Server, ServerInfo};

use log::error;
use structopt::StructOpt;

use std::path::PathBuf;

#[derive(StructOpt)]
#[structopt(name = "oas", about = "OpenAL Audio Server")]
struct Opt {
    /// Path to the server's key/value configuration file.
    #[structopt(short, long, parse(from_os_str), default_value = "oas.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let opt = Opt::from_args();

    let config = match ServerInfo::load(&opt.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration from {}: {}", opt.config.display(), e);
            std::process::exit(1);
        }
    };

    let observer: Box<dyn oas_core::Observer> = Box::new(LoggingObserver);

    let mut server = match Server::new(config, observer).await {
        Ok(server) => server,
        Err(e) => {
            error!("fatal error during startup: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("server exited with error: {}", e);
        std::process::exit(1);
    }
}
