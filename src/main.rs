use clap::Parser;
use taskboard::cli::commands::Cli;
use taskboard::cli::handlers::{self, Context};
use taskboard::io::config_io;
use taskboard::logging;

fn main() {
    let cli = Cli::parse();
    let dir = cli.config_dir.clone().unwrap_or_else(config_io::config_dir);

    let config = match config_io::load_config(&dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&config.log.level);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = Context {
        dir,
        config,
        offline: cli.offline,
    };
    if let Err(e) = runtime.block_on(handlers::dispatch(cli, ctx)) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
