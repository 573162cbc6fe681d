use clap::Parser;
use instalog::cli::commands::Cli;
use instalog::cli::handlers::{self, Blocked};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_env("INSTALOG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = handlers::dispatch(cli) {
        eprintln!("error: {}", e);
        let code = if e.downcast_ref::<Blocked>().is_some() {
            Blocked::EXIT_CODE
        } else {
            1
        };
        std::process::exit(code);
    }
}
