use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use charmstore::config::{CommonConfig, PathSet};
use charmstore::server::config::ServerConfig;

/// Serve charms and bundles over HTTP, guarded by per-channel ACLs and
/// macaroon-based authentication.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// The config directory, default is `$CHARMSTORE_CONFIG`, or
    /// `~/.config/charmstore`.
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// The data directory, default is `$CHARMSTORE_DATA`, or
    /// `~/.local/share/charmstore`.
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Print the completed configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let ps = PathSet::new(args.config_path, args.data_path)?;
    let cfg: ServerConfig = ps.load_config("server", ServerConfig::default)?;

    if args.print_config {
        let json = serde_json::to_string_pretty(&cfg).context("encode config")?;
        println!("{json}");
        return Ok(());
    }

    cfg.logs.init()?;
    info!("Starting charmstore {}", env!("CARGO_PKG_VERSION"));

    let ctx = cfg.build_ctx()?;
    let srv = cfg.build_restful_server(ctx)?;
    srv.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            _ = writeln!(io::stderr(), "Fatal: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
