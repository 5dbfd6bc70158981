use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

use outreach_cms::config::ServeConfig;
use outreach_cms::resource::default_catalogue;
use outreach_cms::serve::serve;

#[derive(Parser, Debug)]
#[command(author, version, about = "Content API for the public site and admin dashboard")]
struct Args {
    /// Enable debug logging (RUST_LOG takes precedence when set)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the resource API and uploaded files over HTTP
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the resource kinds a config would serve
    Resources {
        /// Path to config file (TOML format); built-in catalogue when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match args.command {
        Command::Serve { config, port } => {
            let mut config = ServeConfig::load(&config)?;
            if let Some(port) = port {
                config.port = port;
            }
            serve(config)
        }
        Command::Resources { config } => {
            let schemas = match config {
                Some(path) => ServeConfig::load(&path)?.resource_schemas(),
                None => default_catalogue(),
            };
            for schema in schemas {
                let attachment = schema
                    .attachment
                    .as_ref()
                    .map(|a| format!("{} ({:?})", a.field, a.media))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<16} limit={:<4} attachment={:<16} required=[{}]",
                    schema.kind,
                    schema.default_limit,
                    attachment,
                    schema.required.join(", ")
                );
            }
            Ok(())
        }
    }
}
