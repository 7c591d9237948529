use anyhow::Context as _;

use beacon::app::BeaconApp;
use beacon::catalog::Catalog;
use beacon::config::{BeaconConfig, ServersDocument};

fn print_usage() {
    eprintln!(
        "beacon - game server status poller

USAGE:
    beacon [-c <PATH>]          run the service
    beacon validate <PATH>...   check server catalog files and exit
    beacon --help               print this help

OPTIONS:
    -c, --config <PATH>    server catalog file (default: config/servers.json)"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    beacon::telemetry::init_tracing().context("failed to initialise logging")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("validate") => validate(&args[1..]),
        _ => run(&args).await,
    }
}

async fn run(args: &[String]) -> anyhow::Result<()> {
    let mut config = BeaconConfig::load().context("failed to load configuration")?;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = iter
                    .next()
                    .context("--config requires a path argument")?;
                config.catalog_path = path.clone();
            }
            other => {
                print_usage();
                anyhow::bail!("unknown argument `{other}`");
            }
        }
    }

    let app = BeaconApp::initialise(config)
        .await
        .context("failed to initialise")?;
    app.run().await.context("service exited with an error")
}

fn validate(paths: &[String]) -> anyhow::Result<()> {
    if paths.is_empty() {
        anyhow::bail!("validate requires at least one catalog path");
    }
    for path in paths {
        let document =
            ServersDocument::from_path(path).with_context(|| format!("cannot read {path}"))?;
        let catalog = Catalog::from_document(&document)
            .with_context(|| format!("{path} failed validation"))?;
        println!(
            "{path}: ok ({} groups, {} endpoints)",
            catalog.groups.len(),
            catalog.endpoint_count()
        );
    }
    Ok(())
}
