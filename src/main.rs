use googol::barrel::client::BarrelClient;
use googol::barrel::handlers as barrel_handlers;
use googol::barrel::service::BarrelNode;
use googol::config::{Config, DEFAULT_CONFIG_FILE};
use googol::crawler::fetch::HttpPageFetcher;
use googol::crawler::worker::{self, CrawlerWorker};
use googol::dispatcher::handlers as dispatcher_handlers;
use googol::dispatcher::service::Dispatcher;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let mut config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    let mut role_args: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 >= args.len() {
                    print_usage(&args[0]);
                    std::process::exit(1);
                }
                config_path = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            other => {
                role_args.push(other.to_string());
                i += 1;
            }
        }
    }

    let config = Config::load(&config_path);

    match role_args.first().map(String::as_str) {
        Some("dispatcher") => run_dispatcher(config).await,
        Some("barrel") => {
            let index: usize = match role_args.get(1).map(|raw| raw.parse()) {
                Some(Ok(index)) => index,
                _ => {
                    eprintln!("barrel requires a numeric index (0..{})", config.barrels_count);
                    std::process::exit(1);
                }
            };
            if index >= config.barrels_count {
                eprintln!(
                    "barrel index {} out of range (barrels.count = {})",
                    index, config.barrels_count
                );
                std::process::exit(1);
            }
            run_barrel(config, index).await
        }
        Some("crawler") => run_crawler(config).await,
        _ => {
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [--config <file>] <role>", program);
    eprintln!("Roles:");
    eprintln!("  dispatcher          start the coordinator");
    eprintln!("  barrel <index>      start storage barrel <index> (0 is the primary)");
    eprintln!("  crawler             start the crawler workers");
}

async fn run_dispatcher(config: Config) -> anyhow::Result<()> {
    let addr = config.gateway_addr();
    let name = config.gateway_name.clone();

    tracing::info!("Starting dispatcher '{}' on {}", name, addr);

    // Recover the URL queue from the barrels before accepting requests.
    let dispatcher = Dispatcher::connect(config).await;
    dispatcher.start();

    let app = dispatcher_handlers::router(dispatcher);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Dispatcher '{}' listening on {}", name, addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_barrel(config: Config, index: usize) -> anyhow::Result<()> {
    let addr = config.barrel_addr(index);
    let node = Arc::new(BarrelNode::new(&config, index));

    tracing::info!(
        "Starting barrel {} on {}{}",
        node.name,
        addr,
        if node.is_primary { " (primary)" } else { "" }
    );

    let peers: Vec<BarrelClient> = node
        .peer_names()
        .iter()
        .filter_map(|name| {
            let url = config.barrel_url(name)?;
            Some(BarrelClient::new(name.clone(), url))
        })
        .collect();
    node.recover(&peers).await;
    Arc::clone(&node).start();

    let app = barrel_handlers::router(Arc::clone(&node));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Barrel {} listening on {}", node.name, addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_crawler(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Starting crawler with {} worker(s)",
        config.downloader_threads
    );

    let (dispatcher, barrels) = worker::connect_services(&config).await?;
    tracing::info!("Connected to dispatcher and {} barrel(s)", barrels.len());

    let barrels = Arc::new(Mutex::new(barrels));
    let fetcher = Arc::new(HttpPageFetcher::new());

    let mut handles = Vec::new();
    for id in 0..config.downloader_threads.max(1) {
        let worker = CrawlerWorker::new(
            id,
            dispatcher.clone(),
            Arc::clone(&barrels),
            Arc::clone(&fetcher),
            config.clone(),
        );
        handles.push(tokio::spawn(worker.run()));
    }

    for handle in handles {
        handle.await?;
    }

    Ok(())
}
