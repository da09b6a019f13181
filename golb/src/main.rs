mod logging;
mod server;
mod tls;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

use golb_config::Config;
use golb_core::{Backend, Dispatcher, EventSink, Handler, ServerPool};
use golb_filters::{build_chain, InProcessStore, Store};
use golb_metrics::{serve_admin, Metrics, MetricsFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "golb", about = "HTTP(S) reverse-proxy load balancer")]
struct Args {
  /// Path to the YAML configuration file.
  #[arg(short, long, default_value = "./golb.yaml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() {
  if let Err(err) = run().await {
    eprintln!("FATAL ERROR: {err}");
    std::process::exit(1);
  }
}

async fn run() -> anyhow::Result<()> {
  // Installed once up front: rustls 0.23 with aws-lc-rs needs an explicit
  // default crypto provider before any ServerConfig is built, whether or
  // not this particular run ends up serving TLS.
  let _ = tokio_rustls::rustls::crypto::aws_lc_rs::default_provider().install_default();

  let args = Args::parse();
  let config = Config::load(&args.config)?;

  let (log_sink, flush_task) = logging::channel_event_sink();
  let flush_handle = tokio::spawn(flush_task);
  let events: Arc<dyn EventSink> = log_sink.clone();

  let backends: Vec<Arc<Backend>> = config
    .backends
    .iter()
    .map(|backend_config| {
      Backend::with_event_sink(
        &backend_config.url,
        backend_config.weight,
        backend_config.max_consecutive_failures,
        events.clone(),
      )
      .map(Arc::new)
    })
    .collect::<anyhow::Result<_>>()?;

  let shutdown = CancellationToken::new();

  let health_task = tokio::spawn(golb_core::health::run(backends.clone(), events.clone(), shutdown.clone()));

  let pool = ServerPool::new(backends, config.strategy_kind()?);
  let dispatcher = Dispatcher::new(pool);

  let store: Arc<dyn Store> = InProcessStore::new();
  let chain = build_chain(&config, store, dispatcher);

  let metrics = Metrics::new()?;
  let chain: Arc<dyn Handler> = Arc::new(MetricsFilter::new(metrics.clone(), chain));

  let admin_task = tokio::spawn(serve_admin(config.admin_port, metrics, shutdown.clone()));

  let server_task = if let (Some(cert_file), Some(key_file)) = (&config.cert_file, &config.key_file) {
    let tls_config = tls::build_tls_config(cert_file, key_file)?;
    tokio::spawn(server::serve_tls(config.lb_port, chain, tls_config, shutdown.clone()))
  } else {
    tokio::spawn(server::serve_plain(config.lb_port, chain, shutdown.clone()))
  };

  tokio::signal::ctrl_c().await?;
  events.log("received shutdown signal, draining in-flight requests", false);
  shutdown.cancel();

  server_task.await??;
  admin_task.await??;
  health_task.abort();

  events.log("shutdown complete", false);
  drop(events);
  log_sink.close();
  let _ = tokio::time::timeout(std::time::Duration::from_secs(1), flush_handle).await;

  Ok(())
}
