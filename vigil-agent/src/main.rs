use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

mod config;
mod publish;
mod sampler;

use config::{AgentConfig, Mode};
use publish::grpc::GrpcPublisher;
use publish::http::HttpPublisher;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AgentConfig::load()?;
    init_logging();

    if let Err(e) = run(cfg).await {
        error!(error = %e, "agent terminated with error");
        return Err(e);
    }
    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cfg: AgentConfig) -> Result<()> {
    // A configured key that fails to load is fatal; silently publishing
    // plaintext would defeat the point of configuring it.
    let public_key = if cfg.crypto_key.is_empty() {
        None
    } else {
        let key = vigil_core::crypto::load_public_key(Path::new(&cfg.crypto_key))
            .context("failed to load public key")?;
        info!(path = %cfg.crypto_key, "public key loaded");
        Some(key)
    };

    let agent_ip = vigil_core::netutil::outbound_ip();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        agent_ip = %agent_ip,
        poll_interval = cfg.poll_interval,
        report_interval = cfg.report_interval,
        "starting vigil agent"
    );

    let shutdown = vigil_core::shutdown::install();
    let poll_interval = Duration::from_secs(cfg.poll_interval.max(1));
    let report_interval = Duration::from_secs(cfg.report_interval.max(1));

    // Bounded handoff between samplers and publishers. Capacity scales with
    // the worker count; producers drop rather than stall when it fills.
    let (queue_tx, queue_rx) = mpsc::channel(cfg.rate_limit * 3);

    let samplers = vec![
        tokio::spawn(sampler::collect_runtime(
            shutdown.clone(),
            poll_interval,
            queue_tx.clone(),
        )),
        tokio::spawn(sampler::collect_system(shutdown.clone(), poll_interval, queue_tx)),
    ];
    // The samplers now hold the only senders; when cancellation stops them
    // the queue closes and the publishers drain out.

    match cfg.mode {
        Mode::Http => {
            info!(address = %cfg.address, workers = cfg.rate_limit, "publishing over http");
            let publisher = Arc::new(HttpPublisher::new(
                &cfg.address,
                &cfg.hash_key,
                public_key,
                agent_ip,
                report_interval,
            ));
            publisher.check_server().await;

            let queue = Arc::new(Mutex::new(queue_rx));
            let workers: Vec<_> = (0..cfg.rate_limit)
                .map(|worker| {
                    tokio::spawn(publisher.clone().run_worker(worker, queue.clone()))
                })
                .collect();

            for task in samplers {
                task.await.context("sampler task failed")?;
            }
            for task in workers {
                task.await.context("worker task failed")?;
            }
        }
        Mode::Grpc => {
            info!(address = %cfg.grpc_address, "publishing over grpc");
            let publisher = GrpcPublisher::new(
                &cfg.grpc_address,
                &cfg.hash_key,
                public_key,
                agent_ip,
                report_interval,
            );

            let outcome = publisher.run(queue_rx, shutdown.clone()).await;
            // A dead stream means nothing will ever drain the queue again;
            // take the whole agent down with it.
            shutdown.cancel();
            for task in samplers {
                task.await.context("sampler task failed")?;
            }
            outcome.context("grpc publisher failed")?;
        }
    }

    info!("agent stopped");
    Ok(())
}
