use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use crate::config::DiscoveryConfig;
use super::codec::{self, ParseError, Service};
use super::transport::{select_interfaces, MulticastTransport, TransportError};

/// One search: send an M-SEARCH and collect the replies that arrive within
/// `wait_secs`. Each USN is reported once per pass.
pub async fn search_once(config: &DiscoveryConfig) -> Result<Vec<Service>, TransportError> {
    let interfaces = select_interfaces(&config.interfaces)?;
    let mut transport = MulticastTransport::open(config.bind, interfaces)?;

    let msg = codec::build_search(config.multicast_addr, &config.search_target, config.wait_secs);
    transport.send(msg.as_bytes(), config.multicast_addr).await?;
    tracing::debug!(
        "Sent M-SEARCH for {} from {:?}",
        config.search_target,
        transport.local_addr().ok()
    );

    let mut seen = HashSet::new();
    let mut services = Vec::new();
    transport
        .receive_for(Duration::from_secs(config.wait_secs), |src, data| {
            collect_response(src, data, &mut seen, &mut services)
        })
        .await?;

    transport.close();
    Ok(services)
}

fn collect_response(
    src: SocketAddr,
    data: &[u8],
    seen: &mut HashSet<String>,
    services: &mut Vec<Service>,
) {
    match codec::parse_response(data) {
        Ok(service) => {
            if seen.insert(service.usn.clone()) {
                tracing::debug!("Search response from {}: {}", src, service.usn);
                services.push(service);
            }
        }
        Err(ParseError::NotResponse) => {
            tracing::debug!("Ignoring non-response datagram from {}", src);
        }
        Err(e) => {
            tracing::debug!("Invalid search response from {}: {}", src, e);
        }
    }
}

/// Run one pass and forward its services. Returns false once the consumer is gone.
async fn search_and_forward(config: &DiscoveryConfig, tx: &mpsc::Sender<Service>) -> bool {
    match search_once(config).await {
        Ok(services) => {
            tracing::debug!("Search pass found {} service(s)", services.len());
            for service in services {
                if tx.send(service).await.is_err() {
                    tracing::warn!("Service consumer closed, stopping discovery");
                    return false;
                }
            }
        }
        Err(e) => {
            tracing::error!("SSDP search failed, retrying next cycle: {}", e);
        }
    }
    true
}

/// Discovery loop: a warm-up burst of back-to-back searches, then one search
/// every `interval_secs` until cancelled.
pub async fn run_discovery(
    config: DiscoveryConfig,
    tx: mpsc::Sender<Service>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!(
        "Starting SSDP discovery for {} ({} warm-up searches, then every {}s)",
        config.search_target,
        config.warmup_searches,
        config.interval_secs
    );

    for _ in 0..config.warmup_searches {
        tokio::select! {
            keep_going = search_and_forward(&config, &tx) => {
                if !keep_going {
                    return Ok(());
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("SSDP discovery shutting down");
                return Ok(());
            }
        }
    }

    let period = Duration::from_secs(config.interval_secs);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !search_and_forward(&config, &tx).await {
                    break;
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("SSDP discovery shutting down");
                break;
            }
        }
    }

    Ok(())
}
