use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::coordinator::PlatformEvent;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports whether the remote backend is reachable by polling its health URL.
pub struct ConnectivityProbe {
    client: reqwest::Client,
    health_url: String,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(client: reqwest::Client, remote_url: &str, interval: Duration) -> Self {
        Self {
            client,
            health_url: format!("{}/health", remote_url.trim_end_matches('/')),
            interval,
        }
    }

    pub async fn check(&self) -> bool {
        match self
            .client
            .get(&self.health_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!("Connectivity probe failed: {e}");
                false
            }
        }
    }

    /// Send a `Connectivity` event whenever reachability changes, until shutdown.
    pub async fn run(self, events: mpsc::Sender<PlatformEvent>, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Connectivity probe started ({})", self.health_url);

        let mut last = None;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let online = self.check().await;
            if last != Some(online) {
                last = Some(online);
                if events.send(PlatformEvent::Connectivity(online)).await.is_err() {
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Connectivity probe stopped");
    }
}
