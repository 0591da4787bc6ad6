//! `rdssh://connect?id=<uuid>` activations.
//!
//! Activations can arrive before the UI thread has its first window up; they
//! wait on a readiness gate and then run one at a time.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use uuid::Uuid;

pub const SCHEME: &str = "rdssh";

/// The connection id of a connect URI, or `None` for anything else.
pub fn parse_connect_uri(uri: &str) -> Option<Uuid> {
    let uri = uri.trim();
    let (scheme, rest) = uri.split_once("://")?;
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return None;
    }

    let (target, query) = rest.split_once('?')?;
    if !target.trim_end_matches('/').eq_ignore_ascii_case("connect") {
        return None;
    }

    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.eq_ignore_ascii_case("id"))
        .and_then(|(_, value)| Uuid::parse_str(value.trim_matches(['{', '}'])).ok())
}

#[derive(Clone)]
pub struct Activations {
    ready: Arc<watch::Sender<bool>>,
    serial: Arc<Mutex<()>>,
}

impl Default for Activations {
    fn default() -> Self {
        Self::new()
    }
}

impl Activations {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            ready: Arc::new(ready),
            serial: Arc::new(Mutex::new(())),
        }
    }

    /// Opens the gate for queued and future activations.
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
        tracing::debug!("activation gate open");
    }

    /// Runs `launch` for the URI's connection once the gate is open. Malformed
    /// URIs are dropped with a warning.
    pub async fn handle<F, Fut>(&self, uri: &str, launch: F) -> Option<Fut::Output>
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future,
    {
        let Some(id) = parse_connect_uri(uri) else {
            tracing::warn!(%uri, "ignoring malformed activation uri");
            return None;
        };

        let mut ready = self.ready.subscribe();
        if ready.wait_for(|open| *open).await.is_err() {
            return None;
        }

        let _turn = self.serial.lock().await;
        tracing::info!(connection_id = %id, "handling activation");
        Some(launch(id).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    const ID: &str = "5f2b6a8e-3c1d-4e7f-9a0b-1c2d3e4f5a6b";

    #[test]
    fn parses_connect_uris() {
        let id = Uuid::parse_str(ID).expect("uuid");
        assert_eq!(parse_connect_uri(&format!("rdssh://connect?id={ID}")), Some(id));
        assert_eq!(parse_connect_uri(&format!("RDSSH://Connect/?foo=1&ID={{{ID}}}")), Some(id));
        assert_eq!(parse_connect_uri(&format!("rdssh://connect?id={ID}#tab")), Some(id));
    }

    #[test]
    fn rejects_everything_else() {
        assert_eq!(parse_connect_uri(&format!("http://connect?id={ID}")), None);
        assert_eq!(parse_connect_uri(&format!("rdssh://open?id={ID}")), None);
        assert_eq!(parse_connect_uri("rdssh://connect?id=not-a-guid"), None);
        assert_eq!(parse_connect_uri("rdssh://connect"), None);
        assert_eq!(parse_connect_uri(""), None);
    }

    #[tokio::test]
    async fn malformed_uri_never_launches() {
        let activations = Activations::new();
        activations.mark_ready();
        let result = activations.handle("rdssh://connect?id=x", |_| async {}).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn waits_for_the_gate() {
        let activations = Activations::new();
        let launched = Arc::new(AtomicBool::new(false));

        let pending = {
            let activations = activations.clone();
            let launched = Arc::clone(&launched);
            tokio::spawn(async move {
                activations
                    .handle(&format!("rdssh://connect?id={ID}"), |_| async move {
                        launched.store(true, Ordering::SeqCst);
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!launched.load(Ordering::SeqCst));

        activations.mark_ready();
        assert!(pending.await.expect("task").is_some());
        assert!(launched.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_one_activation_at_a_time() {
        let activations = Activations::new();
        activations.mark_ready();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let activations = activations.clone();
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    activations
                        .handle(&format!("rdssh://connect?id={ID}"), |_| async move {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("task");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
