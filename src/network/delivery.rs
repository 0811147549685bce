// src/network/delivery.rs

use crate::app_config::Settings;
use crate::errors::TrackerError;
use crate::event_types::PageViewPayload;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Cloneable handle to the delivery actor. Both send paths are synchronous
/// fire-and-forget: telemetry never blocks and never throws into the viewer.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<DeliveryCommand>,
}

#[derive(Debug)]
pub(crate) enum DeliveryCommand {
    /// Ordinary periodic / navigation flush.
    Flush(PageViewPayload),
    /// Teardown flush.
    FinalFlush(PageViewPayload),
}

impl DeliveryHandle {
    pub(crate) fn from_sender(tx: mpsc::Sender<DeliveryCommand>) -> Self {
        DeliveryHandle { tx }
    }

    pub fn flush(&self, payload: PageViewPayload) {
        if let Err(e) = self.tx.try_send(DeliveryCommand::Flush(payload)) {
            tracing::warn!("Delivery: dropping flush, channel unavailable: {}", e);
        }
    }

    pub fn final_flush(&self, payload: PageViewPayload) {
        if let Err(e) = self.tx.try_send(DeliveryCommand::FinalFlush(payload)) {
            tracing::warn!("Delivery: dropping final flush, channel unavailable: {}", e);
        }
    }
}

struct DeliveryActor {
    client: Client,
    endpoint_url: String,
}

impl DeliveryActor {
    fn new(settings: &Settings) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .user_agent(format!(
                "document_view_tracker/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .use_rustls_tls()
            .build()?;
        Ok(DeliveryActor {
            client,
            endpoint_url: settings.endpoint_url.clone(),
        })
    }

    /// Posts one payload. All failures are logged and swallowed: a lost
    /// flush is superseded by the next periodic one.
    async fn deliver(&self, payload: &PageViewPayload, is_final: bool) {
        tracing::debug!(
            "Delivery: {} flush for page {} ({}ms)",
            if is_final { "final" } else { "interval" },
            payload.page_number,
            payload.duration
        );
        let result = self
            .client
            .post(&self.endpoint_url)
            .json(payload)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        match result {
            Ok(resp) => {
                tracing::trace!("Delivery: flush accepted, status {}", resp.status());
            }
            Err(e) => {
                tracing::warn!(
                    "Delivery: flush for page {} failed (discarded): {}",
                    payload.page_number,
                    e
                );
            }
        }
    }
}

/// The actor runs until every `DeliveryHandle` is dropped and the queue is
/// empty. That is the teardown-safety guarantee: a final flush enqueued
/// while the viewer is shutting down still gets its delivery attempt, while
/// the requests of a viewer killed outright are simply abandoned.
async fn run_delivery_actor(
    settings: Arc<Settings>,
    mut rx: mpsc::Receiver<DeliveryCommand>,
) -> Result<(), TrackerError> {
    let actor = DeliveryActor::new(&settings)?;
    tracing::info!("Delivery actor started. Endpoint: {}", settings.endpoint_url);

    while let Some(command) = rx.recv().await {
        match command {
            DeliveryCommand::Flush(payload) => actor.deliver(&payload, false).await,
            DeliveryCommand::FinalFlush(payload) => actor.deliver(&payload, true).await,
        }
    }

    tracing::info!("Delivery actor: all handles dropped, queue drained, shutting down.");
    Ok(())
}

/// Spawns the delivery actor and returns its cloneable handle plus join
/// handle. Drop every handle and await the task to guarantee the queue has
/// been drained.
pub fn create_delivery_channel(
    settings: Arc<Settings>,
    buffer_size: usize,
) -> (
    DeliveryHandle,
    tokio::task::JoinHandle<Result<(), TrackerError>>,
) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = DeliveryHandle { tx };
    let task = tokio::spawn(run_delivery_actor(settings, rx));
    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_types::PageViewPayload;
    use std::path::PathBuf;

    fn test_settings() -> Arc<Settings> {
        // Port 9 (discard) refuses connections immediately; failures are
        // swallowed by design so the actor still drains and exits.
        Arc::new(Settings {
            endpoint_url: "http://127.0.0.1:9/api/record_view".to_string(),
            inactivity_threshold_ms: 60_000,
            interval_flush_ms: 10_000,
            idle_poll_ms: 1_000,
            preload_ahead_count: 2,
            preload_behind_count: 4,
            min_preloaded_count: 5,
            request_timeout_ms: 500,
            connect_timeout_ms: 500,
            internal_log_level: "info".to_string(),
            internal_log_file_dir: PathBuf::from("logs"),
            internal_log_file_name: "view_tracker.log".to_string(),
        })
    }

    fn payload(page: u32, duration: u64) -> PageViewPayload {
        PageViewPayload {
            link_id: "link-1".to_string(),
            document_id: "doc-1".to_string(),
            view_id: None,
            duration,
            page_number: page,
            version_number: 1,
            dataroom_id: None,
        }
    }

    #[test]
    fn payload_serializes_camel_case_without_empty_options() {
        let value = serde_json::to_value(payload(4, 7000)).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["linkId"], "link-1");
        assert_eq!(obj["documentId"], "doc-1");
        assert_eq!(obj["duration"], 7000);
        assert_eq!(obj["pageNumber"], 4);
        assert_eq!(obj["versionNumber"], 1);
        assert!(!obj.contains_key("viewId"));
        assert!(!obj.contains_key("dataroomId"));
    }

    #[tokio::test]
    async fn actor_drains_final_flush_then_exits() {
        let (handle, task) = create_delivery_channel(test_settings(), 16);

        // Teardown ordering: the final flush is enqueued before the last
        // handle drops, so the actor must attempt it before exiting.
        handle.final_flush(payload(4, 7000));
        drop(handle);

        let result = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("delivery actor did not drain and exit")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn handle_never_errors_when_actor_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let handle = DeliveryHandle::from_sender(tx);
        drop(rx);
        // Both paths swallow the closed-channel error.
        handle.flush(payload(1, 100));
        handle.final_flush(payload(1, 100));
    }
}
