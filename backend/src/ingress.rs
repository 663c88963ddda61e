//! HTTP ingress of a verifier process: envelopes POSTed here are fanned out on the local bus.

use crate::bus::{LocalBus, PublishAck};
use crate::errors::NodeError;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use std::sync::Arc;

pub fn router(bus: Arc<LocalBus>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/publish/:subject", post(publish))
        .with_state(bus)
}

async fn publish(
    State(bus): State<Arc<LocalBus>>,
    Path(subject): Path<String>,
    body: Bytes,
) -> Result<Json<PublishAck>, NodeError> {
    let receivers = bus.send(&subject, body)?;
    tracing::debug!(%subject, receivers, "envelope accepted");
    Ok(Json(PublishAck { receivers }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{HttpPublisher, Publisher};

    async fn serve(bus: Arc<LocalBus>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(bus)).await.unwrap() });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn remote_publish_reaches_local_subscriber() {
        let bus = Arc::new(LocalBus::new(4));
        let mut rx = bus.subscribe("vaccine.proof");
        let publisher = HttpPublisher::new(&serve(bus.clone()).await).unwrap();

        let receivers = publisher
            .publish("vaccine.proof", Bytes::from_static(br#"{"proof":""}"#))
            .await
            .unwrap();

        assert_eq!(receivers, 1);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(br#"{"proof":""}"#));
    }

    #[tokio::test]
    async fn remote_publish_without_verifier_is_rejected() {
        let bus = Arc::new(LocalBus::new(4));
        let publisher = HttpPublisher::new(&serve(bus).await).unwrap();

        let err = publisher
            .publish("vaccine.proof", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        match err {
            NodeError::Publish { reason, .. } => assert!(reason.contains("503"), "{reason}"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
