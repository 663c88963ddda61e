//! Publish/subscribe seam between the prover and the verifier.
//!
//! [`LocalBus`] keeps one tokio broadcast channel per subject. Every subscriber connected when a
//! message is published receives it exactly once; a publish with no subscriber is rejected.
//! [`HttpPublisher`] delivers to a `LocalBus` living in another process, behind the verifier's
//! ingress (see [`crate::ingress`]).

use crate::errors::NodeError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `subject`, returning how many subscribers it reached.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<usize, NodeError>;
}

/// Acknowledgement returned by the ingress for an accepted publish.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishAck {
    pub receivers: usize,
}

pub struct LocalBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    pub fn subscribe(&self, subject: &str) -> broadcast::Receiver<Bytes> {
        self.sender(subject).subscribe()
    }

    pub fn send(&self, subject: &str, payload: Bytes) -> Result<usize, NodeError> {
        let sender = self.channels.read().get(subject).cloned();
        let Some(sender) = sender else {
            return Err(no_subscribers(subject));
        };

        sender.send(payload).map_err(|_| no_subscribers(subject))
    }

    fn sender(&self, subject: &str) -> broadcast::Sender<Bytes> {
        if let Some(sender) = self.channels.read().get(subject) {
            return sender.clone();
        }
        self.channels
            .write()
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl Publisher for LocalBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<usize, NodeError> {
        self.send(subject, payload)
    }
}

fn no_subscribers(subject: &str) -> NodeError {
    NodeError::Publish {
        subject: subject.to_string(),
        reason: "no subscribers".to_string(),
    }
}

/// Publishes by POSTing envelopes to a verifier's ingress.
pub struct HttpPublisher {
    client: Client,
    base_url: Url,
}

impl HttpPublisher {
    pub fn new(base_url: &str) -> Result<Self, NodeError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| NodeError::Config(format!("invalid verifier url '{base_url}': {e}")))?;
        let client = Client::builder()
            .build()
            .map_err(|e| NodeError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<usize, NodeError> {
        let rejected = |reason: String| NodeError::Publish {
            subject: subject.to_string(),
            reason,
        };

        let url = self
            .base_url
            .join(&format!("publish/{subject}"))
            .map_err(|e| rejected(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| rejected(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejected(format!("{status}: {body}")));
        }

        let ack: PublishAck = response.json().await.map_err(|e| rejected(e.to_string()))?;
        Ok(ack.receivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_rejected() {
        let bus = LocalBus::new(4);
        let err = bus.publish("vaccine.proof", Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, NodeError::Publish { .. }));

        // A subscriber that went away leaves the subject without receivers again.
        drop(bus.subscribe("vaccine.proof"));
        assert!(bus.publish("vaccine.proof", Bytes::from_static(b"x")).await.is_err());
    }

    #[tokio::test]
    async fn every_subscriber_gets_each_message_once() {
        let bus = LocalBus::new(8);
        let mut a = bus.subscribe("vaccine.proof");
        let mut b = bus.subscribe("vaccine.proof");

        for i in 0..3u8 {
            assert_eq!(bus.publish("vaccine.proof", Bytes::from(vec![i])).await.unwrap(), 2);
        }
        for i in 0..3u8 {
            assert_eq!(a.recv().await.unwrap(), Bytes::from(vec![i]));
            assert_eq!(b.recv().await.unwrap(), Bytes::from(vec![i]));
        }
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn subjects_are_isolated() {
        let bus = LocalBus::new(8);
        let mut proofs = bus.subscribe("vaccine.proof");
        let _other = bus.subscribe("other.subject");

        bus.publish("other.subject", Bytes::from_static(b"noise")).await.unwrap();
        bus.publish("vaccine.proof", Bytes::from_static(b"proof")).await.unwrap();

        assert_eq!(proofs.recv().await.unwrap(), Bytes::from_static(b"proof"));
    }

    #[test]
    fn http_publisher_rejects_bad_url() {
        assert!(matches!(HttpPublisher::new("not a url"), Err(NodeError::Config(_))));
        assert!(HttpPublisher::new("http://127.0.0.1:8080/").is_ok());
    }

    #[tokio::test]
    async fn unreachable_verifier_is_a_rejected_publish() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let publisher = HttpPublisher::new(&format!("http://{addr}/")).unwrap();
        let err = publisher
            .publish("vaccine.proof", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Publish { .. }));
    }
}
