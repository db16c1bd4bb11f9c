use crate::epoch::QueryEpoch;
use crate::models::{Origin, RequestSpec};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

pub type TransportFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// Request/response facility the controller talks to. Implementations own
/// URL building, serialization and retries.
pub trait Transport: Send + Sync {
    fn perform(&self, request: RequestSpec) -> TransportFuture;
}

/// Message posted back to the controller's inbox.
#[derive(Debug)]
pub enum Inbound {
    Query {
        /// Epoch that was current when the request left.
        epoch: Option<QueryEpoch>,
        origin: Origin,
        outcome: Result<Value, String>,
    },
    Patch {
        identity: String,
        outcome: Result<Value, String>,
    },
}

/// Handle remote peers use to push their answers to the current query.
#[derive(Debug, Clone)]
pub struct RemoteFeed {
    sender: mpsc::UnboundedSender<Inbound>,
}

impl RemoteFeed {
    pub(crate) fn new(sender: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { sender }
    }

    /// Returns false once the controller is gone.
    pub fn push(&self, response: Value) -> bool {
        self.sender
            .send(Inbound::Query {
                epoch: None,
                origin: Origin::Remote,
                outcome: Ok(response),
            })
            .is_ok()
    }
}
