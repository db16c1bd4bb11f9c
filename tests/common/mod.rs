#![allow(dead_code)]

use query_reconciler::{
    ControllerConfig, EventEnvelope, QueryController, QueryTarget, RequestSpec, Transport,
    TransportFuture,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

type Reply = oneshot::Sender<anyhow::Result<Value>>;

/// Transport whose answers are released by the test, in any order.
#[derive(Default)]
pub struct GatedTransport {
    pending: Mutex<Vec<(RequestSpec, Option<Reply>)>>,
}

impl GatedTransport {
    pub fn requests(&self) -> Vec<RequestSpec> {
        self.pending
            .lock()
            .expect("pending lock")
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    pub fn request(&self, index: usize) -> RequestSpec {
        self.requests()
            .get(index)
            .cloned()
            .expect("request was issued")
    }

    pub fn answer(&self, index: usize, response: Value) {
        self.reply(index, Ok(response));
    }

    pub fn fail(&self, index: usize, reason: &str) {
        self.reply(index, Err(anyhow::anyhow!(reason.to_string())));
    }

    fn reply(&self, index: usize, outcome: anyhow::Result<Value>) {
        let sender = self.pending.lock().expect("pending lock")[index]
            .1
            .take()
            .expect("request not answered yet");
        let _ = sender.send(outcome);
    }
}

impl Transport for GatedTransport {
    fn perform(&self, request: RequestSpec) -> TransportFuture {
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock")
            .push((request, Some(sender)));
        Box::pin(async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("request dropped")))
        })
    }
}

pub fn controller(target: QueryTarget) -> (QueryController, Arc<GatedTransport>) {
    let transport = Arc::new(GatedTransport::default());
    let controller = QueryController::new(target, transport.clone(), ControllerConfig::default())
        .expect("controller");
    (controller, transport)
}

pub fn param<'a>(request: &'a RequestSpec, name: &str) -> &'a Value {
    request.params.get(name).expect("query parameter present")
}

pub async fn next(controller: &mut QueryController) -> query_reconciler::ControllerResult<bool> {
    tokio::time::timeout(Duration::from_secs(5), controller.process_next())
        .await
        .expect("inbound message arrived")
        .expect("inbox open")
}

pub fn drain(events: &mut broadcast::Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut seen = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        seen.push(envelope);
    }
    seen
}
