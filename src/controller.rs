use crate::config::ControllerConfig;
use crate::epoch::QueryEpoch;
use crate::errors::{ControllerError, ControllerResult};
use crate::filter::compile_filter;
use crate::merger::{ResultCollection, ResultMerger};
use crate::models::{
    ControllerEvent, EventEnvelope, Item, ItemKind, Origin, PaginationWindow, PatchResponse,
    QueryParams, QueryResponse, RequestMethod, RequestSpec, RowAction, SortSpec,
};
use crate::transport::{Inbound, RemoteFeed, Transport};
use crate::variants::{column_to_attribute, QueryTarget};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// What a dispatch put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTicket {
    pub epoch: QueryEpoch,
    pub window: PaginationWindow,
    pub request: RequestSpec,
}

/// Drives one result table. All state changes happen on the owner's turn
/// through `&mut self`; spawned request tasks only post to the inbox.
pub struct QueryController {
    target: QueryTarget,
    config: ControllerConfig,
    transport: Arc<dyn Transport>,
    merger: ResultMerger,
    collection: ResultCollection,
    current_epoch: Option<QueryEpoch>,
    window: PaginationWindow,
    filter_text: String,
    sort: SortSpec,
    total_count: Option<u64>,
    in_flight: Option<JoinHandle<()>>,
    events: broadcast::Sender<EventEnvelope>,
    event_seq: u64,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    edit_session: watch::Sender<Option<bool>>,
}

impl QueryController {
    pub fn new(
        target: QueryTarget,
        transport: Arc<dyn Transport>,
        config: ControllerConfig,
    ) -> ControllerResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (edit_session, _) = watch::channel(None);
        Ok(Self {
            merger: ResultMerger::new(config.duplicate_policy),
            window: PaginationWindow::first_page(config.batch_size),
            sort: config.default_sort.clone(),
            target,
            config,
            transport,
            collection: ResultCollection::new(),
            current_epoch: None,
            filter_text: String::new(),
            total_count: None,
            in_flight: None,
            events,
            event_seq: 0,
            inbox_tx,
            inbox_rx,
            edit_session,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn remote_feed(&self) -> RemoteFeed {
        RemoteFeed::new(self.inbox_tx.clone())
    }

    /// Dirty state of the owned channel; `None` until the backend reports it.
    pub fn edit_session(&self) -> watch::Receiver<Option<bool>> {
        self.edit_session.subscribe()
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    pub fn items(&self) -> &[Item] {
        self.collection.items()
    }

    pub fn collection(&self) -> &ResultCollection {
        &self.collection
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn current_epoch(&self) -> Option<QueryEpoch> {
        self.current_epoch
    }

    pub fn window(&self) -> PaginationWindow {
        self.window
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn is_request_in_flight(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn reset_and_query(
        &mut self,
        explicit_window: Option<PaginationWindow>,
    ) -> ControllerResult<DispatchTicket> {
        if let Some(window) = explicit_window {
            window.checked()?;
        }
        self.start_epoch(explicit_window);
        self.dispatch(BTreeMap::new())
    }

    /// Fetches the page after the loaded rows. Does nothing until the first
    /// page has landed.
    pub fn continue_query(&mut self) -> ControllerResult<Option<DispatchTicket>> {
        if self.collection.is_empty() {
            tracing::debug!(target_kind = self.target.as_str(), "continue ignored on empty table");
            return Ok(None);
        }
        self.window =
            PaginationWindow::following(self.collection.len(), self.config.batch_size).checked()?;
        self.dispatch(BTreeMap::new()).map(Some)
    }

    pub fn on_scroll(&mut self, at_bottom: bool) -> ControllerResult<Option<DispatchTicket>> {
        if !at_bottom {
            return Ok(None);
        }
        self.continue_query()
    }

    pub fn set_sort(&mut self, sort: SortSpec) -> ControllerResult<DispatchTicket> {
        self.sort = sort;
        self.reset_and_query(None)
    }

    pub fn set_filter_text(&mut self, text: &str) -> ControllerResult<DispatchTicket> {
        self.filter_text = if self.target.binds_filter_input() {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        self.reset_and_query(None)
    }

    pub fn refresh(&mut self) -> ControllerResult<DispatchTicket> {
        self.reset_and_query(None)
    }

    pub fn dispatch(
        &mut self,
        extra_params: BTreeMap<String, Value>,
    ) -> ControllerResult<DispatchTicket> {
        let endpoint = self.target.endpoint();
        let filter = compile_filter(&self.filter_text);
        let mut extra = self.target.extra_params();
        extra.extend(extra_params);
        self.send_query(endpoint, filter, extra)
    }

    /// One-shot search for the torrents of the scoped channel. Starts its own
    /// epoch; the next reset replaces it.
    pub fn fetch_preview(&mut self) -> ControllerResult<DispatchTicket> {
        let (endpoint, filter_source, extra) = self.target.preview_query()?;
        self.start_epoch(None);
        self.send_query(endpoint, compile_filter(&filter_source), extra)
    }

    /// Writes one field of one owned row. Applied locally right away; the
    /// backend answer only updates the edit session.
    pub fn patch_field(
        &mut self,
        identity: &str,
        column: &str,
        value: Value,
    ) -> ControllerResult<RequestSpec> {
        let endpoint = self.target.patch_endpoint(identity)?;
        let attribute = column_to_attribute(column);
        let patched_locally =
            self.merger
                .patch_item(&mut self.collection, identity, attribute, value.clone());

        let mut body = Map::new();
        body.insert(attribute.to_string(), value);
        let request = RequestSpec {
            method: RequestMethod::Patch,
            endpoint,
            params: Map::new(),
            body: Some(Value::Object(body)),
        };
        tracing::debug!(
            identity = %identity,
            attribute = %attribute,
            patched_locally,
            "issuing row patch"
        );

        let pending = self.transport.perform(request.clone());
        let inbox = self.inbox_tx.clone();
        let identity = identity.to_string();
        tokio::spawn(async move {
            let outcome = pending.await.map_err(|error| format!("{error:#}"));
            let _ = inbox.send(Inbound::Patch { identity, outcome });
        });
        Ok(request)
    }

    /// Admits or discards one query answer. `Ok(true)` when it was merged.
    pub fn on_response(&mut self, response: Value, origin: Origin) -> ControllerResult<bool> {
        self.admit_response(response, origin, None)
    }

    pub fn on_patch_response(&mut self, response: Value) -> ControllerResult<bool> {
        let Some(patch) = PatchResponse::parse(response)? else {
            return Ok(false);
        };
        self.reconcile_dirty(patch.dirty);
        Ok(true)
    }

    /// Waits for the next inbound message and handles it.
    pub async fn process_next(&mut self) -> Option<ControllerResult<bool>> {
        let inbound = self.inbox_rx.recv().await?;
        Some(self.handle_inbound(inbound))
    }

    /// Handles everything already in the inbox. Returns how many messages
    /// were consumed.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(inbound) = self.inbox_rx.try_recv() {
            let _ = self.handle_inbound(inbound);
            handled += 1;
        }
        handled
    }

    /// Emits the row under the selection for the details pane, or `None`
    /// when the pane should hide.
    pub fn select_rows(&mut self, rows: &[usize]) -> Option<Item> {
        let item = rows
            .first()
            .and_then(|row| self.collection.get(*row))
            .filter(|item| item.kind() != ItemKind::Channel)
            .cloned();
        self.emit(ControllerEvent::SelectionChanged { item: item.clone() });
        item
    }

    pub fn eligible_actions(&self, rows: &[usize]) -> Vec<RowAction> {
        let selected = rows
            .iter()
            .filter_map(|row| self.collection.get(*row))
            .collect::<Vec<_>>();
        self.target.eligible_actions(&selected)
    }

    fn start_epoch(&mut self, explicit_window: Option<PaginationWindow>) {
        let epoch = QueryEpoch::mint();
        self.current_epoch = Some(epoch);
        self.collection.clear();
        self.total_count = None;
        self.window =
            explicit_window.unwrap_or_else(|| PaginationWindow::first_page(self.config.batch_size));
        tracing::debug!(epoch = %epoch, target_kind = self.target.as_str(), "started query epoch");
    }

    fn send_query(
        &mut self,
        endpoint: String,
        filter: String,
        extra: BTreeMap<String, Value>,
    ) -> ControllerResult<DispatchTicket> {
        let epoch = match self.current_epoch {
            Some(epoch) => epoch,
            None => {
                let epoch = QueryEpoch::mint();
                self.current_epoch = Some(epoch);
                epoch
            }
        };

        let params = QueryParams {
            uuid: epoch.as_token(),
            filter,
            sort_by: self.sort.column.clone(),
            sort_asc: self.sort.ascending,
            first: self.window.first,
            last: self.window.last,
            hide_xxx: self.config.hide_xxx,
            extra,
        };
        let Value::Object(params) = serde_json::to_value(&params)? else {
            return Err(ControllerError::Internal(
                "query parameters did not serialize to an object".to_string(),
            ));
        };
        let request = RequestSpec {
            method: RequestMethod::Get,
            endpoint,
            params,
            body: None,
        };
        tracing::debug!(
            epoch = %epoch,
            endpoint = %request.endpoint,
            first = self.window.first,
            last = self.window.last,
            "dispatching query"
        );

        let pending = self.transport.perform(request.clone());
        let inbox = self.inbox_tx.clone();
        // A previous request keeps running; its answer is filtered by epoch.
        self.in_flight = Some(tokio::spawn(async move {
            let outcome = pending.await.map_err(|error| format!("{error:#}"));
            let _ = inbox.send(Inbound::Query {
                epoch: Some(epoch),
                origin: Origin::Local,
                outcome,
            });
        }));

        Ok(DispatchTicket {
            epoch,
            window: self.window,
            request,
        })
    }

    fn handle_inbound(&mut self, inbound: Inbound) -> ControllerResult<bool> {
        let mut failed_epoch = self.current_epoch;
        let result = match inbound {
            Inbound::Query {
                epoch,
                origin,
                outcome: Ok(response),
            } => self.admit_response(response, origin, epoch),
            Inbound::Query {
                epoch: Some(epoch),
                origin,
                outcome: Err(reason),
            } if self.current_epoch != Some(epoch) => {
                tracing::debug!(
                    epoch = %epoch,
                    origin = origin.as_str(),
                    error = %reason,
                    "superseded request failed"
                );
                return Ok(false);
            }
            Inbound::Query {
                epoch,
                origin,
                outcome: Err(reason),
            } => {
                failed_epoch = epoch;
                tracing::warn!(
                    epoch = ?epoch.map(|epoch| epoch.to_string()),
                    origin = origin.as_str(),
                    error = %reason,
                    "query request failed"
                );
                Err(ControllerError::Transport(reason))
            }
            Inbound::Patch {
                identity,
                outcome: Ok(response),
            } => self.on_patch_response(response).inspect_err(|error| {
                tracing::warn!(identity = %identity, error = %error, "row patch answer rejected");
            }),
            Inbound::Patch {
                identity,
                outcome: Err(reason),
            } => {
                tracing::warn!(identity = %identity, error = %reason, "row patch failed");
                Err(ControllerError::Transport(reason))
            }
        };

        if let Err(error) = &result {
            let event = ControllerEvent::RequestFailed {
                code: error.error_code().to_string(),
                reason: error.to_string(),
            };
            self.emit_for(failed_epoch.or(self.current_epoch), event);
        }
        result
    }

    fn admit_response(
        &mut self,
        response: Value,
        origin: Origin,
        request_epoch: Option<QueryEpoch>,
    ) -> ControllerResult<bool> {
        // Stale answers are dropped before their shape is checked.
        let token = response.get("uuid").and_then(Value::as_str);
        if !self.is_current(token, request_epoch) {
            tracing::debug!(
                origin = origin.as_str(),
                token = ?token,
                "discarded stale response"
            );
            return Ok(false);
        }

        let Some(response) = QueryResponse::parse(response).inspect_err(|error| {
            tracing::warn!(origin = origin.as_str(), error = %error, "malformed query response");
        })?
        else {
            return Ok(false);
        };
        self.target.validate(&response, origin)?;

        let outcome = self
            .merger
            .merge(&mut self.collection, response.results.clone(), origin);
        tracing::debug!(
            origin = origin.as_str(),
            appended = outcome.appended,
            rows = self.collection.len(),
            "admitted response"
        );

        if origin == Origin::Local {
            if let Some(total) = response.total {
                self.total_count = Some(total);
                self.emit(ControllerEvent::CountChanged {
                    total,
                    label: format!("{total} results"),
                });
            }
        }

        let dirty = self.target.post_admission(&response);
        self.emit(ControllerEvent::QueryComplete { response, origin });
        if let Some(dirty) = dirty {
            self.reconcile_dirty(dirty);
        }
        Ok(true)
    }

    /// The echoed token decides; without one, the epoch captured when the
    /// request left decides; without either the answer is admitted.
    fn is_current(&self, token: Option<&str>, request_epoch: Option<QueryEpoch>) -> bool {
        let Some(current) = self.current_epoch else {
            return true;
        };
        match (token, request_epoch) {
            (Some(token), _) => current.matches_token(token),
            (None, Some(request_epoch)) => request_epoch == current,
            (None, None) => true,
        }
    }

    fn reconcile_dirty(&mut self, dirty: bool) {
        self.edit_session.send_replace(Some(dirty));
        self.emit(ControllerEvent::DirtyChanged { dirty });
    }

    fn emit(&mut self, event: ControllerEvent) {
        self.emit_for(self.current_epoch, event);
    }

    fn emit_for(&mut self, epoch: Option<QueryEpoch>, event: ControllerEvent) {
        self.event_seq += 1;
        let envelope = EventEnvelope {
            event_id: Uuid::new_v4().to_string(),
            seq: self.event_seq,
            timestamp: Utc::now(),
            epoch,
            event,
        };
        let _ = self.events.send(envelope);
    }
}
