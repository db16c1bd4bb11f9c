use crate::epoch::QueryEpoch;
use crate::errors::{ControllerError, ControllerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Torrent,
    Channel,
    Unknown,
}

impl ItemKind {
    fn from_type_field(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("torrent") => Self::Torrent,
            Some("channel") => Self::Channel,
            _ => Self::Unknown,
        }
    }
}

/// One row of a result table: a JSON object as sent by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(Map<String, Value>);

impl Item {
    pub fn from_value(value: Value) -> ControllerResult<Self> {
        let Value::Object(fields) = value else {
            return Err(ControllerError::MalformedResponse(
                "result item is not an object".to_string(),
            ));
        };
        let item = Self(fields);
        if item.identity().is_none() {
            return Err(ControllerError::MalformedResponse(
                "result item has no identity field".to_string(),
            ));
        }
        Ok(item)
    }

    /// `infohash` for torrents, `public_key:id` for channels, plain `id`
    /// otherwise.
    pub fn identity(&self) -> Option<String> {
        if let Some(infohash) = self.0.get("infohash").and_then(Value::as_str) {
            return Some(infohash.to_string());
        }
        let id = self.0.get("id").and_then(scalar_to_string);
        match (self.0.get("public_key").and_then(Value::as_str), id) {
            (Some(public_key), Some(id)) => Some(format!("{public_key}:{id}")),
            (None, Some(id)) => Some(id),
            _ => None,
        }
    }

    pub fn kind(&self) -> ItemKind {
        ItemKind::from_type_field(self.0.get("type"))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn set(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_string(), value);
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub column: String,
    pub ascending: bool,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, ascending: bool) -> Self {
        Self {
            column: column.into(),
            ascending,
        }
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::new("name", true)
    }
}

/// Page range requested from the backend, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationWindow {
    pub first: u32,
    pub last: u32,
}

impl PaginationWindow {
    pub fn new(first: u32, last: u32) -> ControllerResult<Self> {
        if first < 1 || last <= first {
            return Err(ControllerError::Internal(format!(
                "invalid pagination window [{first}, {last})"
            )));
        }
        Ok(Self { first, last })
    }

    /// Rejects windows that are not 1-based or have no width, including a
    /// window saturated at the end of the row range.
    pub fn checked(self) -> ControllerResult<Self> {
        Self::new(self.first, self.last)
    }

    pub fn first_page(batch_size: u32) -> Self {
        Self::following(0, batch_size)
    }

    /// Window for the page after `loaded` rows.
    pub fn following(loaded: usize, batch_size: u32) -> Self {
        let loaded = u32::try_from(loaded).unwrap_or(u32::MAX);
        Self {
            first: loaded.saturating_add(1),
            last: loaded.saturating_add(batch_size),
        }
    }
}

/// Inbound answer to a paginated query, local or remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub results: Vec<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
}

impl QueryResponse {
    /// `Ok(None)` for an empty answer; an error when a required field is
    /// missing or mistyped.
    pub fn parse(value: Value) -> ControllerResult<Option<Self>> {
        if is_falsy(&value) {
            return Ok(None);
        }
        let Value::Object(mut fields) = value else {
            return Err(ControllerError::MalformedResponse(
                "query response is not an object".to_string(),
            ));
        };

        let uuid = match fields.remove("uuid") {
            None | Some(Value::Null) => None,
            Some(Value::String(token)) => Some(token),
            Some(other) => {
                return Err(ControllerError::MalformedResponse(format!(
                    "uuid must be a string, got {other}"
                )))
            }
        };

        let results = match fields.remove("results") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(Item::from_value)
                .collect::<ControllerResult<Vec<_>>>()?,
            _ => {
                return Err(ControllerError::MalformedResponse(
                    "query response has no results list".to_string(),
                ))
            }
        };

        let total = match fields.remove("total") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().ok_or_else(|| {
                ControllerError::MalformedResponse(format!("total must be a count, got {value}"))
            })?),
        };

        let dirty = match fields.remove("dirty") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(flag)) => Some(flag),
            Some(other) => {
                return Err(ControllerError::MalformedResponse(format!(
                    "dirty must be a boolean, got {other}"
                )))
            }
        };

        Ok(Some(Self {
            uuid,
            results,
            total,
            dirty,
        }))
    }
}

/// Answer to a single-item PATCH on the owned listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResponse {
    pub dirty: bool,
}

impl PatchResponse {
    pub fn parse(value: Value) -> ControllerResult<Option<Self>> {
        if is_falsy(&value) {
            return Ok(None);
        }
        match value.get("dirty").and_then(Value::as_bool) {
            Some(dirty) => Ok(Some(Self { dirty })),
            None => Err(ControllerError::MalformedResponse(
                "patch response has no dirty flag".to_string(),
            )),
        }
    }
}

pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Outgoing query parameters. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryParams {
    pub uuid: String,
    pub filter: String,
    pub sort_by: String,
    pub sort_asc: bool,
    pub first: u32,
    pub last: u32,
    pub hide_xxx: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    pub method: RequestMethod,
    pub endpoint: String,
    pub params: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowAction {
    Download,
    Play,
    AddToOwnedListing,
    RemoveFromOwnedListing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ControllerEvent {
    QueryComplete {
        response: QueryResponse,
        origin: Origin,
    },
    CountChanged {
        total: u64,
        label: String,
    },
    RequestFailed {
        code: String,
        reason: String,
    },
    DirtyChanged {
        dirty: bool,
    },
    SelectionChanged {
        item: Option<Item>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub epoch: Option<QueryEpoch>,
    pub event: ControllerEvent,
}
