use crate::errors::{ControllerError, ControllerResult};
use crate::models::{Item, ItemKind, Origin, QueryResponse, RowAction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const SEARCH_ENDPOINT: &str = "search";
const CHANNELS_ENDPOINT: &str = "metadata/channels";
const OWNED_TORRENTS_ENDPOINT: &str = "mychannel/torrents";

/// The table a controller feeds. Each kind fixes the endpoint and the extra
/// query parameters; everything else is shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum QueryTarget {
    /// Aggregate index search; local and remote answers share one epoch.
    Search {
        #[serde(default, rename = "metadataType")]
        metadata_type: Option<String>,
    },
    /// Channel listing narrowed by a companion filter input.
    FilteredListing { subscribed: bool },
    /// Torrents of one channel.
    ParentScoped {
        #[serde(rename = "publicKey")]
        public_key: String,
        #[serde(rename = "channelId")]
        channel_id: u64,
    },
    /// Torrents of the caller's own channel, editable in place.
    OwnedListing {
        #[serde(rename = "excludeDeleted")]
        exclude_deleted: bool,
    },
}

impl QueryTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::FilteredListing { .. } => "filtered-listing",
            Self::ParentScoped { .. } => "parent-scoped",
            Self::OwnedListing { .. } => "owned-listing",
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            Self::Search { .. } => SEARCH_ENDPOINT.to_string(),
            Self::FilteredListing { .. } => CHANNELS_ENDPOINT.to_string(),
            Self::ParentScoped {
                public_key,
                channel_id,
            } => format!("{CHANNELS_ENDPOINT}/{public_key}/{channel_id}/torrents"),
            Self::OwnedListing { .. } => OWNED_TORRENTS_ENDPOINT.to_string(),
        }
    }

    pub fn extra_params(&self) -> BTreeMap<String, Value> {
        let mut params = BTreeMap::new();
        match self {
            Self::Search { metadata_type } => {
                if let Some(metadata_type) = metadata_type {
                    params.insert("metadata_type".to_string(), json!(metadata_type));
                }
            }
            Self::FilteredListing { subscribed } => {
                params.insert("subscribed".to_string(), json!(subscribed));
            }
            Self::ParentScoped { .. } => {}
            Self::OwnedListing { exclude_deleted } => {
                params.insert("exclude_deleted".to_string(), json!(exclude_deleted));
            }
        }
        params
    }

    /// Targets driven by a filter input lower-case what the user types.
    pub fn binds_filter_input(&self) -> bool {
        !matches!(self, Self::Search { .. })
    }

    pub fn has_row_actions(&self) -> bool {
        !matches!(self, Self::FilteredListing { .. })
    }

    /// Checks fields this target needs beyond the shared response shape.
    pub fn validate(&self, response: &QueryResponse, origin: Origin) -> ControllerResult<()> {
        if matches!(self, Self::OwnedListing { .. })
            && origin == Origin::Local
            && response.dirty.is_none()
        {
            return Err(ControllerError::MalformedResponse(
                "owned listing response has no dirty flag".to_string(),
            ));
        }
        Ok(())
    }

    /// Dirty flag to push into the edit session after an admitted response.
    pub fn post_admission(&self, response: &QueryResponse) -> Option<bool> {
        match self {
            Self::OwnedListing { .. } => response.dirty,
            _ => None,
        }
    }

    pub fn patch_endpoint(&self, identity: &str) -> ControllerResult<String> {
        match self {
            Self::OwnedListing { .. } => Ok(format!("{OWNED_TORRENTS_ENDPOINT}/{identity}")),
            other => Err(ControllerError::Unsupported(format!(
                "{} rows are read-only",
                other.as_str()
            ))),
        }
    }

    /// Endpoint, filter source and extra params of the channel preview.
    pub fn preview_query(&self) -> ControllerResult<(String, String, BTreeMap<String, Value>)> {
        match self {
            Self::ParentScoped { public_key, .. } => {
                let mut params = BTreeMap::new();
                params.insert("metadata_type".to_string(), json!("torrent"));
                Ok((SEARCH_ENDPOINT.to_string(), public_key.clone(), params))
            }
            other => Err(ControllerError::Unsupported(format!(
                "{} has no preview",
                other.as_str()
            ))),
        }
    }

    pub fn eligible_actions(&self, selected: &[&Item]) -> Vec<RowAction> {
        if !self.has_row_actions() || selected.is_empty() {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if selected.len() == 1 {
            actions.push(RowAction::Download);
            actions.push(RowAction::Play);
        }

        if matches!(self, Self::OwnedListing { .. }) {
            actions.push(RowAction::RemoveFromOwnedListing);
        } else if selected.iter().any(|item| item.kind() == ItemKind::Torrent) {
            actions.push(RowAction::AddToOwnedListing);
        }
        actions
    }
}

/// Maps a display column to the attribute the backend stores.
pub fn column_to_attribute(column: &str) -> &str {
    match column {
        "category" => "tags",
        "name" => "title",
        other => other,
    }
}
