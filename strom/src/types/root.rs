//! Filesystem roots exposed by the client

use serde::{Deserialize, Serialize};

/// List of commands for roots
pub mod commands {
    /// Command name asking the client for its root listing.
    pub const LIST: &str = "roots/list";

    /// Notification name announcing a change to the root listing.
    pub const LIST_CHANGED: &str = "notifications/roots/list_changed";
}

/// A root directory or file the client operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// The URI of the root; must start with `file://`.
    pub uri: String,

    /// An optional human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Root {
    /// Creates a new [`Root`]
    pub fn new(uri: &str, name: &str) -> Self {
        Self {
            uri: uri.into(),
            name: Some(name.into()),
        }
    }
}

/// The client's reply to a `roots/list` request.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// The roots currently exposed.
    pub roots: Vec<Root>,
}

crate::types::response::impl_into_response! {
    ListRootsResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_roots() {
        let result = ListRootsResult {
            roots: vec![Root::new("file:///work", "work")],
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ListRootsResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.roots[0].uri, "file:///work");
    }
}
