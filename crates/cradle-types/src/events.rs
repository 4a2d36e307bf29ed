use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feed::FeedItem;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, email: String },

    /// The aggregated feed of the watched child changed
    FeedUpdate {
        child_id: String,
        items: Vec<FeedItem>,
    },

    /// A command was rejected
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start streaming the feed of one child, replacing any previous watch
    WatchFeed { child_id: String },

    /// Stop streaming
    Unwatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_type_data_tagging() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"WatchFeed","data":{"child_id":"c1"}}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::WatchFeed { child_id } if child_id == "c1"));

        let cmd: GatewayCommand = serde_json::from_str(r#"{"type":"Unwatch"}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Unwatch));
    }
}
