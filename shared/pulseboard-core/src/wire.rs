//! WebSocket wire protocol shared by the broadcast server and feed consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Snapshot, SnapshotData};

/// Server-to-client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    MetricsUpdate {
        timestamp: DateTime<Utc>,
        data: SnapshotData,
    },
}

impl FeedMessage {
    /// Wrap a snapshot for the wire. The envelope timestamp is the
    /// snapshot's generation time.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::MetricsUpdate {
            timestamp: snapshot.generated_at,
            data: snapshot.data.clone(),
        }
    }
}

/// Client-to-server messages. Inbound text that does not parse as one of
/// these is ignored without error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    RequestUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategorySummary, TimeBucketPoint};

    fn sample_data() -> SnapshotData {
        SnapshotData {
            metrics: vec![CategorySummary {
                category: "revenue".into(),
                count: 3,
                avg: 110.0,
                sum: 330.0,
                max: 120.0,
                min: 100.0,
                latest_timestamp: "2026-08-25T12:00:00Z".parse().unwrap(),
            }],
            time_series: vec![TimeBucketPoint {
                bucket_start: "2026-08-25T12:00:00Z".parse().unwrap(),
                category: "revenue".into(),
                avg: 110.0,
                count: 3,
            }],
        }
    }

    #[test]
    fn test_metrics_update_envelope_shape() {
        let snapshot = Snapshot::new(sample_data());
        let json = serde_json::to_string(&FeedMessage::from_snapshot(&snapshot)).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "metrics_update");
        assert!(value["timestamp"].is_string());
        assert!(value["data"]["metrics"].is_array());
        // Camel-cased key on the wire, snake_case in Rust
        assert!(value["data"]["timeSeries"].is_array());
        assert_eq!(value["data"]["metrics"][0]["category"], "revenue");
        assert_eq!(value["data"]["metrics"][0]["count"], 3);
        assert_eq!(value["data"]["timeSeries"][0]["bucket_start"], "2026-08-25T12:00:00Z");
    }

    #[test]
    fn test_feed_message_roundtrip() {
        let snapshot = Snapshot::new(sample_data());
        let msg = FeedMessage::from_snapshot(&snapshot);
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: FeedMessage = serde_json::from_str(&json).unwrap();

        let FeedMessage::MetricsUpdate { timestamp, data } = parsed;
        assert_eq!(timestamp, snapshot.generated_at);
        assert_eq!(data, snapshot.data);
    }

    #[test]
    fn test_request_update_serializes_bare() {
        let json = serde_json::to_string(&ClientMessage::RequestUpdate).unwrap();
        assert_eq!(json, r#"{"type":"request_update"}"#);
    }

    #[test]
    fn test_request_update_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"request_update"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::RequestUpdate));
        // Extra fields are tolerated
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"request_update","extra":1}"#).unwrap();
        assert!(matches!(msg, ClientMessage::RequestUpdate));
    }

    #[test]
    fn test_unknown_client_message_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"kind":"request_update"}"#).is_err());
    }
}
