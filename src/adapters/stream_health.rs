//! Stream health adapter
//!
//! Watches one or more live streams. For each watched stream it keeps only
//! the latest health snapshot and a rolling list of the most recent
//! `alert_limit` alerts. Updates for streams that are not watched are
//! ignored. `summary` aggregates the latest status across all watched
//! streams for multi-stream dashboards.
//!
//! Inbound: `stream.health.update`, `stream.health.alert`.
//! Outbound: `stream.health.subscribe`, `stream.health.unsubscribe`.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::{announce_on_connect, lock, push_bounded};
use crate::client::RealtimeClient;
use crate::config::AdapterSettings;
use crate::router::Subscription;
use crate::transport::TypedEnvelope;

pub const HEALTH_UPDATE: &str = "stream.health.update";
pub const HEALTH_ALERT: &str = "stream.health.alert";
pub const HEALTH_SUBSCRIBE: &str = "stream.health.subscribe";
pub const HEALTH_UNSUBSCRIBE: &str = "stream.health.unsubscribe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Offline,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    #[serde(alias = "eventId")]
    pub stream_id: String,
    pub status: HealthStatus,
    #[serde(default)]
    pub bitrate_kbps: Option<f64>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub dropped_frames: Option<u64>,
    #[serde(default)]
    pub viewer_count: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAlert {
    #[serde(alias = "eventId")]
    pub stream_id: String,
    #[serde(default)]
    pub alert_id: Option<String>,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default)]
    pub raised_at: Option<DateTime<Utc>>,
}

/// Count of watched streams per latest status. Streams without a snapshot
/// yet count as `unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub offline: usize,
    pub unknown: usize,
}

impl HealthSummary {
    pub fn total(&self) -> usize {
        self.healthy + self.warning + self.critical + self.offline + self.unknown
    }
}

#[derive(Debug)]
struct HealthState {
    watched: BTreeSet<String>,
    snapshots: HashMap<String, HealthSnapshot>,
    alerts: HashMap<String, VecDeque<HealthAlert>>,
    alert_limit: usize,
}

pub struct StreamHealthMonitor {
    client: RealtimeClient,
    state: Arc<Mutex<HealthState>>,
    subscriptions: Vec<Subscription>,
}

impl StreamHealthMonitor {
    /// Watches a single stream.
    pub fn watch(client: &RealtimeClient, stream_id: impl Into<String>, settings: &AdapterSettings) -> Self {
        let stream_id: String = stream_id.into();
        Self::watch_many(client, [stream_id], settings)
    }

    pub fn watch_many<I, S>(client: &RealtimeClient, stream_ids: I, settings: &AdapterSettings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = Arc::new(Mutex::new(HealthState {
            watched: stream_ids.into_iter().map(Into::into).collect(),
            snapshots: HashMap::new(),
            alerts: HashMap::new(),
            alert_limit: settings.alert_limit,
        }));

        let on_update = {
            let state = state.clone();
            client.subscribe_typed(HEALTH_UPDATE, move |envelope: TypedEnvelope<HealthSnapshot>| {
                let snapshot = envelope.payload;
                let mut state = lock(&state);
                if state.watched.contains(&snapshot.stream_id) {
                    state.snapshots.insert(snapshot.stream_id.clone(), snapshot);
                }
            })
        };

        let on_alert = {
            let state = state.clone();
            client.subscribe_typed(HEALTH_ALERT, move |envelope: TypedEnvelope<HealthAlert>| {
                let alert = envelope.payload;
                let mut state = lock(&state);
                if !state.watched.contains(&alert.stream_id) {
                    return;
                }
                let limit = state.alert_limit;
                let alerts = state.alerts.entry(alert.stream_id.clone()).or_default();
                push_bounded(alerts, alert, limit);
            })
        };

        let on_connect = {
            let state = state.clone();
            announce_on_connect(client, move |client| {
                let watched: Vec<String> = lock(&state).watched.iter().cloned().collect();
                for stream_id in watched {
                    client.send(HEALTH_SUBSCRIBE, json!({ "streamId": stream_id }));
                }
            })
        };

        Self {
            client: client.clone(),
            state,
            subscriptions: vec![on_update, on_alert, on_connect],
        }
    }

    /// Starts watching another stream.
    pub fn add_stream(&self, stream_id: impl Into<String>) -> bool {
        let stream_id: String = stream_id.into();
        if !lock(&self.state).watched.insert(stream_id.clone()) {
            return false;
        }
        self.client
            .send(HEALTH_SUBSCRIBE, json!({ "streamId": stream_id }));
        true
    }

    /// Stops watching a stream and forgets its snapshot and alerts.
    pub fn remove_stream(&self, stream_id: &str) -> bool {
        {
            let mut state = lock(&self.state);
            if !state.watched.remove(stream_id) {
                return false;
            }
            state.snapshots.remove(stream_id);
            state.alerts.remove(stream_id);
        }
        self.client
            .send(HEALTH_UNSUBSCRIBE, json!({ "streamId": stream_id }));
        true
    }

    /// Watched stream ids, sorted.
    pub fn stream_ids(&self) -> Vec<String> {
        lock(&self.state).watched.iter().cloned().collect()
    }

    pub fn snapshot(&self, stream_id: &str) -> Option<HealthSnapshot> {
        lock(&self.state).snapshots.get(stream_id).cloned()
    }

    /// Recent alerts for `stream_id`, oldest first.
    pub fn alerts(&self, stream_id: &str) -> Vec<HealthAlert> {
        lock(&self.state)
            .alerts
            .get(stream_id)
            .map(|alerts| alerts.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> HealthSummary {
        let state = lock(&self.state);
        let mut summary = HealthSummary::default();
        for stream_id in &state.watched {
            match state.snapshots.get(stream_id).map(|s| s.status) {
                Some(HealthStatus::Healthy) => summary.healthy += 1,
                Some(HealthStatus::Warning) => summary.warning += 1,
                Some(HealthStatus::Critical) => summary.critical += 1,
                Some(HealthStatus::Offline) => summary.offline += 1,
                Some(HealthStatus::Unknown) | None => summary.unknown += 1,
            }
        }
        summary
    }
}

impl Drop for StreamHealthMonitor {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        for stream_id in self.stream_ids() {
            self.client
                .send(HEALTH_UNSUBSCRIBE, json!({ "streamId": stream_id }));
        }
    }
}
