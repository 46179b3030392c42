//! Log schemas and row types for the directory and worker node logs

use super::{LogRecord, LogSchema};
use crate::domain::{Node, SystemUsage};
use chrono::{DateTime, Local};

/// Directory: one row per registration outcome
pub const DIRECTORY_ACTIVE_LOG: LogSchema = LogSchema {
    file_name: "active_log_MainServer.csv",
    columns: &[
        "Timestamp", "Action", "NodeId", "Address", "Port", "Latitude", "Longitude", "Status",
    ],
};

/// Directory: one row per usage sample taken on redirect
pub const DIRECTORY_PASSIVE_LOG: LogSchema = LogSchema {
    file_name: "passive_log_MainServer.csv",
    columns: &["Timestamp", "Activity", "MemoryUsedPercent", "CPUUsage", "LoadAvg"],
};

/// Worker node: one row per received payload
pub const NODE_ACTIVE_LOG: LogSchema = LogSchema {
    file_name: "active_log_ServerNode.csv",
    columns: &[
        "ClientIP",
        "ClientLatitude",
        "ClientLongitude",
        "NodeLatitude",
        "NodeLongitude",
        "Latency",
        "Timestamp",
        "ClientData",
        "MemoryTotal",
        "MemoryUsed",
        "MemoryUsedPercent",
        "CPUUsage",
        "LoadAvg",
        "Uptime",
    ],
};

/// Worker node: background activity
pub const NODE_PASSIVE_LOG: LogSchema = LogSchema {
    file_name: "passive_log_ServerNode.csv",
    columns: &["Timestamp", "Activity"],
};

fn timestamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

// =============================================================================
// Directory Rows
// =============================================================================

/// Registration outcome recorded by the directory
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub at: DateTime<Local>,
    pub action: String,
    pub node: Option<Node>,
}

impl LogRecord for RegistrationRecord {
    fn fields(&self) -> Vec<String> {
        let mut fields = vec![timestamp(self.at), self.action.clone()];
        match &self.node {
            Some(node) => fields.extend([
                node.id.clone(),
                node.address.clone(),
                node.port.clone(),
                format!("{:.6}", node.latitude),
                format!("{:.6}", node.longitude),
                node.status.to_string(),
            ]),
            None => fields.extend(std::iter::repeat(String::new()).take(6)),
        }
        fields
    }
}

/// Usage sample recorded by the directory
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub at: DateTime<Local>,
    pub activity: String,
    pub usage: SystemUsage,
}

impl LogRecord for UsageRecord {
    fn fields(&self) -> Vec<String> {
        vec![
            timestamp(self.at),
            self.activity.clone(),
            format!("{:.2}", self.usage.memory_used_percent),
            format!("{:.2}", self.usage.cpu_usage_percent),
            format!("{:.2}", self.usage.load_avg_1m),
        ]
    }
}

// =============================================================================
// Worker Node Rows
// =============================================================================

/// One payload received by a worker node, with best-effort enrichment
#[derive(Debug, Clone)]
pub struct InteractionRecord {
    pub client_ip: String,
    pub client_latitude: f64,
    pub client_longitude: f64,
    pub node_latitude: f64,
    pub node_longitude: f64,
    /// Probe latency in milliseconds, -1 when the probe failed
    pub latency_ms: f64,
    pub at: DateTime<Local>,
    pub client_data: String,
    pub usage: SystemUsage,
}

impl LogRecord for InteractionRecord {
    fn fields(&self) -> Vec<String> {
        vec![
            self.client_ip.clone(),
            format!("{:.6}", self.client_latitude),
            format!("{:.6}", self.client_longitude),
            format!("{:.6}", self.node_latitude),
            format!("{:.6}", self.node_longitude),
            format!("{:.3}", self.latency_ms),
            timestamp(self.at),
            self.client_data.clone(),
            self.usage.memory_total_mb.to_string(),
            self.usage.memory_used_mb.to_string(),
            format!("{:.2}", self.usage.memory_used_percent),
            format!("{:.2}", self.usage.cpu_usage_percent),
            format!("{:.2}", self.usage.load_avg_1m),
            self.usage.uptime_secs.to_string(),
        ]
    }
}

/// Background activity of a worker node
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub at: DateTime<Local>,
    pub activity: String,
}

impl ActivityRecord {
    pub fn now(activity: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            activity: activity.into(),
        }
    }
}

impl LogRecord for ActivityRecord {
    fn fields(&self) -> Vec<String> {
        vec![timestamp(self.at), self.activity.clone()]
    }
}
