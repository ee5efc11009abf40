//! Push delivery of metric snapshots to a subscriber.

use serde::{Deserialize, Serialize};

use crate::metrics::Metric;

/// A labelled snapshot pushed to the subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub title: String,
    pub metrics: Vec<Metric>,
}

/// Fire-and-forget sink for pushed snapshots.
pub trait Frontend {
    fn metrics(&self, metrics: Vec<Metric>, title: &str);
}

/// Delivers snapshots over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelFrontend {
    sender: flume::Sender<MetricsEvent>,
}

impl ChannelFrontend {
    /// Creates a frontend and the receiver its events arrive on.
    pub fn new() -> (Self, flume::Receiver<MetricsEvent>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }
}

impl Frontend for ChannelFrontend {
    fn metrics(&self, metrics: Vec<Metric>, title: &str) {
        let event = MetricsEvent {
            title: title.to_string(),
            metrics,
        };
        if self.sender.send(event).is_err() {
            tracing::debug!(title, "metrics subscriber gone; dropping event");
        }
    }
}
