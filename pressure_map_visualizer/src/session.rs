// THEORY:
// A `ViewerSession` is the server-side state of one connected dashboard. It owns
// one `RenderSession` per channel, so every viewer keeps its own thresholds and
// its own last good rendering while sharing the single stream of published
// snapshots. The session is transport-agnostic: it takes published snapshots and
// raw client text in, and hands back `ServerMessage`s for the socket to send.
//
// A viewer may see the same tick twice (once from the latest slot on connect and
// once from the broadcast stream). Stale or repeated ticks are dropped here.

use pressure_map::core_modules::snapshot::CodecError;
use pressure_map::pipeline::{ChannelId, PublishedSnapshot};
use pressure_map::presentation::{
    MetricFragment, PresentationError, RenderSession, Rendering, Threshold,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no channel {0}")]
    UnknownChannel(usize),
    #[error(transparent)]
    Threshold(#[from] PresentationError),
    #[error("unreadable client message: {0}")]
    BadMessage(#[from] serde_json::Error),
    #[error("channel {channel}: {source}")]
    Codec {
        channel: ChannelId,
        #[source]
        source: CodecError,
    },
}

/// Messages a browser sends over the channel socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Threshold { channel: usize, value: i64 },
    Ping,
}

/// Messages the server pushes to a browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot {
        channel: ChannelId,
        tick: u64,
        rendering: Rendering,
        metric_html: String,
    },
    Metric {
        channel: ChannelId,
        metric: MetricFragment,
        metric_html: String,
    },
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn error(err: &impl std::fmt::Display) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Default)]
struct ChannelView {
    render: RenderSession,
    last_tick: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ViewerSession {
    channels: Vec<ChannelView>,
}

impl ViewerSession {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channels: vec![ChannelView::default(); channel_count],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn threshold(&self, channel: ChannelId) -> Option<Threshold> {
        self.channels.get(channel.0).map(|view| view.render.threshold())
    }

    /// Renders a published snapshot for this viewer. Returns `Ok(None)` for an
    /// empty payload or a tick this viewer has already seen.
    pub fn apply(
        &mut self,
        published: &PublishedSnapshot,
    ) -> Result<Option<ServerMessage>, SessionError> {
        let channel = published.channel;
        let view = self
            .channels
            .get_mut(channel.0)
            .ok_or(SessionError::UnknownChannel(channel.0))?;

        if view.last_tick.is_some_and(|seen| published.tick <= seen) {
            return Ok(None);
        }

        let changed = view
            .render
            .apply_payload(Some(&published.payload))
            .map_err(|source| SessionError::Codec { channel, source })?;
        view.last_tick = Some(published.tick);
        if !changed {
            return Ok(None);
        }

        Ok(view.render.rendering().map(|rendering| ServerMessage::Snapshot {
            channel,
            tick: published.tick,
            metric_html: rendering.metric.to_html(),
            rendering: rendering.clone(),
        }))
    }

    /// Handles one text frame from the browser.
    pub fn handle_text(&mut self, text: &str) -> Result<Option<ServerMessage>, SessionError> {
        match serde_json::from_str::<ClientMessage>(text)? {
            ClientMessage::Threshold { channel, value } => {
                self.set_threshold(channel, Threshold::new(value)?)
            }
            ClientMessage::Ping => Ok(Some(ServerMessage::Pong)),
        }
    }

    /// Moves one channel's threshold. Only the metric is recoloured; the figures
    /// stay as they are until the next snapshot.
    pub fn set_threshold(
        &mut self,
        channel: usize,
        threshold: Threshold,
    ) -> Result<Option<ServerMessage>, SessionError> {
        let view = self
            .channels
            .get_mut(channel)
            .ok_or(SessionError::UnknownChannel(channel))?;
        view.render.set_threshold(threshold);

        Ok(view.render.rendering().map(|rendering| ServerMessage::Metric {
            channel: ChannelId(channel),
            metric_html: rendering.metric.to_html(),
            metric: rendering.metric.clone(),
        }))
    }
}
