//! Attached target handle
//!
//! A [`Page`] bundles everything bound to one tab: its discovery record, the
//! protocol connection, a typed client and the event router.

use crate::cdp::{CdpClient, CdpConnection, CdpTimeoutConfig, CdpWebSocketConnection, EventRouter};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// One browser tab as reported by the discovery endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// Absent while another client holds the target
    #[serde(default, rename = "webSocketDebuggerUrl")]
    pub ws_url: Option<String>,
}

impl Target {
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// A target with a live control channel
#[derive(Debug)]
pub struct Page {
    target: Target,
    connection: Arc<dyn CdpConnection>,
    client: CdpClient,
    events: EventRouter,
}

impl Page {
    /// Dial the target's debugger URL and start routing its events
    pub async fn connect(target: Target, timeouts: CdpTimeoutConfig, console_capacity: usize) -> Result<Self> {
        let ws_url = target.ws_url.clone().ok_or_else(|| {
            Error::connection(format!(
                "Target {} has no debugger URL (is another client attached?)",
                target.id
            ))
        })?;

        let connection = CdpWebSocketConnection::new(ws_url, timeouts).await?;
        Self::from_connection(target, connection, console_capacity).await
    }

    /// Wrap an already open connection
    pub async fn from_connection(
        target: Target,
        connection: Arc<dyn CdpConnection>,
        console_capacity: usize,
    ) -> Result<Self> {
        let events = EventRouter::attach(&connection, console_capacity).await?;
        info!("Attached to target {} ({})", target.id, target.url);

        Ok(Self {
            client: CdpClient::new(Arc::clone(&connection)),
            target,
            connection,
            events,
        })
    }

    /// Discovery record as of attach time
    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn id(&self) -> &str {
        &self.target.id
    }

    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    pub fn events(&self) -> &EventRouter {
        &self.events
    }

    pub fn is_active(&self) -> bool {
        self.connection.is_active()
    }

    /// Close the control channel. The tab itself stays open.
    pub async fn detach(&self) {
        if let Err(e) = self.connection.close().await {
            warn!("Failed to close connection to {}: {}", self.target.id, e);
        }
    }
}
