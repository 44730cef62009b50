//! Target registry
//!
//! Enumerates, opens and closes tabs through the browser's discovery HTTP
//! interface and hands out attached [`Page`] handles. Positional indices are
//! never stored: every call re-reads the live target list, so an index means
//! "the n-th page right now".

use super::page::{Page, Target};
use super::url::rewrite_ws_url;
use crate::cdp::CdpTimeoutConfig;
use crate::config::Config;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Browser version information from `/json/version`
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser", default)]
    pub product: String,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    #[serde(rename = "User-Agent", default)]
    pub user_agent: String,
    #[serde(rename = "V8-Version", default)]
    pub js_version: String,
}

/// Discovery client plus cache of attached pages keyed by target id
#[derive(Debug)]
pub struct TargetRegistry {
    host: String,
    port: u16,
    http: reqwest::Client,
    timeouts: CdpTimeoutConfig,
    console_capacity: usize,
    pages: Mutex<HashMap<String, Arc<Page>>>,
}

impl TargetRegistry {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts().default_timeout)
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        info!("Target registry using discovery endpoint {}", config.http_endpoint());

        Ok(Self {
            host: config.cdp_host.clone(),
            port: config.cdp_port,
            http,
            timeouts: config.timeouts(),
            console_capacity: config.console_buffer_limit,
            pages: Mutex::new(HashMap::new()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    async fn get_text(&self, request: reqwest::RequestBuilder, what: &str) -> Result<String> {
        let response = request.send().await.map_err(|e| {
            Error::connection(format!(
                "Failed to reach browser at {}:{} ({}): {}. Start it with --remote-debugging-port={}",
                self.host, self.port, what, e, self.port
            ))
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::cdp(format!("{} failed with {}: {}", what, status, body.trim())));
        }

        Ok(body)
    }

    fn normalize(&self, mut target: Target) -> Target {
        target.ws_url = rewrite_ws_url(target.ws_url.as_deref(), &self.host, self.port);
        target
    }

    /// Browser product and protocol version
    pub async fn version(&self) -> Result<BrowserVersion> {
        let body = self
            .get_text(self.http.get(self.endpoint("/json/version")), "version")
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Page targets in the browser's current order. Attached pages whose
    /// targets are gone are released.
    pub async fn list(&self) -> Result<Vec<Target>> {
        let body = self
            .get_text(self.http.get(self.endpoint("/json/list")), "list targets")
            .await?;

        let targets: Vec<Target> = serde_json::from_str::<Vec<Target>>(&body)?
            .into_iter()
            .filter(Target::is_page)
            .map(|t| self.normalize(t))
            .collect();

        debug!("Discovered {} page targets", targets.len());
        self.prune(&targets).await;

        Ok(targets)
    }

    async fn prune(&self, live: &[Target]) {
        let stale: Vec<Arc<Page>> = {
            let mut pages = self.pages.lock().await;
            let gone: Vec<String> = pages
                .keys()
                .filter(|id| !live.iter().any(|t| &t.id == *id))
                .cloned()
                .collect();
            gone.iter().filter_map(|id| pages.remove(id)).collect()
        };

        for page in stale {
            info!("Releasing connection to vanished target {}", page.id());
            page.detach().await;
        }
    }

    /// Target currently at `index`
    pub async fn resolve(&self, index: usize) -> Result<Target> {
        let targets = self.list().await?;
        let count = targets.len();
        targets
            .into_iter()
            .nth(index)
            .ok_or_else(|| Error::index_out_of_range(index, count))
    }

    /// Open a new tab, optionally at `url`
    pub async fn create(&self, url: Option<&str>) -> Result<Target> {
        let endpoint = match url {
            Some(url) => self.endpoint(&format!("/json/new?{}", urlencoding::encode(url))),
            None => self.endpoint("/json/new"),
        };

        let body = self.get_text(self.http.put(endpoint), "open tab").await?;
        let target = self.normalize(serde_json::from_str(&body)?);

        info!("Opened target {} at {}", target.id, target.url);
        Ok(target)
    }

    /// Close the tab currently at `index`, releasing its connection
    pub async fn close(&self, index: usize) -> Result<Target> {
        let target = self.resolve(index).await?;

        self.get_text(
            self.http.get(self.endpoint(&format!("/json/close/{}", target.id))),
            "close tab",
        )
        .await?;

        if let Some(page) = self.pages.lock().await.remove(&target.id) {
            page.detach().await;
        }

        info!("Closed target {} ({})", target.id, target.url);
        Ok(target)
    }

    /// Attached handle for the tab currently at `index`
    pub async fn attach(&self, index: usize) -> Result<Arc<Page>> {
        let target = self.resolve(index).await?;
        self.attach_target(target).await
    }

    /// Attached handle for `target`, reusing a live connection when there is
    /// one and dialing a fresh one otherwise. The page map is not locked
    /// while dialing.
    pub async fn attach_target(&self, target: Target) -> Result<Arc<Page>> {
        if let Some(page) = self.pages.lock().await.get(&target.id) {
            if page.is_active() {
                return Ok(Arc::clone(page));
            }
            info!("Connection to {} was lost, reconnecting", target.id);
        }

        let page = Arc::new(Page::connect(target, self.timeouts.clone(), self.console_capacity).await?);

        let raced = {
            let mut pages = self.pages.lock().await;
            match pages.get(page.id()) {
                Some(existing) if existing.is_active() => Some(Arc::clone(existing)),
                _ => {
                    pages.insert(page.id().to_string(), Arc::clone(&page));
                    None
                }
            }
        };

        match raced {
            Some(existing) => {
                debug!("Another attach to {} finished first", page.id());
                page.detach().await;
                Ok(existing)
            }
            None => Ok(page),
        }
    }

    /// Detach every cached page
    pub async fn shutdown(&self) {
        let pages: Vec<Arc<Page>> = self.pages.lock().await.drain().map(|(_, page)| page).collect();
        for page in pages {
            page.detach().await;
        }
    }
}
