//! Chrome over WebDriver, driven with `fantoccini`.
//!
//! The launcher either connects to an already-running WebDriver server
//! (`--webdriver-url`) or spawns `chromedriver` on a free local port and waits
//! for it to report ready. Each [`WebDriverPage`] is its own WebDriver
//! session, so pages opened on a shared browser do not share cookies or
//! history.

use super::{Browser, Launcher, Page};
use crate::config::BrowserSettings;
use crate::error::{Result, ScrapeError};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};
use std::net::TcpListener;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const DRIVER_READY_TIMEOUT: Duration = Duration::from_secs(15);
const DRIVER_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    settings: BrowserSettings,
}

impl WebDriverLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

impl Launcher for WebDriverLauncher {
    type Browser = ChromeBrowser;

    #[instrument(level = "info", skip_all, fields(headless = self.settings.headless))]
    async fn launch(&self) -> Result<ChromeBrowser> {
        if let Some(url) = &self.settings.webdriver_url {
            info!(endpoint = %url, "Using external WebDriver server");
            return Ok(ChromeBrowser {
                endpoint: url.trim_end_matches('/').to_string(),
                driver: None,
                capabilities: chrome_capabilities(&self.settings),
            });
        }

        let port = free_port()?;
        let endpoint = format!("http://127.0.0.1:{}", port);
        let child = Command::new(&self.settings.chromedriver)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ScrapeError::Browser(format!(
                    "could not start {}: {}",
                    self.settings.chromedriver.display(),
                    e
                ))
            })?;
        let driver = Arc::new(Mutex::new(child));

        if let Err(e) = wait_until_ready(&endpoint).await {
            driver.lock().await.kill().await.ok();
            return Err(e);
        }
        info!(%endpoint, "chromedriver is ready");

        Ok(ChromeBrowser {
            endpoint,
            driver: Some(driver),
            capabilities: chrome_capabilities(&self.settings),
        })
    }
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

async fn wait_until_ready(endpoint: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let status_url = format!("{}/status", endpoint);
    let t0 = Instant::now();
    while t0.elapsed() < DRIVER_READY_TIMEOUT {
        match client.get(&status_url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => debug!(status = %resp.status(), "chromedriver not ready yet"),
            Err(e) => debug!(error = %e, "chromedriver not reachable yet"),
        }
        tokio::time::sleep(DRIVER_POLL_INTERVAL).await;
    }
    Err(ScrapeError::Browser(format!(
        "chromedriver at {} not ready after {:?}",
        endpoint, DRIVER_READY_TIMEOUT
    )))
}

/// Chrome options: automation flags off, sandbox off, fixed desktop viewport,
/// custom user agent and eager page loads.
fn chrome_capabilities(settings: &BrowserSettings) -> Map<String, Value> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--window-size=1920,1080".to_string(),
        format!("--user-agent={}", settings.user_agent),
    ];
    if settings.headless {
        args.push("--headless=new".to_string());
    }

    let mut caps = Map::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("pageLoadStrategy".to_string(), json!("eager"));
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": args,
            "excludeSwitches": ["enable-automation"],
        }),
    );
    caps
}

/// A WebDriver endpoint plus the chromedriver process behind it, if we
/// spawned one.
#[derive(Debug, Clone)]
pub struct ChromeBrowser {
    endpoint: String,
    driver: Option<Arc<Mutex<Child>>>,
    capabilities: Map<String, Value>,
}

impl Browser for ChromeBrowser {
    type Page = WebDriverPage;

    async fn new_page(&self) -> Result<WebDriverPage> {
        let client = ClientBuilder::native()
            .capabilities(self.capabilities.clone())
            .connect(&self.endpoint)
            .await?;
        debug!(endpoint = %self.endpoint, "Opened WebDriver session");
        Ok(WebDriverPage { client })
    }

    async fn close(self) {
        let Some(driver) = self.driver else {
            return;
        };
        let mut child = driver.lock().await;
        match child.kill().await {
            Ok(()) => info!(endpoint = %self.endpoint, "Stopped chromedriver"),
            Err(e) => warn!(endpoint = %self.endpoint, error = %e, "Failed to stop chromedriver"),
        }
    }
}

/// One WebDriver session.
pub struct WebDriverPage {
    client: Client,
}

impl Page for WebDriverPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(selector))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!(selector, error = %e, "Element did not appear");
                Ok(false)
            }
        }
    }

    async fn scroll_height(&mut self) -> Result<u64> {
        let value = self
            .client
            .execute("return document.body.scrollHeight;", vec![])
            .await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.client
            .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await?;
        Ok(())
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool> {
        let value = self
            .client
            .execute(
                "return document.querySelector(arguments[0]) !== null;",
                vec![json!(selector)],
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn html(&mut self) -> Result<String> {
        Ok(self.client.source().await?)
    }

    async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}
