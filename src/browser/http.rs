//! Plain HTTP backend.
//!
//! Fetches pages with `reqwest` and answers DOM queries from the fetched HTML.
//! There is no JavaScript, so scrolling is a no-op and only cards present in
//! the server-rendered listing are found.

use super::{Browser, Launcher, Page, document_matches};
use crate::config::BrowserSettings;
use crate::error::Result;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct HttpLauncher {
    user_agent: String,
}

impl HttpLauncher {
    pub fn new(settings: &BrowserSettings) -> Self {
        Self {
            user_agent: settings.user_agent.clone(),
        }
    }
}

impl Launcher for HttpLauncher {
    type Browser = HttpBrowser;

    async fn launch(&self) -> Result<HttpBrowser> {
        let client = Client::builder()
            .user_agent(self.user_agent.clone())
            .build()?;
        Ok(HttpBrowser { client })
    }
}

/// A `reqwest::Client`; clones share its connection pool.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    client: Client,
}

impl Browser for HttpBrowser {
    type Page = HttpPage;

    async fn new_page(&self) -> Result<HttpPage> {
        Ok(HttpPage {
            client: self.client.clone(),
            html: String::new(),
        })
    }

    async fn close(self) {}
}

#[derive(Debug)]
pub struct HttpPage {
    client: Client,
    html: String,
}

impl Page for HttpPage {
    #[instrument(level = "debug", skip(self))]
    async fn goto(&mut self, url: &str) -> Result<()> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        self.html = response.text().await?;
        debug!(bytes = self.html.len(), "Fetched page");
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<bool> {
        document_matches(&self.html, selector)
    }

    async fn scroll_height(&mut self) -> Result<u64> {
        Ok(self.html.len() as u64)
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        Ok(())
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool> {
        document_matches(&self.html, selector)
    }

    async fn html(&mut self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}
