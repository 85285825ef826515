//! Headless browser access for redirect resolution.
//!
//! - [`Navigator`]: "open this URL and tell me where it ended up"
//! - [`BrowserSession`]: `chromiumoxide` implementation, one browser per invocation
//! - [`BrowserProvider`] / [`LazyBrowser`]: launch the session only when a
//!   resolution actually needs it, hand out shared references, close it at the end
//!
//! The session is an owned value. `close` shuts the browser down cleanly;
//! if it is never reached, `Drop` stops the event-handler task and
//! `chromiumoxide` kills the child process.

use crate::config::Config;
use crate::error::ResolveError;
use crate::resolver::extract::is_blocked_url;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

const SETTLE_POLL: Duration = Duration::from_millis(500);

/// Executable names looked up on `PATH` after the configured locations.
const PATH_CANDIDATES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"];

/// Where a navigation ended up and what the page looked like there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigatedPage {
    pub final_url: String,
    pub html: String,
}

/// Something that can follow a link to its final address.
pub trait Navigator {
    async fn navigate(&self, url: &str) -> Result<NavigatedPage, ResolveError>;
}

/// Source of a [`Navigator`], possibly unavailable.
pub trait BrowserProvider {
    type Nav: Navigator;

    /// The navigator, launching it on first use. `None` when no browser can run.
    async fn navigator(&mut self) -> Option<&Self::Nav>;
}

/// First browser executable found: configured paths in order, then `PATH`.
pub fn locate_browser(configured: &[String]) -> Option<PathBuf> {
    configured
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .or_else(|| PATH_CANDIDATES.iter().find_map(|name| which::which(name).ok()))
}

/// A running headless browser.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
    redirect_settle: Duration,
}

impl BrowserSession {
    /// Launch a headless browser from the first available executable.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Browser`] when no executable is found or it
    /// fails to start.
    #[instrument(level = "info", skip_all)]
    pub async fn launch(config: &Config) -> Result<Self, ResolveError> {
        let executable = locate_browser(&config.browser_paths)
            .ok_or_else(|| ResolveError::Browser("no browser executable found".to_string()))?;
        info!(executable = %executable.display(), "Launching headless browser");
        Self::launch_at(&executable, config).await
    }

    async fn launch_at(executable: &Path, config: &Config) -> Result<Self, ResolveError> {
        let browser_config = BrowserConfig::builder()
            .chrome_executable(executable)
            .no_sandbox()
            .request_timeout(config.navigation_timeout())
            .build()
            .map_err(ResolveError::Browser)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ResolveError::Browser(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler error");
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            navigation_timeout: config.navigation_timeout(),
            redirect_settle: config.redirect_settle(),
        })
    }

    /// Close the browser and wait for the process to exit.
    #[instrument(level = "info", skip_all)]
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser close failed");
        }
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "Browser wait failed");
        }
        self.handler_task.abort();
        info!("Browser closed");
    }

    /// Go to `url` and poll until the address leaves the redirect/consent
    /// domains or the settle window runs out.
    async fn load(&self, page: &Page, url: &str) -> Result<NavigatedPage, ResolveError> {
        let goto_error = page.goto(url).await.err();
        if let Some(e) = &goto_error {
            debug!(%url, error = %e, "goto reported an error; checking where the page landed");
        }

        let deadline = Instant::now() + self.redirect_settle;
        let mut current = page.url().await?.unwrap_or_default();
        while is_blocked_url(&current) && Instant::now() < deadline {
            sleep(SETTLE_POLL).await;
            current = page.url().await?.unwrap_or_default();
        }

        if current.is_empty() || current == "about:blank" {
            return Err(ResolveError::Navigation(
                goto_error.map_or_else(|| "page never loaded".to_string(), |e| e.to_string()),
            ));
        }

        let html = page.content().await.unwrap_or_default();
        Ok(NavigatedPage {
            final_url: current,
            html,
        })
    }
}

impl Navigator for BrowserSession {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn navigate(&self, url: &str) -> Result<NavigatedPage, ResolveError> {
        let page = self.browser.new_page("about:blank").await?;
        let outcome = timeout(self.navigation_timeout, self.load(&page, url)).await;
        if let Err(e) = page.close().await {
            debug!(error = %e, "Page close failed");
        }
        match outcome {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout(self.navigation_timeout)),
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Launches a [`BrowserSession`] on first request and remembers a failure.
pub struct LazyBrowser<'c> {
    config: &'c Config,
    session: Option<BrowserSession>,
    attempted: bool,
}

impl<'c> LazyBrowser<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config,
            session: None,
            attempted: false,
        }
    }

    /// Close the browser if it was ever launched.
    pub async fn close(self) {
        if let Some(session) = self.session {
            session.close().await;
        }
    }
}

impl BrowserProvider for LazyBrowser<'_> {
    type Nav = BrowserSession;

    async fn navigator(&mut self) -> Option<&BrowserSession> {
        if !self.attempted {
            self.attempted = true;
            match BrowserSession::launch(self.config).await {
                Ok(session) => self.session = Some(session),
                Err(e) => warn!(error = %e, "Headless browser unavailable; only cached resolutions apply"),
            }
        }
        self.session.as_ref()
    }
}
