//! Browser launching

use std::io;

use tracing::{debug, warn};
use url::Url;

/// Sends the user's browser to a URL
pub trait BrowserLauncher {
    /// Navigate to `url`
    fn open(&self, url: &Url) -> io::Result<()>;
}

/// Opens the platform default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &Url) -> io::Result<()> {
        debug!("Opening system browser");
        open::that(url.as_str())
    }
}

/// Leaves navigation to the user; the URL is printed by the flow
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualBrowser;

impl BrowserLauncher for ManualBrowser {
    fn open(&self, _url: &Url) -> io::Result<()> {
        Ok(())
    }
}

/// Open `url`, falling back to asking the user to visit it
pub fn launch(browser: &dyn BrowserLauncher, url: &Url) {
    if let Err(e) = browser.open(url) {
        warn!(error = %e, "Failed to open browser automatically");
        eprintln!("\nPlease authorize this client by visiting:\n{url}\n");
    }
}
