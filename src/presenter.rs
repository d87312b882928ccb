use std::io;

use qmc_auth::LoginPresenter;
use tracing::{debug, warn};
use url::Url;

/// Opens the login page in the system browser, printing the URL as a fallback
pub struct BrowserPresenter {
    opener: fn(&str) -> io::Result<()>,
}

impl BrowserPresenter {
    pub fn new() -> Self {
        Self {
            opener: |url| open::that(url),
        }
    }
}

impl Default for BrowserPresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LoginPresenter for BrowserPresenter {
    async fn present(&self, url: &Url) -> anyhow::Result<()> {
        println!("Log in with your Microsoft account at:\n\n  {url}\n");

        match (self.opener)(url.as_str()) {
            Ok(()) => debug!("Login page opened in the browser"),
            Err(e) => warn!("Could not open a browser, use the link above: {}", e),
        }

        Ok(())
    }
}
