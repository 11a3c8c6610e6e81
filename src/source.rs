//! Product observations captured through a headless browser session.
//!
//! The shop only serves its product API to sessions that have picked a
//! delivery pincode, so the browser first sets the pincode through the UI,
//! then loads the category page and reads back the product API response that
//! page triggered.

use crate::product::{ProductObservation, parse_listing};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thirtyfour::ChromiumLikeCapabilities;
use thirtyfour::prelude::*;
use thiserror::Error;
use tokio::time::sleep;

const SHOP_HOME: &str = "https://shop.amul.com/en/";
const CATEGORY_PAGE: &str = "https://shop.amul.com/en/browse/protein";
const API_PREFIX: &str = "https://shop.amul.com/api/";
const PRODUCTS_ENDPOINT: &str = "ms.products";
const CATEGORY_FILTER: &str = "filters[0][field]=categories";

const PINCODE_INPUT: &str = r#"input[placeholder="Enter Your Pincode"]"#;
const PINCODE_RESULT: &str = "div.list-group-item.text-left.searchproduct-name a.searchitem-name";
const PINCODE_CONFIRMATION: &str = "div.pincode_wrap span.ms-2.fw-semibold";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Finds the first resource the page loaded that matches every marker, then
/// re-reads its body with the page's own cookies.
const CAPTURE_SCRIPT: &str = r#"
const done = arguments[arguments.length - 1];
const [prefix, markers] = [arguments[0], arguments[1]];
const decode = (u) => { try { return decodeURIComponent(u); } catch (e) { return u; } };
const url = performance.getEntriesByType('resource')
    .map((entry) => entry.name)
    .find((name) => name.startsWith(prefix) && markers.every((m) => decode(name).includes(m)));
if (!url) {
    done(null);
} else {
    fetch(url, { credentials: 'include' })
        .then((resp) => resp.text())
        .then((body) => done({ url, body }), (err) => done({ url, error: String(err) }));
}
"#;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("webdriver error: {0}")]
    WebDriver(#[from] WebDriverError),

    #[error("no browser session; establish_context must succeed first")]
    NoSession,

    #[error("could not set delivery pincode {pincode}: {reason}")]
    Context { pincode: String, reason: String },

    #[error("product API response not seen within {0:?}")]
    ProductsNotFound(Duration),

    #[error("failed to read product API response from {url}: {reason}")]
    Capture { url: String, reason: String },

    #[error("failed to decode product listing: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Supplies the current product list for a delivery region.
#[async_trait]
pub trait ObservationSource: Send {
    /// Select the delivery region. Observations are meaningless until this succeeds.
    async fn establish_context(&mut self, region: &str) -> Result<(), SourceError>;

    async fn fetch(&mut self, region: &str) -> Result<Vec<ProductObservation>, SourceError>;

    /// Release any session resources. Called once at the end of every run.
    async fn shutdown(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub wait_timeout: Duration,
}

/// Chrome driven over WebDriver.
pub struct BrowserSource {
    config: BrowserConfig,
    driver: Option<WebDriver>,
}

#[derive(Debug, Deserialize)]
struct Captured {
    url: String,
    body: Option<String>,
    error: Option<String>,
}

impl BrowserSource {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            driver: None,
        }
    }

    async fn start_session(&self) -> Result<WebDriver, SourceError> {
        let mut caps = DesiredCapabilities::chrome();
        caps.set_headless()?;
        caps.set_disable_gpu()?;
        caps.set_no_sandbox()?;
        caps.set_disable_dev_shm_usage()?;

        let driver = WebDriver::new(self.config.webdriver_url.as_str(), caps).await?;
        tracing::debug!(webdriver = %self.config.webdriver_url, "Browser session started");
        Ok(driver)
    }

    fn driver(&self) -> Result<&WebDriver, SourceError> {
        self.driver.as_ref().ok_or(SourceError::NoSession)
    }

    async fn select_pincode(&self, driver: &WebDriver, pincode: &str) -> Result<String, SourceError> {
        let timeout = self.config.wait_timeout;

        driver.goto(SHOP_HOME).await?;

        let input = driver
            .query(By::Css(PINCODE_INPUT))
            .wait(timeout, POLL_INTERVAL)
            .first()
            .await?;
        input.wait_until().displayed().await?;
        input.clear().await?;
        input.send_keys(pincode).await?;

        let result = driver
            .query(By::Css(PINCODE_RESULT))
            .wait(timeout, POLL_INTERVAL)
            .first()
            .await?;
        result.wait_until().clickable().await?;
        result.click().await?;

        if !wait_until_hidden(driver, PINCODE_INPUT, timeout).await? {
            return Err(SourceError::Context {
                pincode: pincode.to_string(),
                reason: "pincode dialog did not close".to_string(),
            });
        }

        let confirmation = driver
            .query(By::Css(PINCODE_CONFIRMATION))
            .wait(timeout, POLL_INTERVAL)
            .first()
            .await?;
        confirmation.wait_until().displayed().await?;
        Ok(confirmation.text().await?)
    }

    async fn capture_listing(&self, driver: &WebDriver) -> Result<Option<Captured>, SourceError> {
        let args = vec![
            serde_json::Value::from(API_PREFIX),
            serde_json::json!([PRODUCTS_ENDPOINT, CATEGORY_FILTER]),
        ];
        let ret = driver.execute_async(CAPTURE_SCRIPT, args).await?;
        match ret.json() {
            serde_json::Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }
}

/// Wait until no element matching `css` is displayed. Elements that stay in
/// the page but are hidden count as gone.
async fn wait_until_hidden(driver: &WebDriver, css: &str, timeout: Duration) -> WebDriverResult<bool> {
    driver
        .query(By::Css(css))
        .wait(timeout, POLL_INTERVAL)
        .and_displayed()
        .not_exists()
        .await
}

#[async_trait]
impl ObservationSource for BrowserSource {
    async fn establish_context(&mut self, region: &str) -> Result<(), SourceError> {
        if self.driver.is_none() {
            self.driver = Some(self.start_session().await?);
        }
        let driver = self.driver()?;

        match self.select_pincode(driver, region).await {
            Ok(confirmed) => {
                tracing::info!(pincode = region, confirmed = %confirmed.trim(), "✅ Pin code confirmed");
                Ok(())
            }
            Err(SourceError::WebDriver(e)) => Err(SourceError::Context {
                pincode: region.to_string(),
                reason: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&mut self, region: &str) -> Result<Vec<ProductObservation>, SourceError> {
        let driver = self.driver()?;
        driver.goto(CATEGORY_PAGE).await?;

        let started = Instant::now();
        let captured = loop {
            if let Some(captured) = self.capture_listing(driver).await? {
                break captured;
            }
            if started.elapsed() >= self.config.wait_timeout {
                return Err(SourceError::ProductsNotFound(self.config.wait_timeout));
            }
            sleep(POLL_INTERVAL).await;
        };

        let body = match (captured.body, captured.error) {
            (Some(body), _) => body,
            (None, reason) => {
                return Err(SourceError::Capture {
                    url: captured.url,
                    reason: reason.unwrap_or_else(|| "empty response".to_string()),
                });
            }
        };

        let products = parse_listing(&body)?;
        tracing::info!(pincode = region, url = %captured.url, count = products.len(), "Found protein products");
        Ok(products)
    }

    async fn shutdown(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.quit().await {
                tracing::warn!(error = %e, "Failed to close browser session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> BrowserSource {
        BrowserSource::new(BrowserConfig {
            webdriver_url: std::env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9515".to_string()),
            wait_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    #[ignore = "needs a running chromedriver"]
    async fn hidden_pincode_dialog_counts_as_dismissed() {
        let driver = source().start_session().await.unwrap();
        driver
            .goto(r#"data:text/html,<div class="modal" style="display:none"><input placeholder="Enter Your Pincode"></div>"#)
            .await
            .unwrap();

        let hidden = wait_until_hidden(&driver, PINCODE_INPUT, Duration::from_secs(2)).await;
        let visible = {
            driver
                .goto(r#"data:text/html,<input placeholder="Enter Your Pincode">"#)
                .await
                .unwrap();
            wait_until_hidden(&driver, PINCODE_INPUT, Duration::from_secs(1)).await
        };
        driver.quit().await.unwrap();

        assert!(hidden.unwrap());
        assert!(!visible.unwrap());
    }
}
