//! DevTools-protocol driver for Chrome/Chromium.
//!
//! chromiumoxide is async; the harness is not. `ChromeDriver` owns a small
//! tokio runtime, keeps the protocol handler polled on it, and blocks on
//! each operation.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::UiDriver;
use super::types::{DriverError, DriverResult, ElementHandle, ElementTable, Lookup, SelectorKind};
use crate::config::BrowserSettings;

impl From<CdpError> for DriverError {
    fn from(err: CdpError) -> Self {
        DriverError::Protocol(err.to_string())
    }
}

/// Browser automation session backed by a launched Chrome instance
pub struct ChromeDriver {
    runtime: Runtime,
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    /// Elements from the latest lookup; older handles are stale
    elements: ElementTable<Element>,
    url: Option<String>,
    settle_poll: Duration,
}

impl ChromeDriver {
    /// Launch a browser and open a blank page
    pub fn launch(settings: &BrowserSettings, settle_poll: Duration) -> DriverResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let mut builder = BrowserConfig::builder()
            .window_size(settings.window_width, settings.window_height)
            .request_timeout(settings.request_timeout)
            .no_sandbox()
            .arg("--disable-dev-shm-usage");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &settings.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        debug!("launching chrome");
        let (browser, page, handler) = runtime.block_on(async {
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| DriverError::Launch(e.to_string()))?;

            let handler = tokio::spawn(async move {
                while let Some(res) = handler.next().await {
                    if let Err(e) = res {
                        debug!("chromium handler error: {e:?}");
                    }
                }
            });

            let page = browser.new_page("about:blank").await?;
            Ok::<_, DriverError>((browser, page, handler))
        })?;
        info!(
            "chrome session started ({}x{}, headless={})",
            settings.window_width, settings.window_height, settings.headless
        );

        Ok(Self {
            runtime,
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            elements: ElementTable::default(),
            url: None,
            settle_poll,
        })
    }

    fn page(&self) -> DriverResult<&Page> {
        self.page.as_ref().ok_or(DriverError::NotAttached)
    }

    fn element(&self, handle: &ElementHandle) -> DriverResult<&Element> {
        if self.page.is_none() {
            return Err(DriverError::NotAttached);
        }
        self.elements
            .get(handle.id)
            .ok_or(DriverError::StaleElement(handle.id))
    }

    fn query(&mut self, selector: &str, kind: SelectorKind) -> DriverResult<Vec<ElementHandle>> {
        let css = kind.to_css(selector)?;
        let page = self.page()?;
        let found = self.runtime.block_on(page.find_elements(&css))?;
        debug!("{} element(s) match {}", found.len(), css);

        Ok(self
            .elements
            .replace(found)
            .map(|id| ElementHandle::new(id, selector, kind))
            .collect())
    }

    async fn dispatch_mouse(
        page: &Page,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
    ) -> DriverResult<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(DriverError::Protocol)?;
        page.execute(params).await?;
        Ok(())
    }
}

impl UiDriver for ChromeDriver {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        if self.url.as_deref() == Some(url) {
            return Ok(());
        }
        let page = self.page()?;
        self.runtime
            .block_on(async {
                page.goto(url).await?;
                page.wait_for_navigation().await?;
                Ok::<_, CdpError>(())
            })
            .map_err(|e| DriverError::Unreachable {
                endpoint: url.to_string(),
                reason: e.to_string(),
            })?;

        // Handles from the previous document are meaningless now
        self.elements.clear();
        self.url = Some(url.to_string());
        debug!("navigated to {}", url);
        Ok(())
    }

    fn current_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn find_element(&mut self, selector: &str, kind: SelectorKind) -> DriverResult<Lookup> {
        let mut handles = self.query(selector, kind)?;
        Ok(if handles.is_empty() {
            Lookup::NotFound {
                selector: selector.to_string(),
            }
        } else {
            Lookup::Found(handles.swap_remove(0))
        })
    }

    fn find_all_elements(&mut self, selector: &str, kind: SelectorKind) -> DriverResult<Vec<ElementHandle>> {
        self.query(selector, kind)
    }

    fn element_text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        let el = self.element(element)?;
        let text = self.runtime.block_on(el.inner_text())?;
        Ok(text.unwrap_or_default())
    }

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let el = self.element(element)?;
        self.runtime.block_on(el.click())?;
        Ok(())
    }

    fn drag_element(&mut self, element: &ElementHandle, dx: f64, dy: f64) -> DriverResult<()> {
        let el = self.element(element)?;
        let page = self.page()?;
        self.runtime.block_on(async {
            let start = el.clickable_point().await?;
            let (x, y) = (start.x, start.y);
            Self::dispatch_mouse(page, DispatchMouseEventType::MousePressed, x, y).await?;
            Self::dispatch_mouse(page, DispatchMouseEventType::MouseMoved, x + dx, y + dy).await?;
            Self::dispatch_mouse(page, DispatchMouseEventType::MouseReleased, x + dx, y + dy).await
        })
    }

    fn send_keys(&mut self, element: &ElementHandle, keys: &str) -> DriverResult<()> {
        let el = self.element(element)?;
        self.runtime.block_on(async {
            el.focus().await?;
            el.type_str(keys).await?;
            Ok::<_, CdpError>(())
        })?;
        Ok(())
    }

    fn set_file_input(&mut self, element: &ElementHandle, path: &Path) -> DriverResult<()> {
        if !path.exists() {
            return Err(DriverError::MissingFile(path.to_path_buf()));
        }
        let absolute = path.canonicalize()?;
        let el = self.element(element)?;
        let page = self.page()?;
        let params = SetFileInputFilesParams::builder()
            .file(absolute.to_string_lossy().to_string())
            .backend_node_id(el.backend_node_id)
            .build()
            .map_err(DriverError::Protocol)?;
        self.runtime.block_on(page.execute(params))?;
        Ok(())
    }

    fn page_source(&mut self) -> DriverResult<String> {
        let page = self.page()?;
        Ok(self.runtime.block_on(page.content())?)
    }

    fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        let page = self.page()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.runtime.block_on(page.save_screenshot(params, path))?;
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.elements.clear();
        self.page = None;
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        let result = self.runtime.block_on(async {
            browser.close().await?;
            browser.wait().await?;
            Ok::<_, DriverError>(())
        });
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        info!("chrome session closed");
        result
    }

    fn is_attached(&self) -> bool {
        self.page.is_some()
    }

    fn settle_poll(&self) -> Duration {
        self.settle_poll
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if self.browser.is_some() {
            if let Err(e) = self.close() {
                warn!("failed to close chrome cleanly: {}", e);
            }
        }
    }
}
