//! In-memory UI driver.
//!
//! `MockDriver` holds a flat list of elements standing in for a page. It
//! supports tag selectors and a small CSS subset (`tag`, `[attr='v']`,
//! `tag[attr='v']`, `#id`), records every interaction in a shared
//! [`MockLog`], and renders screenshots with [`Framebuffer`] so captures
//! produce real PNG files.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::UiDriver;
use super::types::{DriverError, DriverResult, ElementHandle, Lookup, SelectorKind};
use crate::capture::framebuffer::Framebuffer;

const SCREENSHOT_WIDTH: u32 = 320;
const SCREENSHOT_HEIGHT: u32 = 200;
const BACKGROUND: [u8; 3] = [32, 32, 48];
/// Fill of the viewport panel drawn for each `<canvas>` on the page
const CANVAS_FILL: [u8; 3] = [8, 8, 12];

/// One element of the simulated page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockElement {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
}

impl MockElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: Vec::new(),
            text: String::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn to_html(&self) -> String {
        let attrs: String = self
            .attributes
            .iter()
            .map(|(n, v)| format!(" {}=\"{}\"", n, v))
            .collect();
        format!("<{tag}{attrs}>{text}</{tag}>", tag = self.tag, attrs = attrs, text = self.text)
    }
}

/// An interaction performed against the mock page
#[derive(Debug, Clone, PartialEq)]
pub enum MockAction {
    Navigate(String),
    Click(String),
    Drag { selector: String, dx: f64, dy: f64 },
    SendKeys { selector: String, keys: String },
    SetFile { selector: String, path: PathBuf },
    Screenshot(PathBuf),
    Close,
}

/// Shared, cloneable view of the actions a [`MockDriver`] performed.
///
/// Keep a clone before handing the driver to a backend to inspect the
/// interaction history afterwards.
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    inner: Arc<Mutex<Vec<MockAction>>>,
}

impl MockLog {
    fn push(&self, action: MockAction) {
        self.lock().push(action);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MockAction>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn actions(&self) -> Vec<MockAction> {
        self.lock().clone()
    }

    /// Number of navigations that actually loaded a page
    pub fn page_loads(&self) -> usize {
        self.lock()
            .iter()
            .filter(|a| matches!(a, MockAction::Navigate(_)))
            .count()
    }

    pub fn contains(&self, action: &MockAction) -> bool {
        self.lock().contains(action)
    }
}

/// Simulated browser page
#[derive(Debug)]
pub struct MockDriver {
    elements: Vec<MockElement>,
    extra_source: String,
    reachable: bool,
    attached: bool,
    url: Option<String>,
    log: MockLog,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// An attached driver with an empty page
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            extra_source: String::new(),
            reachable: true,
            attached: true,
            url: None,
            log: MockLog::default(),
        }
    }

    pub fn element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Raw markup appended to the page source
    pub fn source(mut self, markup: impl Into<String>) -> Self {
        self.extra_source.push_str(&markup.into());
        self
    }

    /// Make every navigation fail as if nothing listened at the URL
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    fn ensure_attached(&self) -> DriverResult<()> {
        if self.attached { Ok(()) } else { Err(DriverError::NotAttached) }
    }

    fn element_at(&self, handle: &ElementHandle) -> DriverResult<&MockElement> {
        self.ensure_attached()?;
        self.elements
            .get(handle.id)
            .ok_or(DriverError::StaleElement(handle.id))
    }

    fn matching(&self, selector: &str, kind: SelectorKind) -> DriverResult<Vec<usize>> {
        self.ensure_attached()?;
        let css = kind.to_css(selector)?;
        let matcher = SimpleSelector::parse(&css)?;
        Ok(self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| matcher.matches(el))
            .map(|(idx, _)| idx)
            .collect())
    }
}

impl UiDriver for MockDriver {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.ensure_attached()?;
        if !self.reachable {
            return Err(DriverError::Unreachable {
                endpoint: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        if self.url.as_deref() == Some(url) {
            return Ok(());
        }
        self.url = Some(url.to_string());
        self.log.push(MockAction::Navigate(url.to_string()));
        Ok(())
    }

    fn current_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn find_element(&mut self, selector: &str, kind: SelectorKind) -> DriverResult<Lookup> {
        let found = self.matching(selector, kind)?;
        Ok(match found.first() {
            Some(&id) => Lookup::Found(ElementHandle::new(id, selector, kind)),
            None => Lookup::NotFound {
                selector: selector.to_string(),
            },
        })
    }

    fn find_all_elements(&mut self, selector: &str, kind: SelectorKind) -> DriverResult<Vec<ElementHandle>> {
        Ok(self
            .matching(selector, kind)?
            .into_iter()
            .map(|id| ElementHandle::new(id, selector, kind))
            .collect())
    }

    fn element_text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        Ok(self.element_at(element)?.text.clone())
    }

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.element_at(element)?;
        self.log.push(MockAction::Click(element.selector.clone()));
        Ok(())
    }

    fn drag_element(&mut self, element: &ElementHandle, dx: f64, dy: f64) -> DriverResult<()> {
        self.element_at(element)?;
        self.log.push(MockAction::Drag {
            selector: element.selector.clone(),
            dx,
            dy,
        });
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementHandle, keys: &str) -> DriverResult<()> {
        self.element_at(element)?;
        self.log.push(MockAction::SendKeys {
            selector: element.selector.clone(),
            keys: keys.to_string(),
        });
        Ok(())
    }

    fn set_file_input(&mut self, element: &ElementHandle, path: &Path) -> DriverResult<()> {
        let el = self.element_at(element)?;
        if el.attribute("type") != Some("file") {
            return Err(DriverError::Protocol(format!(
                "element '{}' is not a file input",
                element.selector
            )));
        }
        if !path.exists() {
            return Err(DriverError::MissingFile(path.to_path_buf()));
        }
        self.log.push(MockAction::SetFile {
            selector: element.selector.clone(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn page_source(&mut self) -> DriverResult<String> {
        self.ensure_attached()?;
        let body: String = self.elements.iter().map(MockElement::to_html).collect();
        Ok(format!("<html><body>{}{}</body></html>", body, self.extra_source))
    }

    fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        self.ensure_attached()?;
        let mut fb = Framebuffer::with_color(SCREENSHOT_WIDTH, SCREENSHOT_HEIGHT, BACKGROUND);
        let title = self.url.as_deref().unwrap_or("about:blank");
        fb.draw_text(4, 4, title, [255, 255, 255], BACKGROUND);
        for (row, el) in self.elements.iter().enumerate() {
            let y = 20 + row as u32 * 10;
            fb.draw_text(4, y, &format!("<{}>", el.tag), [200, 200, 120], BACKGROUND);
        }
        if self.elements.iter().any(|el| el.tag == "canvas") {
            fb.draw_rect(160, 20, 152, 172, CANVAS_FILL);
        }
        fb.save_png(path)
            .map_err(|e| DriverError::Protocol(format!("screenshot failed: {}", e)))?;
        self.log.push(MockAction::Screenshot(path.to_path_buf()));
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.attached {
            self.attached = false;
            self.log.push(MockAction::Close);
        }
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// `tag`, `[attr='v']`, `tag[attr='v']` or `#id`
struct SimpleSelector {
    tag: Option<String>,
    attribute: Option<(String, Option<String>)>,
}

impl SimpleSelector {
    fn parse(css: &str) -> DriverResult<Self> {
        let css = css.trim();
        if let Some(id) = css.strip_prefix('#') {
            return Ok(Self {
                tag: None,
                attribute: Some(("id".to_string(), Some(id.to_string()))),
            });
        }

        let (tag, rest) = match css.find('[') {
            Some(idx) => (&css[..idx], Some(&css[idx..])),
            None => (css, None),
        };
        let tag = if tag.is_empty() || tag == "*" {
            None
        } else {
            Some(tag.to_ascii_lowercase())
        };

        let attribute = match rest {
            None => None,
            Some(rest) => {
                let inner = rest
                    .strip_prefix('[')
                    .and_then(|r| r.strip_suffix(']'))
                    .ok_or_else(|| DriverError::InvalidSelector(css.to_string()))?;
                Some(match inner.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_string(),
                        Some(value.trim().trim_matches(|c| c == '\'' || c == '"').to_string()),
                    ),
                    None => (inner.trim().to_string(), None),
                })
            }
        };

        Ok(Self { tag, attribute })
    }

    fn matches(&self, element: &MockElement) -> bool {
        if let Some(tag) = &self.tag {
            if &element.tag != tag {
                return false;
            }
        }
        match &self.attribute {
            None => true,
            Some((name, None)) => element.attribute(name).is_some(),
            Some((name, Some(value))) => element.attribute(name) == Some(value.as_str()),
        }
    }
}
