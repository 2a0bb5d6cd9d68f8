//! UI automation.
//!
//! [`UiDriver`] is the capability a browser-automation session offers to test
//! cases: navigate, look up elements, interact with them, read the page and
//! take screenshots. [`ChromeDriver`] speaks the DevTools protocol to a real
//! browser; [`MockDriver`] is an in-memory page for tests and dry runs.

use std::path::Path;
use std::time::Duration;

pub mod chrome;
pub mod mock;
pub mod types;
pub mod wait;

pub use chrome::ChromeDriver;
pub use mock::{MockAction, MockDriver, MockElement};
pub use types::{
    DriverError, DriverResult, ElementHandle, ElementTable, Lookup, SelectorKind, SettleCondition,
    Settled,
};

use crate::config::DEFAULT_SETTLE_POLL;

/// Browser automation capability
pub trait UiDriver {
    /// Load `url`. Navigating to the page already loaded is a no-op.
    fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// URL of the loaded page, if any
    fn current_url(&self) -> Option<&str>;

    /// First element matching `selector`, or [`Lookup::NotFound`].
    ///
    /// Handles stay valid until the next lookup or navigation.
    fn find_element(&mut self, selector: &str, kind: SelectorKind) -> DriverResult<Lookup>;

    /// Every element matching `selector`, in document order
    fn find_all_elements(&mut self, selector: &str, kind: SelectorKind) -> DriverResult<Vec<ElementHandle>>;

    /// Rendered text content of an element
    fn element_text(&mut self, element: &ElementHandle) -> DriverResult<String>;

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Press on the element, move by (`dx`, `dy`) pixels, release
    fn drag_element(&mut self, element: &ElementHandle, dx: f64, dy: f64) -> DriverResult<()>;

    /// Type `keys` into the focused element
    fn send_keys(&mut self, element: &ElementHandle, keys: &str) -> DriverResult<()>;

    /// Attach a local file to a file input element
    fn set_file_input(&mut self, element: &ElementHandle, path: &Path) -> DriverResult<()>;

    /// Serialized DOM of the loaded page
    fn page_source(&mut self) -> DriverResult<String>;

    /// Write a PNG of the visible page to `path`
    fn screenshot(&mut self, path: &Path) -> DriverResult<()>;

    /// End the session. Closing twice is harmless.
    fn close(&mut self) -> DriverResult<()>;

    fn is_attached(&self) -> bool;

    /// Interval between probes in [`UiDriver::wait_until_settled`]
    fn settle_poll(&self) -> Duration {
        Duration::from_millis(DEFAULT_SETTLE_POLL)
    }

    /// Wait for the UI to settle.
    ///
    /// With a condition, polls until it holds or `ceiling` elapses. Without
    /// one, sleeps for `ceiling`. Reaching the ceiling is not an error.
    fn wait_until_settled(
        &mut self,
        ceiling: Duration,
        condition: Option<&SettleCondition>,
    ) -> DriverResult<Settled> {
        match condition {
            Some(condition) => {
                let poll = self.settle_poll();
                wait::poll_until(ceiling, poll, || condition.holds(&mut *self))
            }
            None => Ok(wait::sleep_for(ceiling)),
        }
    }

    fn name(&self) -> &str {
        "driver"
    }
}
