//! Configuration pages.
//!
//! Process configuration is a stack of named pages, each a list of
//! `name value` lines. Archives contribute one page per top-level `.prc` file
//! and window setup contributes a page of its own. Lookups consult the most
//! recently loaded page first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Handle returned by [`ConfigPageManager::load_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPage {
    pub id: PageId,
    pub name: String,
    pub variables: Vec<(String, String)>,
}

impl ConfigPage {
    pub fn get(&self, variable: &str) -> Option<&str> {
        self.variables
            .iter()
            .rev()
            .find(|(name, _)| name == variable)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse page text: one `name value` declaration per line, `#` comments and
/// blank lines skipped. The value is the rest of the line and may be empty.
pub fn parse_page(data: &str) -> Vec<(String, String)> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((name, value)) => (name.to_string(), value.trim().to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ConfigPageManager {
    pages: RwLock<Vec<ConfigPage>>,
    next_id: AtomicU64,
}

impl ConfigPageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_page(&self, name: &str, data: &str) -> PageId {
        let id = PageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let variables = parse_page(data);
        debug!(page = name, variables = variables.len(), "Loaded config page");
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ConfigPage {
                id,
                name: name.to_string(),
                variables,
            });
        id
    }

    /// Returns false if `id` was not loaded.
    pub fn unload_page(&self, id: PageId) -> bool {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        let before = pages.len();
        pages.retain(|page| page.id != id);
        let removed = pages.len() != before;
        if removed {
            debug!(page_id = id.0, "Unloaded config page");
        }
        removed
    }

    /// Value of `variable` from the most recently loaded page declaring it.
    pub fn get(&self, variable: &str) -> Option<String> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find_map(|page| page.get(variable).map(str::to_string))
    }

    pub fn page(&self, id: PageId) -> Option<ConfigPage> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|page| page.id == id)
            .cloned()
    }

    /// Loaded page names, oldest first.
    pub fn page_names(&self) -> Vec<String> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|page| page.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_keeps_empty_values() {
        let vars = parse_page("# window\nwindow-type onscreen\n\n  win-size 800 600  \nsubprocess-window \n");
        assert_eq!(
            vars,
            vec![
                ("window-type".to_string(), "onscreen".to_string()),
                ("win-size".to_string(), "800 600".to_string()),
                ("subprocess-window".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_latest_page_wins_until_unloaded() {
        let manager = ConfigPageManager::new();
        manager.load_page("/mf/base.prc", "fullscreen 0\nsync-video 1\n");
        let window = manager.load_page("setupWindow", "fullscreen 1\n");

        assert_eq!(manager.get("fullscreen").as_deref(), Some("1"));
        assert_eq!(manager.get("sync-video").as_deref(), Some("1"));
        assert_eq!(manager.page_names(), vec!["/mf/base.prc", "setupWindow"]);

        assert!(manager.unload_page(window));
        assert!(!manager.unload_page(window));
        assert_eq!(manager.get("fullscreen").as_deref(), Some("0"));
        assert_eq!(manager.get("missing"), None);
    }
}
