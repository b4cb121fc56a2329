//! Incremental search menu and the word-match routine behind it.
//!
//! [`SearchMenu`] owns an editable query buffer, the current result list, and
//! a cyclic selection index. It never touches the document itself: results
//! come from an injected asynchronous search function, and [`SearchMenu::update`]
//! only re-queries when the buffer actually changed since the last call, so
//! the host can poll it on every keystroke without redundant document scans.
//!
//! [`search_lines`] is the standard matcher fed to the menu: whitespace-split
//! query words, each of which must be a substring of the canonicalized line.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use core_session::{BlockPath, LineHit};

pub type SearchFuture = Pin<Box<dyn Future<Output = anyhow::Result<Vec<LineHit>>> + Send>>;

/// Injected document search: query text in, matching lines out, in document
/// traversal order.
pub type SearchFn = Arc<dyn Fn(String) -> SearchFuture + Send + Sync>;

/// Callback invoked with the chosen result on [`SearchMenu::select`].
pub type SelectFn = Arc<dyn Fn(&LineHit) + Send + Sync>;

/// Menu handle shared between the host UI and search-mode commands.
pub type SharedSearchMenu = Arc<tokio::sync::Mutex<SearchMenu>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Stop collecting hits after this many lines matched.
    pub max_results: usize,
    pub case_sensitive: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 200,
            case_sensitive: false,
        }
    }
}

pub struct SearchMenu {
    query: String,
    last_query: Option<String>,
    results: Vec<LineHit>,
    selection: usize,
    search: SearchFn,
    on_select: SelectFn,
}

impl SearchMenu {
    pub fn new(search: SearchFn, on_select: SelectFn) -> Self {
        Self {
            query: String::new(),
            last_query: None,
            results: Vec::new(),
            selection: 0,
            search,
            on_select,
        }
    }

    pub fn shared(search: SearchFn, on_select: SelectFn) -> SharedSearchMenu {
        Arc::new(tokio::sync::Mutex::new(Self::new(search, on_select)))
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
    }

    pub fn backspace(&mut self) {
        self.query.pop();
    }

    pub fn results(&self) -> &[LineHit] {
        &self.results
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    pub fn selected(&self) -> Option<&LineHit> {
        self.results.get(self.selection)
    }

    /// Move the selection up, wrapping from the first result to the last.
    pub fn up(&mut self) {
        if self.results.is_empty() {
            return;
        }
        self.selection = if self.selection == 0 {
            self.results.len() - 1
        } else {
            self.selection - 1
        };
    }

    /// Move the selection down, wrapping from the last result to the first.
    pub fn down(&mut self) {
        if self.results.is_empty() {
            return;
        }
        self.selection = (self.selection + 1) % self.results.len();
    }

    /// Re-query if the buffer changed since the last call. An unchanged query
    /// is a no-op, so polling this after every keystroke costs nothing when
    /// the text did not move.
    pub async fn update(&mut self) -> anyhow::Result<()> {
        if self.last_query.as_deref() == Some(self.query.as_str()) {
            return Ok(());
        }
        debug!(target: "search", query = %self.query, "menu_update");
        let results = (self.search)(self.query.clone()).await?;
        debug!(target: "search", hits = results.len(), "menu_results");
        self.last_query = Some(self.query.clone());
        self.results = results;
        self.selection = 0;
        Ok(())
    }

    /// Invoke the select callback with the chosen result. No-op when there
    /// are no results.
    pub fn select(&self) {
        if let Some(hit) = self.selected() {
            (self.on_select)(hit);
        }
    }
}

fn query_words(query: &str, case_sensitive: bool) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| {
            if case_sensitive {
                w.to_string()
            } else {
                w.to_lowercase()
            }
        })
        .collect()
}

/// Match one line against prepared query words. Returns the grapheme indices
/// of every word occurrence for highlighting, or `None` when any word is
/// absent.
pub fn match_line(line: &str, words: &[String], case_sensitive: bool) -> Option<Vec<usize>> {
    if words.is_empty() {
        return None;
    }
    let canonical = if case_sensitive {
        line.to_string()
    } else {
        line.to_lowercase()
    };
    // Grapheme starts, for byte-offset -> display-index translation.
    let starts: Vec<usize> = canonical.grapheme_indices(true).map(|(i, _)| i).collect();
    let mut matches = Vec::new();
    for word in words {
        let mut found = false;
        for (byte, _) in canonical.match_indices(word.as_str()) {
            found = true;
            let idx = starts.partition_point(|&s| s <= byte).saturating_sub(1);
            matches.push(idx);
        }
        if !found {
            return None;
        }
    }
    matches.sort_unstable();
    matches.dedup();
    Some(matches)
}

/// Search lines in traversal order, collecting up to `opts.max_results` hits.
/// An empty query matches nothing.
pub fn search_lines(
    lines: impl IntoIterator<Item = (BlockPath, String)>,
    query: &str,
    opts: SearchOptions,
) -> Vec<LineHit> {
    let words = query_words(query, opts.case_sensitive);
    if words.is_empty() {
        return Vec::new();
    }
    let mut hits = Vec::new();
    for (path, line) in lines {
        if let Some(matches) = match_line(&line, &words, opts.case_sensitive) {
            hits.push(LineHit { path, matches });
            if hits.len() >= opts.max_results {
                debug!(target: "search", cap = opts.max_results, "result_cap_reached");
                break;
            }
        }
    }
    hits
}
