//! Per-mode key-mapping tables and their merge semantics.
//!
//! A [`MappingTable`] maps each editing [`Mode`] to a [`ModeMapping`]:
//! command name -> alternative [`KeySequence`]s (OR-semantics, any one
//! triggers the command). Tables are layered rather than copied: built-in
//! bindings, then mode-family defaults, then user customization, composed
//! with [`KeymapView::merge`]. A merged view reads its parents live at
//! resolution time, so editing a parent table is immediately visible in every
//! derived view without an explicit re-merge.
//!
//! Change notification rides a watch channel per table ([`Keymap::subscribe`],
//! [`KeymapView::subscribe`]) so hotkey-help renderers can refresh.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, warn};

use core_keys::{KeyParseError, KeyToken};
use core_session::Mode;

mod defaults;

pub use defaults::default_keymap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("key sequence is empty")]
    Empty,
    #[error("motion placeholder must be the final token of a sequence")]
    PlaceholderNotLast,
    #[error("a sequence may contain at most one motion placeholder")]
    MultiplePlaceholders,
    #[error(transparent)]
    Key(#[from] KeyParseError),
}

/// Ordered key tokens bound to a command. At most one motion placeholder, and
/// only in final position: an operator consumes a complete trailing motion,
/// never one embedded mid-sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySequence {
    tokens: Vec<KeyToken>,
}

impl KeySequence {
    pub fn new(tokens: Vec<KeyToken>) -> Result<Self, SequenceError> {
        if tokens.is_empty() {
            return Err(SequenceError::Empty);
        }
        let placeholders = tokens.iter().filter(|t| t.is_placeholder()).count();
        match placeholders {
            0 => {}
            1 if tokens.last().is_some_and(KeyToken::is_placeholder) => {}
            1 => return Err(SequenceError::PlaceholderNotLast),
            _ => return Err(SequenceError::MultiplePlaceholders),
        }
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[KeyToken] {
        &self.tokens
    }

    pub fn has_placeholder(&self) -> bool {
        self.tokens.last().is_some_and(KeyToken::is_placeholder)
    }

    /// Tokens before the placeholder (the whole sequence when there is none).
    pub fn literal_prefix(&self) -> &[KeyToken] {
        if self.has_placeholder() {
            &self.tokens[..self.tokens.len() - 1]
        } else {
            &self.tokens
        }
    }
}

impl FromStr for KeySequence {
    type Err = SequenceError;

    /// Parse a whitespace-separated sequence, e.g. `"d d"` or `"d <motion>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = core_keys::parse_token_run(s)?;
        Self::new(tokens)
    }
}

impl fmt::Display for KeySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tok) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{tok}")?;
        }
        Ok(())
    }
}

/// Command name -> alternative sequences for one mode.
pub type ModeMapping = HashMap<String, Vec<KeySequence>>;

/// Mode -> [`ModeMapping`]. The plain data structure; sharing and
/// notification live in [`Keymap`].
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    modes: HashMap<Mode, ModeMapping>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `sequence` to the alternatives for `name` under `mode`,
    /// creating entries as needed.
    pub fn register_sequence(&mut self, mode: Mode, sequence: KeySequence, name: &str) {
        self.modes
            .entry(mode)
            .or_default()
            .entry(name.to_string())
            .or_default()
            .push(sequence);
    }

    pub fn register_bulk(
        &mut self,
        mode: Mode,
        mapping: impl IntoIterator<Item = (String, Vec<KeySequence>)>,
    ) {
        for (name, sequences) in mapping {
            for seq in sequences {
                self.register_sequence(mode, seq, &name);
            }
        }
    }

    /// Remove the first alternative structurally equal to `sequence`. Mapping
    /// edits are expected to be approximate (user-provided overrides), so a
    /// miss logs and no-ops instead of failing.
    pub fn deregister_sequence(&mut self, mode: Mode, sequence: &KeySequence, name: &str) {
        let found = self
            .modes
            .get_mut(&mode)
            .and_then(|m| m.get_mut(name))
            .and_then(|alts| {
                let idx = alts.iter().position(|s| s == sequence)?;
                alts.remove(idx);
                Some(())
            });
        if found.is_none() {
            warn!(
                target: "keymap",
                mode = mode.as_str(),
                name,
                sequence = %sequence,
                "deregister_sequence_missing"
            );
        }
    }

    pub fn mode_mapping(&self, mode: Mode) -> Option<&ModeMapping> {
        self.modes.get(&mode)
    }

    /// Overlay `other` onto `self` per mode: same name in both -> `other`
    /// wins for that mode.
    fn overlaid(&self, other: &MappingTable) -> MappingTable {
        let mut out = self.clone();
        for (mode, mapping) in &other.modes {
            let target = out.modes.entry(*mode).or_default();
            for (name, sequences) in mapping {
                target.insert(name.clone(), sequences.clone());
            }
        }
        out
    }
}

/// Shared, subscribable handle around a [`MappingTable`].
#[derive(Clone)]
pub struct Keymap {
    table: Arc<RwLock<MappingTable>>,
    notify: Arc<watch::Sender<u64>>,
}

impl Default for Keymap {
    fn default() -> Self {
        Self::new(MappingTable::new())
    }
}

impl Keymap {
    pub fn new(table: MappingTable) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            table: Arc::new(RwLock::new(table)),
            notify: Arc::new(notify),
        }
    }

    pub fn register_sequence(&self, mode: Mode, sequence: KeySequence, name: &str) {
        debug!(target: "keymap", mode = mode.as_str(), name, sequence = %sequence, "register_sequence");
        self.write(|t| t.register_sequence(mode, sequence, name));
    }

    pub fn register_bulk(
        &self,
        mode: Mode,
        mapping: impl IntoIterator<Item = (String, Vec<KeySequence>)>,
    ) {
        self.write(|t| t.register_bulk(mode, mapping));
    }

    pub fn deregister_sequence(&self, mode: Mode, sequence: &KeySequence, name: &str) {
        self.write(|t| t.deregister_sequence(mode, sequence, name));
    }

    /// Snapshot of the table (used by persistence; resolution goes through
    /// [`KeymapView`]).
    pub fn snapshot(&self) -> MappingTable {
        self.table.read().expect("keymap lock poisoned").clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    fn write(&self, f: impl FnOnce(&mut MappingTable)) {
        {
            let mut guard = self.table.write().expect("keymap lock poisoned");
            f(&mut guard);
        }
        self.notify.send_modify(|v| *v += 1);
    }
}

/// A resolvable view over one or more layered [`Keymap`]s.
///
/// `Overlay` reads both parents at resolution time: the derived view stays
/// consistent with parent edits through the shared handles rather than a
/// one-time snapshot.
#[derive(Clone)]
pub enum KeymapView {
    Table(Keymap),
    Overlay {
        base: Box<KeymapView>,
        overlay: Box<KeymapView>,
    },
}

impl From<Keymap> for KeymapView {
    fn from(keymap: Keymap) -> Self {
        KeymapView::Table(keymap)
    }
}

impl KeymapView {
    pub fn merge(base: impl Into<KeymapView>, overlay: impl Into<KeymapView>) -> Self {
        KeymapView::Overlay {
            base: Box::new(base.into()),
            overlay: Box::new(overlay.into()),
        }
    }

    /// Effective table for this view as of now.
    pub fn effective(&self) -> MappingTable {
        match self {
            KeymapView::Table(keymap) => keymap.snapshot(),
            KeymapView::Overlay { base, overlay } => {
                base.effective().overlaid(&overlay.effective())
            }
        }
    }

    /// Effective (name -> alternatives) mapping for one mode.
    pub fn effective_mode(&self, mode: Mode) -> ModeMapping {
        self.effective()
            .mode_mapping(mode)
            .cloned()
            .unwrap_or_default()
    }

    /// Watcher resolving whenever any table underneath this view changes.
    pub fn subscribe(&self) -> KeymapWatcher {
        let mut receivers = Vec::new();
        self.collect_receivers(&mut receivers);
        KeymapWatcher { receivers }
    }

    fn collect_receivers(&self, out: &mut Vec<watch::Receiver<u64>>) {
        match self {
            KeymapView::Table(keymap) => out.push(keymap.subscribe()),
            KeymapView::Overlay { base, overlay } => {
                base.collect_receivers(out);
                overlay.collect_receivers(out);
            }
        }
    }
}

/// Awaits a change in any parent table of a [`KeymapView`].
pub struct KeymapWatcher {
    receivers: Vec<watch::Receiver<u64>>,
}

impl KeymapWatcher {
    /// Completes when any underlying table reports a new version. Returns
    /// `false` when every sender is gone and no further change can arrive.
    pub async fn changed(&mut self) -> bool {
        use std::task::Poll;

        if self.receivers.is_empty() {
            return false;
        }
        let mut futures: Vec<_> = self
            .receivers
            .iter_mut()
            .map(|rx| Box::pin(rx.changed()))
            .collect();
        std::future::poll_fn(move |cx| {
            let mut all_closed = true;
            for fut in futures.iter_mut() {
                match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(())) => return Poll::Ready(true),
                    Poll::Ready(Err(_)) => {}
                    Poll::Pending => all_closed = false,
                }
            }
            if all_closed {
                Poll::Ready(false)
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// Non-blocking check: true when any table has a version the caller has
    /// not seen yet, marking every new version as seen.
    pub fn poll_changed(&mut self) -> bool {
        let mut changed = false;
        for rx in &mut self.receivers {
            if rx.has_changed().unwrap_or(false) {
                rx.borrow_and_update();
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seq(s: &str) -> KeySequence {
        s.parse().expect("test sequence parses")
    }

    #[test]
    fn sequence_placeholder_rules() {
        assert!(seq("d <motion>").has_placeholder());
        assert_eq!(seq("d <motion>").literal_prefix(), &[KeyToken::ch('d')]);
        assert_eq!(
            "d <motion> x".parse::<KeySequence>().unwrap_err(),
            SequenceError::PlaceholderNotLast
        );
        assert_eq!(
            "<motion> <motion>".parse::<KeySequence>().unwrap_err(),
            SequenceError::MultiplePlaceholders
        );
        assert_eq!("".parse::<KeySequence>().unwrap_err(), SequenceError::Empty);
    }

    #[test]
    fn sequence_display_round_trips() {
        for text in ["d d", "d <motion>", "ctrl+d", "g p"] {
            assert_eq!(seq(text).to_string(), text);
        }
    }

    #[test]
    fn register_appends_alternatives() {
        let mut table = MappingTable::new();
        table.register_sequence(Mode::Normal, seq("h"), "move-left");
        table.register_sequence(Mode::Normal, seq("left"), "move-left");
        let mapping = table.mode_mapping(Mode::Normal).unwrap();
        assert_eq!(mapping["move-left"], vec![seq("h"), seq("left")]);
    }

    #[test]
    fn deregister_removes_first_match_and_tolerates_misses() {
        let mut table = MappingTable::new();
        table.register_sequence(Mode::Normal, seq("h"), "move-left");
        table.register_sequence(Mode::Normal, seq("left"), "move-left");
        table.deregister_sequence(Mode::Normal, &seq("h"), "move-left");
        assert_eq!(
            table.mode_mapping(Mode::Normal).unwrap()["move-left"],
            vec![seq("left")]
        );
        // Unknown sequence / name / mode: silent no-ops.
        table.deregister_sequence(Mode::Normal, &seq("x"), "move-left");
        table.deregister_sequence(Mode::Normal, &seq("h"), "unknown");
        table.deregister_sequence(Mode::Insert, &seq("h"), "move-left");
        assert_eq!(
            table.mode_mapping(Mode::Normal).unwrap()["move-left"],
            vec![seq("left")]
        );
    }

    #[test]
    fn register_bulk_applies_every_pair() {
        let mut table = MappingTable::new();
        table.register_bulk(
            Mode::Normal,
            [
                ("move-left".to_string(), vec![seq("h")]),
                ("move-right".to_string(), vec![seq("l"), seq("right")]),
            ],
        );
        let mapping = table.mode_mapping(Mode::Normal).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["move-right"], vec![seq("l"), seq("right")]);
    }

    #[test]
    fn merge_overlay_wins_per_name() {
        let a = Keymap::default();
        a.register_sequence(Mode::Normal, seq("h"), "move-left");
        a.register_sequence(Mode::Normal, seq("l"), "move-right");
        let b = Keymap::default();
        b.register_sequence(Mode::Normal, seq("left"), "move-left");

        let merged = KeymapView::merge(a.clone(), b.clone());
        let mapping = merged.effective_mode(Mode::Normal);
        // Defined in both -> b wins; only in a -> a's binding survives.
        assert_eq!(mapping["move-left"], vec![seq("left")]);
        assert_eq!(mapping["move-right"], vec![seq("l")]);
    }

    #[test]
    fn merge_reflects_later_parent_edits() {
        let a = Keymap::default();
        let b = Keymap::default();
        let merged = KeymapView::merge(a.clone(), b.clone());
        assert!(merged.effective_mode(Mode::Normal).is_empty());

        a.register_sequence(Mode::Normal, seq("u"), "undo");
        assert_eq!(merged.effective_mode(Mode::Normal)["undo"], vec![seq("u")]);

        b.register_sequence(Mode::Normal, seq("ctrl+z"), "undo");
        assert_eq!(
            merged.effective_mode(Mode::Normal)["undo"],
            vec![seq("ctrl+z")]
        );
    }

    #[tokio::test]
    async fn watcher_wakes_on_any_parent_edit() {
        let a = Keymap::default();
        let b = Keymap::default();
        let merged = KeymapView::merge(a.clone(), b.clone());
        let mut watcher = merged.subscribe();

        b.register_sequence(Mode::Visual, seq("d"), "visual-delete");
        assert!(watcher.changed().await);

        a.register_sequence(Mode::Normal, seq("x"), "delete-char");
        assert!(watcher.changed().await);
    }

    #[test]
    fn watcher_poll_reports_each_edit_once() {
        let a = Keymap::default();
        let b = Keymap::default();
        let merged = KeymapView::merge(a.clone(), b.clone());
        let mut watcher = merged.subscribe();

        assert!(!watcher.poll_changed());
        b.register_sequence(Mode::Normal, seq("x"), "delete-char");
        assert!(watcher.poll_changed());
        assert!(!watcher.poll_changed());

        a.register_sequence(Mode::Visual, seq("d"), "visual-delete");
        assert!(watcher.poll_changed());
    }

    #[tokio::test]
    async fn watcher_ends_when_tables_are_dropped() {
        let a = Keymap::default();
        let mut watcher = KeymapView::from(a.clone()).subscribe();
        a.register_sequence(Mode::Normal, seq("u"), "undo");
        assert!(watcher.changed().await);
        drop(a);
        assert!(!watcher.changed().await);
    }
}
