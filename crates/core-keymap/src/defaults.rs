//! Built-in binding tables. These form the base layer of every view; user
//! overlay tables from the config file are merged on top.

use core_session::Mode;

use crate::{KeySequence, MappingTable};

fn seqs(specs: &[&str]) -> Vec<KeySequence> {
    specs
        .iter()
        .map(|s| s.parse().expect("built-in sequence parses"))
        .collect()
}

/// Default bindings for every mode.
pub fn default_keymap() -> MappingTable {
    let mut table = MappingTable::new();

    // Normal mode: operators, edits, mode switches, macros.
    table.register_bulk(
        Mode::Normal,
        [
            ("delete", seqs(&["d d", "d <motion>"])),
            ("change", seqs(&["c c", "c <motion>"])),
            ("yank", seqs(&["y y", "y <motion>"])),
            ("paste-after", seqs(&["p"])),
            ("paste-before", seqs(&["P"])),
            ("undo", seqs(&["u"])),
            ("redo", seqs(&["ctrl+r"])),
            ("indent", seqs(&[">"])),
            ("outdent", seqs(&["<"])),
            ("join", seqs(&["J"])),
            ("enter-insert", seqs(&["i"])),
            ("enter-visual", seqs(&["v"])),
            ("enter-search", seqs(&["/"])),
            ("record-macro", seqs(&["q"])),
            ("play-macro", seqs(&["@"])),
            ("replay-last", seqs(&["."])),
            ("toggle-help", seqs(&["?"])),
        ]
        .map(|(name, alts)| (name.to_string(), alts)),
    );

    // Normal mode movement, as both standalone actions and operator targets.
    // The action and motion variants share key sequences; the dispatch layer
    // picks by kind.
    for (action, motion, keys) in [
        ("move-left", "motion-left", &["h", "left"] as &[&str]),
        ("move-right", "motion-right", &["l", "right"]),
        ("move-up", "motion-up", &["k", "up"]),
        ("move-down", "motion-down", &["j", "down"]),
        ("move-home", "motion-home", &["0", "home"]),
        ("move-end", "motion-end", &["$", "end"]),
        ("move-word-forward", "motion-word-forward", &["w"]),
        ("move-word-back", "motion-word-back", &["b"]),
        ("move-parent", "motion-parent", &["g p"]),
        ("move-next-clone", "motion-next-clone", &["g c"]),
    ] {
        for seq in seqs(keys) {
            table.register_sequence(Mode::Normal, seq.clone(), action);
            table.register_sequence(Mode::Normal, seq, motion);
        }
    }

    // Visual mode: operators act on the selection directly, no motion suffix.
    table.register_bulk(
        Mode::Visual,
        [
            ("delete", seqs(&["d", "x"])),
            ("change", seqs(&["c"])),
            ("yank", seqs(&["y"])),
            ("indent", seqs(&[">"])),
            ("outdent", seqs(&["<"])),
            ("leave-visual", seqs(&["esc", "v"])),
        ]
        .map(|(name, alts)| (name.to_string(), alts)),
    );
    for (action, keys) in [
        ("move-left", &["h", "left"] as &[&str]),
        ("move-right", &["l", "right"]),
        ("move-up", &["k", "up"]),
        ("move-down", &["j", "down"]),
        ("move-home", &["0", "home"]),
        ("move-end", &["$", "end"]),
        ("move-word-forward", &["w"]),
        ("move-word-back", &["b"]),
    ] {
        for seq in seqs(keys) {
            table.register_sequence(Mode::Visual, seq, action);
        }
    }

    // Insert and search modes only bind their exits and menu navigation;
    // everything unmapped falls through to text entry in the host.
    table.register_bulk(
        Mode::Insert,
        [
            ("leave-insert".to_string(), seqs(&["esc"])),
            ("split-line".to_string(), seqs(&["enter"])),
        ],
    );
    table.register_bulk(
        Mode::Search,
        [
            ("search-up", seqs(&["up", "ctrl+k"])),
            ("search-down", seqs(&["down", "ctrl+j"])),
            ("search-accept", seqs(&["enter"])),
            ("leave-search", seqs(&["esc"])),
        ]
        .map(|(name, alts)| (name.to_string(), alts)),
    );

    table
}
