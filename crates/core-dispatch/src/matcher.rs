//! Buffer-to-sequence matching, parametrized by command kind so the same
//! walk serves top-level action dispatch and nested motion resolution.

use tracing::{debug, warn};

use core_commands::{CommandKind, CommandRegistry};
use core_keymap::ModeMapping;
use core_keys::KeyToken;

/// Repeat counts saturate here rather than overflowing.
pub(crate) const MAX_REPEAT: u32 = 999_999;

/// Split leading digit tokens off `tokens` into a repeat count. A leading
/// `0` never starts a count; it stays in the buffer as an ordinary key.
/// Returns the count (1 when no digits) and the number of tokens consumed.
pub(crate) fn split_count(tokens: &[KeyToken]) -> (u32, usize) {
    let mut count: Option<u32> = None;
    let mut idx = 0;
    while idx < tokens.len() {
        match tokens[idx].count_digit() {
            Some(0) if count.is_none() => break,
            Some(d) => {
                count = Some(
                    count
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(d)
                        .min(MAX_REPEAT),
                );
                idx += 1;
            }
            None => break,
        }
    }
    (count.unwrap_or(1), idx)
}

/// How the current buffer relates to the sequences of one kind in one mode.
/// All candidate classes are reported; the engine applies the precedence
/// (full exact, then operator entry, then contained exact, then prefix).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct BufferMatch {
    /// A placeholder-free sequence equal to the whole buffer.
    pub full: Option<String>,
    /// An operator sequence whose literal prefix starts the buffer, with the
    /// literal length. The longest literal prefix wins.
    pub operator: Option<(String, usize)>,
    /// A placeholder-free sequence that is a strict prefix of the buffer,
    /// with its length. Arises only when a prior cycle held the buffer while
    /// waiting for trailing input. The longest sequence wins.
    pub contained: Option<(String, usize)>,
    /// The buffer is a strict prefix of at least one longer sequence.
    pub prefix: bool,
}

fn longer(current: &Option<(String, usize)>, len: usize, name: &str) -> bool {
    match current {
        None => true,
        Some((held, held_len)) => len > *held_len || (len == *held_len && name < held.as_str()),
    }
}

/// Match `buffer` against every `kind`-command sequence in `mapping`.
/// Bindings naming unregistered commands are skipped; ties between equally
/// specific candidates resolve to the lexicographically smaller name.
pub(crate) fn match_buffer(
    registry: &CommandRegistry,
    mapping: &ModeMapping,
    buffer: &[KeyToken],
    kind: CommandKind,
) -> BufferMatch {
    let mut m = BufferMatch::default();
    for (name, alternatives) in mapping {
        let Some(command) = registry.lookup(name) else {
            debug!(target: "dispatch.matcher", name, "binding_without_command");
            continue;
        };
        if command.kind() != kind {
            continue;
        }
        for seq in alternatives {
            let lits = seq.literal_prefix();
            if seq.has_placeholder() {
                // A motion cannot itself take a motion argument.
                if kind != CommandKind::Action {
                    continue;
                }
                if buffer.len() >= lits.len() && buffer[..lits.len()] == *lits {
                    if longer(&m.operator, lits.len(), name) {
                        m.operator = Some((name.clone(), lits.len()));
                    }
                } else if lits.len() > buffer.len() && lits[..buffer.len()] == *buffer {
                    m.prefix = true;
                }
            } else if lits == buffer {
                match &m.full {
                    Some(held) if name >= held => {
                        warn!(
                            target: "dispatch.matcher",
                            kept = %held,
                            dropped = %name,
                            "ambiguous_exact_match"
                        );
                    }
                    _ => m.full = Some(name.clone()),
                }
            } else if lits.len() > buffer.len() && lits[..buffer.len()] == *buffer {
                m.prefix = true;
            } else if lits.len() < buffer.len()
                && buffer[..lits.len()] == *lits
                && longer(&m.contained, lits.len(), name)
            {
                m.contained = Some((name.clone(), lits.len()));
            }
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_commands::{ActionDef, Command, MotionDef, ReplayPolicy};
    use core_keymap::MappingTable;
    use core_session::Mode;
    use pretty_assertions::assert_eq;

    fn registry() -> CommandRegistry {
        let mut reg = CommandRegistry::new();
        for name in ["delete", "join", "quit-hint"] {
            reg.register(Command::Action(ActionDef::new(
                name,
                "test",
                ReplayPolicy::Keep,
                |_| Box::pin(async { Ok(()) }),
            )))
            .unwrap();
        }
        reg.register(Command::Motion(MotionDef::simple(
            "motion-right",
            "test",
            |_, _| {},
        )))
        .unwrap();
        reg
    }

    fn mapping() -> ModeMapping {
        let mut table = MappingTable::new();
        for (name, spec) in [
            ("delete", "d d"),
            ("delete", "d <motion>"),
            ("join", "J"),
            ("quit-hint", "d q h"),
            ("motion-right", "l"),
        ] {
            table.register_sequence(Mode::Normal, spec.parse().unwrap(), name);
        }
        table.mode_mapping(Mode::Normal).unwrap().clone()
    }

    fn toks(s: &str) -> Vec<KeyToken> {
        core_keys::parse_token_run(s).unwrap()
    }

    #[test]
    fn count_splitting() {
        assert_eq!(split_count(&toks("d d")), (1, 0));
        assert_eq!(split_count(&toks("3 d")), (3, 1));
        assert_eq!(split_count(&toks("1 0 d")), (10, 2));
        // A leading zero is a key, not a count.
        assert_eq!(split_count(&toks("0 d")), (1, 0));
        // Digits with modifiers never extend a count.
        assert_eq!(split_count(&toks("3 ctrl+3 d")), (3, 1));
    }

    #[test]
    fn count_saturates() {
        let nines = toks("9 9 9 9 9 9 9 9");
        assert_eq!(split_count(&nines), (MAX_REPEAT, 8));
    }

    #[test]
    fn single_token_is_operator_entry_and_prefix() {
        let reg = registry();
        let m = match_buffer(&reg, &mapping(), &toks("d"), CommandKind::Action);
        assert_eq!(m.full, None);
        assert_eq!(m.operator, Some(("delete".into(), 1)));
        assert!(m.prefix);
    }

    #[test]
    fn full_match_reported_alongside_operator() {
        let reg = registry();
        let m = match_buffer(&reg, &mapping(), &toks("d d"), CommandKind::Action);
        assert_eq!(m.full, Some("delete".into()));
        assert_eq!(m.operator, Some(("delete".into(), 1)));
    }

    #[test]
    fn kind_filter_hides_other_kind() {
        let reg = registry();
        let action = match_buffer(&reg, &mapping(), &toks("l"), CommandKind::Action);
        assert_eq!(action, BufferMatch::default());
        let motion = match_buffer(&reg, &mapping(), &toks("l"), CommandKind::Motion);
        assert_eq!(motion.full, Some("motion-right".into()));
    }

    #[test]
    fn contained_match_carries_consumed_length() {
        let reg = registry();
        let m = match_buffer(&reg, &mapping(), &toks("J x"), CommandKind::Action);
        assert_eq!(m.full, None);
        assert_eq!(m.contained, Some(("join".into(), 1)));
    }

    #[test]
    fn unrelated_buffer_matches_nothing() {
        let reg = registry();
        let m = match_buffer(&reg, &mapping(), &toks("z"), CommandKind::Action);
        assert_eq!(m, BufferMatch::default());
    }
}
