//! Key-token model shared by the keymap and dispatch crates.
//!
//! A [`KeyToken`] is either a literal chord (printable character or named key
//! plus a modifier mask) or the reserved motion placeholder that marks where
//! an operator expects a trailing motion sequence. Tokens round-trip through
//! a lowercase `+`-joined textual form (`"ctrl+d"`, `"esc"`, `"<motion>"`)
//! which is also the serde representation used by keymap overlay files and
//! persisted macro registers.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ModMask: u16 { const CTRL=1; const ALT=2; const SHIFT=4; const META=8; const SUPER=16; }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Esc,
    Backspace,
    Tab,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Delete,
    F(u8),
}

impl NamedKey {
    fn as_str(&self) -> String {
        match self {
            NamedKey::Enter => "enter".into(),
            NamedKey::Esc => "esc".into(),
            NamedKey::Backspace => "backspace".into(),
            NamedKey::Tab => "tab".into(),
            NamedKey::Space => "space".into(),
            NamedKey::Up => "up".into(),
            NamedKey::Down => "down".into(),
            NamedKey::Left => "left".into(),
            NamedKey::Right => "right".into(),
            NamedKey::Home => "home".into(),
            NamedKey::End => "end".into(),
            NamedKey::PageUp => "pageup".into(),
            NamedKey::PageDown => "pagedown".into(),
            NamedKey::Delete => "delete".into(),
            NamedKey::F(n) => format!("f{n}"),
        }
    }

    fn parse(word: &str) -> Option<NamedKey> {
        let key = match word {
            "enter" | "return" => NamedKey::Enter,
            "esc" | "escape" => NamedKey::Esc,
            "backspace" => NamedKey::Backspace,
            "tab" => NamedKey::Tab,
            "space" => NamedKey::Space,
            "up" => NamedKey::Up,
            "down" => NamedKey::Down,
            "left" => NamedKey::Left,
            "right" => NamedKey::Right,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "pageup" => NamedKey::PageUp,
            "pagedown" => NamedKey::PageDown,
            "delete" | "del" => NamedKey::Delete,
            _ => {
                let n = word.strip_prefix('f')?.parse::<u8>().ok()?;
                NamedKey::F(n)
            }
        };
        Some(key)
    }
}

/// Base identity of a literal chord: a printable character or a named key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBase {
    Char(char),
    Named(NamedKey),
}

/// A literal chord: base identity plus modifier mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub base: KeyBase,
    pub mods: ModMask,
}

impl Chord {
    pub const fn new(base: KeyBase, mods: ModMask) -> Self {
        Self { base, mods }
    }
}

/// A single input token as consumed by the dispatch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyToken {
    /// A literal key chord, e.g. `d` or `ctrl+d`.
    Lit(Chord),
    /// Reserved placeholder meaning "a motion sequence goes here". Only valid
    /// as the final token of an operator's key sequence.
    MotionHere,
}

impl KeyToken {
    /// Unmodified printable character.
    pub const fn ch(c: char) -> Self {
        KeyToken::Lit(Chord::new(KeyBase::Char(c), ModMask::empty()))
    }

    /// Printable character with CTRL held.
    pub const fn ctrl(c: char) -> Self {
        KeyToken::Lit(Chord::new(KeyBase::Char(c), ModMask::CTRL))
    }

    /// Unmodified named key.
    pub const fn named(key: NamedKey) -> Self {
        KeyToken::Lit(Chord::new(KeyBase::Named(key), ModMask::empty()))
    }

    pub const fn is_placeholder(&self) -> bool {
        matches!(self, KeyToken::MotionHere)
    }

    /// Digit value when this token can extend a repeat count: an unmodified
    /// `'0'..='9'` chord. Named keys, modified chords, and the placeholder
    /// never count.
    pub fn count_digit(&self) -> Option<u32> {
        match self {
            KeyToken::Lit(Chord {
                base: KeyBase::Char(c),
                mods,
            }) if mods.is_empty() => c.to_digit(10),
            _ => None,
        }
    }
}

fn mods_prefix(mods: ModMask, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if mods.contains(ModMask::CTRL) {
        write!(f, "ctrl+")?;
    }
    if mods.contains(ModMask::ALT) {
        write!(f, "alt+")?;
    }
    if mods.contains(ModMask::SHIFT) {
        write!(f, "shift+")?;
    }
    if mods.contains(ModMask::META) {
        write!(f, "meta+")?;
    }
    if mods.contains(ModMask::SUPER) {
        write!(f, "super+")?;
    }
    Ok(())
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyToken::MotionHere => write!(f, "<motion>"),
            KeyToken::Lit(chord) => {
                mods_prefix(chord.mods, f)?;
                match chord.base {
                    KeyBase::Char(c) => write!(f, "{c}"),
                    KeyBase::Named(n) => write!(f, "{}", n.as_str()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("empty key token")]
    Empty,
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
    #[error("unknown key `{0}`")]
    UnknownKey(String),
}

impl FromStr for KeyToken {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(KeyParseError::Empty);
        }
        if s == "<motion>" {
            return Ok(KeyToken::MotionHere);
        }
        let mut mods = ModMask::empty();
        // A literal '+' key sits after the final separator ("ctrl++", bare "+").
        let (mods_str, base_word) = match s.rfind('+') {
            Some(i) if i + 1 < s.len() => (&s[..i], &s[i + 1..]),
            Some(i) => (s[..i].strip_suffix('+').unwrap_or(&s[..i]), "+"),
            None => ("", s),
        };
        for word in mods_str.split('+').filter(|w| !w.is_empty()) {
            mods |= match word {
                "ctrl" | "c" => ModMask::CTRL,
                "alt" | "a" => ModMask::ALT,
                "shift" | "s" => ModMask::SHIFT,
                "meta" | "m" => ModMask::META,
                "super" => ModMask::SUPER,
                other => return Err(KeyParseError::UnknownModifier(other.to_string())),
            };
        }
        let base = {
            let mut chars = base_word.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyBase::Char(c),
                _ => match NamedKey::parse(base_word) {
                    Some(named) => KeyBase::Named(named),
                    None => return Err(KeyParseError::UnknownKey(base_word.to_string())),
                },
            }
        };
        Ok(KeyToken::Lit(Chord::new(base, mods)))
    }
}

impl Serialize for KeyToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Parse a whitespace-separated run of tokens (`"d d"`, `"3 ctrl+d"`).
pub fn parse_token_run(s: &str) -> Result<Vec<KeyToken>, KeyParseError> {
    s.split_whitespace().map(KeyToken::from_str).collect()
}
