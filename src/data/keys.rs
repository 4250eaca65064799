//! Key identity map and raw OS key identities

use std::fmt;

/// Logical keys understood by the downstream controller mapping.
///
/// The set is closed: an OS key that does not map onto one of these is
/// rejected, never coerced. Ordinals are stable and define the order keys
/// appear in every serialized snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Key {
    X = 1,
    Z = 2,
    C = 3,
    S = 4,
    D = 5,
    Left = 6,
    Right = 7,
    Up = 8,
    Down = 9,
    Enter = 10,
}

/// Number of keys in the identity map
pub const KEY_COUNT: usize = Key::ALL.len();

impl Key {
    /// Every key, in ordinal order
    pub const ALL: [Key; 10] = [
        Key::X,
        Key::Z,
        Key::C,
        Key::S,
        Key::D,
        Key::Left,
        Key::Right,
        Key::Up,
        Key::Down,
        Key::Enter,
    ];

    /// Stable ordinal (1-based)
    #[cfg(test)]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Zero-based slot used by fixed-size per-key tables
    pub(crate) fn index(self) -> usize {
        self as usize - 1
    }

    /// Name used in logs and persisted artifacts
    pub fn name(self) -> &'static str {
        match self {
            Key::X => "x",
            Key::Z => "z",
            Key::C => "c",
            Key::S => "s",
            Key::D => "d",
            Key::Left => "left",
            Key::Right => "right",
            Key::Up => "up",
            Key::Down => "down",
            Key::Enter => "enter",
        }
    }

    /// Exact lookup by name. No case folding.
    pub fn from_name(name: &str) -> Option<Key> {
        Key::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of a key as reported by the OS input subsystem.
///
/// Printable keys carry a character identity, special keys carry a
/// lower-case name (`esc`, `f9`, `left`, ...). Either may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawKey {
    pub char: Option<char>,
    pub name: Option<String>,
}

impl RawKey {
    /// A printable key
    pub fn char(c: char) -> Self {
        Self {
            char: Some(c),
            name: None,
        }
    }

    /// A special (named) key
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            char: None,
            name: Some(name.into()),
        }
    }

    /// A key the backend could not identify
    pub fn unknown(code: u32) -> Self {
        Self::named(format!("unknown({})", code))
    }

    /// Parse a configured key string: a single character or a special-key name.
    pub fn parse(s: &str) -> Self {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::char(c),
            _ => Self::named(s.to_lowercase()),
        }
    }

    /// Whether two raw keys share a char or a name
    pub fn matches(&self, other: &RawKey) -> bool {
        match (self.char, other.char) {
            (Some(a), Some(b)) if a == b => return true,
            _ => {}
        }
        matches!((&self.name, &other.name), (Some(a), Some(b)) if a == b)
    }

    /// Resolve against the key identity map, preferring the character identity.
    pub fn resolve(&self) -> Option<Key> {
        if let Some(key) = self.char.and_then(|c| Key::from_name(c.encode_utf8(&mut [0; 4]))) {
            return Some(key);
        }
        self.name.as_deref().and_then(Key::from_name)
    }
}

impl fmt::Display for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.char, &self.name) {
            (Some(c), _) => write!(f, "'{}'", c),
            (None, Some(name)) => f.write_str(name),
            (None, None) => f.write_str("<unidentified>"),
        }
    }
}
