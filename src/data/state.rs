//! Shared capture state
//!
//! The listener is the only writer, the sampler the only reader. Each flag is
//! an independent atomic, so no lock is needed and neither side ever blocks
//! the other.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use super::keys::{Key, KEY_COUNT};

/// Current pressed/released flag for every key in the identity map
#[derive(Debug, Default)]
pub struct CaptureState {
    flags: [AtomicBool; KEY_COUNT],
}

impl CaptureState {
    /// Create a state with every key released
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key's flag. Returns true if the flag changed.
    pub fn set(&self, key: Key, pressed: bool) -> bool {
        self.flags[key.index()].swap(pressed, Ordering::AcqRel) != pressed
    }

    /// Read a single key's flag
    pub fn is_pressed(&self, key: Key) -> bool {
        self.flags[key.index()].load(Ordering::Acquire)
    }

    /// Copy every flag into an owned snapshot
    pub fn snapshot(&self) -> Snapshot {
        let mut pressed = [false; KEY_COUNT];
        for key in Key::ALL {
            pressed[key.index()] = self.is_pressed(key);
        }
        Snapshot { pressed }
    }
}

/// Immutable copy of the capture state at one point in time.
///
/// Serializes as `{"x": 0, "z": 1, ...}` with keys in ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pressed: [bool; KEY_COUNT],
}

impl Snapshot {
    /// Build a snapshot from the keys that are held down
    #[cfg(test)]
    pub fn from_pressed(keys: &[Key]) -> Self {
        let mut pressed = [false; KEY_COUNT];
        for key in keys {
            pressed[key.index()] = true;
        }
        Self { pressed }
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed[key.index()]
    }

    /// Flag value as persisted (0 or 1)
    pub fn value(&self, key: Key) -> u8 {
        u8::from(self.is_pressed(key))
    }

    /// Keys held down, in ordinal order
    pub fn pressed_keys(&self) -> impl Iterator<Item = Key> + '_ {
        Key::ALL.into_iter().filter(|k| self.is_pressed(*k))
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(KEY_COUNT))?;
        for key in Key::ALL {
            map.serialize_entry(key.name(), &self.value(key))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SnapshotVisitor)
    }
}

struct SnapshotVisitor;

impl<'de> Visitor<'de> for SnapshotVisitor {
    type Value = Snapshot;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from every key name to 0 or 1")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Snapshot, A::Error> {
        let mut seen = [false; KEY_COUNT];
        let mut pressed = [false; KEY_COUNT];

        while let Some(name) = access.next_key::<String>()? {
            let key = Key::from_name(&name)
                .ok_or_else(|| de::Error::custom(format!("unknown key name `{}`", name)))?;
            if seen[key.index()] {
                return Err(de::Error::duplicate_field(key.name()));
            }
            let value: u8 = access.next_value()?;
            pressed[key.index()] = match value {
                0 => false,
                1 => true,
                other => {
                    return Err(de::Error::custom(format!(
                        "press flag for `{}` must be 0 or 1, got {}",
                        name, other
                    )))
                }
            };
            seen[key.index()] = true;
        }

        if let Some(missing) = Key::ALL.iter().find(|k| !seen[k.index()]) {
            return Err(de::Error::missing_field(missing.name()));
        }

        Ok(Snapshot { pressed })
    }
}
