//! Single configuration values and the merge operation that produced them.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expand::MacroTable;

/// How one parsed line combines with the state accumulated from earlier layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueOp {
    /// No sigil. Replaces every existing value of the key.
    Set,
    /// `.` Adds the value even if an equal one is present.
    Append,
    /// `+` Adds the value unless an equal one is present.
    AddUnique,
    /// `-` Deletes every existing value equal to this one.
    Remove,
    /// `!` Deletes the key entirely; it becomes unset.
    Clear,
    /// `^` Marks the key present with zero values.
    InitializeToEmpty,
    /// `@` Struct-keyed array entry, or identity-field declaration.
    StructKeyed,
    /// `*` Per-object struct-keyed entry, or per-object identity-field declaration.
    PerObjectStructKeyed,
}

impl ValueOp {
    pub const ALL: [ValueOp; 8] = [
        ValueOp::Set,
        ValueOp::Append,
        ValueOp::AddUnique,
        ValueOp::Remove,
        ValueOp::Clear,
        ValueOp::InitializeToEmpty,
        ValueOp::StructKeyed,
        ValueOp::PerObjectStructKeyed,
    ];

    pub fn from_sigil(sigil: char) -> Option<Self> {
        match sigil {
            '.' => Some(Self::Append),
            '+' => Some(Self::AddUnique),
            '-' => Some(Self::Remove),
            '!' => Some(Self::Clear),
            '^' => Some(Self::InitializeToEmpty),
            '@' => Some(Self::StructKeyed),
            '*' => Some(Self::PerObjectStructKeyed),
            _ => None,
        }
    }

    /// Sigil written in front of the key. `Set` has none.
    pub fn sigil(self) -> Option<char> {
        match self {
            Self::Set => None,
            Self::Append => Some('.'),
            Self::AddUnique => Some('+'),
            Self::Remove => Some('-'),
            Self::Clear => Some('!'),
            Self::InitializeToEmpty => Some('^'),
            Self::StructKeyed => Some('@'),
            Self::PerObjectStructKeyed => Some('*'),
        }
    }

    /// True for operations that leave the key holding an array rather than a scalar.
    pub fn is_array_add(self) -> bool {
        matches!(
            self,
            Self::Append | Self::AddUnique | Self::StructKeyed | Self::PerObjectStructKeyed
        )
    }
}

/// An immutable value token.
///
/// The payload is kept exactly as written; `{TOKEN}` macros are expanded only by
/// [`ConfigValue::expanded`]. Equality compares payloads, using the precomputed
/// hash as a fast reject.
#[derive(Clone)]
pub struct ConfigValue {
    raw: Arc<str>,
    op: ValueOp,
    hash: u64,
}

impl ConfigValue {
    pub fn new(raw: impl Into<Arc<str>>, op: ValueOp) -> Self {
        let raw = raw.into();
        let hash = stable_hash(&raw);
        Self { raw, op, hash }
    }

    /// Convenience constructor for a plain `Set` value.
    pub fn set(raw: impl Into<Arc<str>>) -> Self {
        Self::new(raw, ValueOp::Set)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn op(&self) -> ValueOp {
        self.op
    }

    pub fn stable_hash(&self) -> u64 {
        self.hash
    }

    /// Same payload, different operation tag. Shares the payload allocation.
    pub fn with_op(&self, op: ValueOp) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            op,
            hash: self.hash,
        }
    }

    pub fn expanded<'a>(&'a self, macros: &MacroTable) -> Cow<'a, str> {
        macros.expand(&self.raw)
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.raw == other.raw
    }
}

impl Eq for ConfigValue {}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op.sigil() {
            Some(sigil) => write!(f, "{sigil}{:?}", self.raw),
            None => write!(f, "{:?}", self.raw),
        }
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// FNV-1a over the UTF-8 bytes; identical across runs and platforms.
fn stable_hash(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    text.bytes()
        .fold(OFFSET, |acc, byte| (acc ^ u64::from(byte)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigils_round_trip_for_every_op() {
        for op in ValueOp::ALL {
            match op.sigil() {
                Some(sigil) => assert_eq!(ValueOp::from_sigil(sigil), Some(op)),
                None => assert_eq!(op, ValueOp::Set),
            }
        }
        assert_eq!(ValueOp::from_sigil('?'), None);
    }

    #[test]
    fn equality_ignores_operation_tag() {
        let a = ConfigValue::new("Foo", ValueOp::Append);
        let b = ConfigValue::set("Foo");
        assert_eq!(a, b);
        assert_ne!(a, ConfigValue::set("foo"));
    }

    #[test]
    fn stable_hash_is_deterministic() {
        assert_eq!(stable_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(
            ConfigValue::set("abc").stable_hash(),
            ConfigValue::set("abc").stable_hash()
        );
    }

    #[test]
    fn with_op_keeps_payload() {
        let v = ConfigValue::set("X=1").with_op(ValueOp::Remove);
        assert_eq!(v.raw(), "X=1");
        assert_eq!(v.op(), ValueOp::Remove);
    }
}
