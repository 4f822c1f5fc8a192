//! Constant pool

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A scalar constant in the constant pool.
///
/// Strings live in the bytecode's string pool, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// 64-bit floating point number
    Number(f64),
    /// Boolean literal
    Boolean(bool),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// BigInt digit text
    BigInt(Box<str>),
}

impl Constant {
    /// Get as a number if this is a number constant
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Hash for deduplication. `f64` hashes by bit pattern, so `NaN`
    /// deduplicates with itself and `+0.0`/`-0.0` stay distinct.
    fn hash_for_dedup<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Number(n) => n.to_bits().hash(state),
            Self::Boolean(b) => b.hash(state),
            Self::Null | Self::Undefined => {}
            Self::BigInt(digits) => digits.hash(state),
        }
    }

    fn dedup_eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Bit equality, not float equality: NaN == NaN here
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

/// Constant pool with O(1) hash-based deduplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    /// hash → indices with that hash (collisions share a bucket)
    #[serde(skip)]
    dedup_index: FxHashMap<u64, Vec<u32>>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    fn hash_constant(constant: &Constant) -> u64 {
        let mut hasher = rustc_hash::FxHasher::default();
        constant.hash_for_dedup(&mut hasher);
        hasher.finish()
    }

    /// Add a constant, returning its index. Identical constants share an
    /// index.
    pub fn add(&mut self, constant: Constant) -> u32 {
        let hash = Self::hash_constant(&constant);
        if let Some(indices) = self.dedup_index.get(&hash) {
            for &idx in indices {
                if self.constants[idx as usize].dedup_eq(&constant) {
                    return idx;
                }
            }
        }
        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        self.dedup_index.entry(hash).or_default().push(idx);
        idx
    }

    /// Add a number constant
    #[inline]
    pub fn add_number(&mut self, n: f64) -> u32 {
        self.add(Constant::Number(n))
    }

    /// Get a constant by index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Number of constants
    #[inline]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Whether the pool is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterate over the constants
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}
