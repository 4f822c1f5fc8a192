//! GC object header layout

use std::cell::Cell;

/// Mark color for tri-color marking
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In the gray worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

/// Age cohort an object belongs to
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Newly allocated objects
    Young = 0,
    /// Objects that survived promotion
    Old = 1,
}

/// GC object header, prefixed to every managed allocation.
///
/// All fields use `Cell`: the runtime is cooperatively single-threaded,
/// so header state never needs atomics or locks.
pub struct GcHeader {
    mark: Cell<MarkColor>,
    tag: u8,
    generation: Cell<Generation>,
    /// Number of collections survived while young
    age: Cell<u8>,
}

impl GcHeader {
    /// Create a new header with the given type tag
    pub fn new(tag: u8) -> Self {
        Self {
            mark: Cell::new(MarkColor::White),
            tag,
            generation: Cell::new(Generation::Young),
            age: Cell::new(0),
        }
    }

    /// Get the current mark color
    #[inline]
    pub fn mark(&self) -> MarkColor {
        self.mark.get()
    }

    /// Set the mark color
    #[inline]
    pub fn set_mark(&self, color: MarkColor) {
        self.mark.set(color);
    }

    /// Get the object type tag
    #[inline]
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// Get the generation this object currently belongs to
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation.get()
    }

    pub(crate) fn set_generation(&self, generation: Generation) {
        self.generation.set(generation);
    }

    pub(crate) fn bump_age(&self) -> u8 {
        let age = self.age.get().saturating_add(1);
        self.age.set(age);
        age
    }
}

impl std::fmt::Debug for GcHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcHeader")
            .field("mark", &self.mark.get())
            .field("tag", &self.tag)
            .field("generation", &self.generation.get())
            .field("age", &self.age.get())
            .finish()
    }
}

/// Object type tags
pub mod tags {
    /// String object
    pub const STRING: u8 = 1;
    /// Array object
    pub const ARRAY: u8 = 2;
    /// Plain object
    pub const OBJECT: u8 = 3;
    /// Function object
    pub const FUNCTION: u8 = 4;
    /// BigInt object
    pub const BIGINT: u8 = 5;
    /// Symbol object
    pub const SYMBOL: u8 = 6;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_marking() {
        let header = GcHeader::new(tags::OBJECT);
        assert_eq!(header.mark(), MarkColor::White);

        header.set_mark(MarkColor::Gray);
        assert_eq!(header.mark(), MarkColor::Gray);

        header.set_mark(MarkColor::Black);
        assert_eq!(header.mark(), MarkColor::Black);
    }

    #[test]
    fn test_header_generation() {
        let header = GcHeader::new(tags::STRING);
        assert_eq!(header.generation(), Generation::Young);
        assert_eq!(header.tag(), tags::STRING);

        assert_eq!(header.bump_age(), 1);
        assert_eq!(header.bump_age(), 2);

        header.set_generation(Generation::Old);
        assert_eq!(header.generation(), Generation::Old);
    }
}
