//! Literal pools.
//!
//! Constants that cannot be encoded as immediates are placed in one of two
//! pools: scalars are byte-packed into a buffer, references are kept as an
//! object array the garbage collector can visit. Both hand out stable
//! indices; requesting the same payload twice returns the same entry.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use mjit_ir::{ConstantValue, Location, RefValue};

/// One scalar pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarLiteral {
    pub value: ConstantValue,
    /// Byte offset of this entry in the packed pool image.
    pub offset: u32,
}

/// The per-method literal pools.
#[derive(Debug, Clone, Default)]
pub struct LiteralPool {
    scalars: Vec<ScalarLiteral>,
    scalar_bytes: Vec<u8>,
    scalar_index: BTreeMap<ConstantValue, u32>,
    references: Vec<RefValue>,
    reference_index: BTreeMap<RefValue, u32>,
    word_bytes: u32,
}

impl LiteralPool {
    pub fn new(word_bytes: u32) -> Self {
        Self {
            word_bytes,
            ..Self::default()
        }
    }

    /// Intern `value` and return its pool location.
    pub fn make_literal(&mut self, value: ConstantValue) -> Location {
        match value {
            ConstantValue::Reference(reference) => {
                let index = *self.reference_index.entry(reference).or_insert_with(|| {
                    let index = self.references.len() as u32;
                    self.references.push(reference);
                    index
                });
                Location::ReferenceLiteral(index)
            }
            scalar => {
                let index = *self.scalar_index.entry(scalar).or_insert_with(|| {
                    let index = self.scalars.len() as u32;
                    let offset = self.scalar_bytes.len() as u32;
                    scalar.write_bytes(self.word_bytes, &mut self.scalar_bytes);
                    self.scalars.push(ScalarLiteral {
                        value: scalar,
                        offset,
                    });
                    index
                });
                Location::ScalarLiteral(index)
            }
        }
    }

    /// Scalar entries in pool order.
    pub fn scalars(&self) -> &[ScalarLiteral] {
        &self.scalars
    }

    /// The packed scalar pool image.
    pub fn scalar_bytes(&self) -> &[u8] {
        &self.scalar_bytes
    }

    /// Reference entries in pool order.
    pub fn references(&self) -> &[RefValue] {
        &self.references
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.references.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_interning() {
        let mut pool = LiteralPool::new(8);
        let a = pool.make_literal(ConstantValue::Long(7));
        let b = pool.make_literal(ConstantValue::Long(7));
        let c = pool.make_literal(ConstantValue::Long(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.scalars().len(), 2);
    }

    #[test]
    fn test_scalar_packing_offsets() {
        let mut pool = LiteralPool::new(8);
        pool.make_literal(ConstantValue::Int(1));
        pool.make_literal(ConstantValue::Long(2));
        assert_eq!(pool.scalars()[0].offset, 0);
        assert_eq!(pool.scalars()[1].offset, 4);
        assert_eq!(pool.scalar_bytes().len(), 12);
        assert_eq!(&pool.scalar_bytes()[0..4], &1i32.to_le_bytes());
        assert_eq!(&pool.scalar_bytes()[4..12], &2i64.to_le_bytes());
    }

    #[test]
    fn test_reference_pool_is_separate() {
        let mut pool = LiteralPool::new(8);
        let r = pool.make_literal(ConstantValue::Reference(RefValue(5)));
        let r_again = pool.make_literal(ConstantValue::Reference(RefValue(5)));
        let s = pool.make_literal(ConstantValue::Word(5));
        assert_eq!(r, Location::ReferenceLiteral(0));
        assert_eq!(r, r_again);
        assert_eq!(s, Location::ScalarLiteral(0));
        assert_eq!(pool.references(), [RefValue(5)]);
        assert!(!pool.is_empty());
    }
}
