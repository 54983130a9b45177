//! Storage locations and location categories.
//!
//! A location is where a value lives at runtime: a register, a stack slot,
//! an immediate encoded into an instruction, a literal pool entry, or a
//! symbolic block/method target. Categories classify locations and carry a
//! fixed total preference order that the constant-materialization search
//! walks.

use core::fmt;

use crate::constant::{ConstantValue, ImmWidth, MethodRef};
use crate::entity::Block;

/// Category of a location, in fixed preference order.
///
/// The ordinal order is a contract: register categories first, then
/// immediate widths from narrowest to widest, then block/method targets,
/// then stack slots, with literals last. `Undefined` sits outside the
/// preference walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LocationCategory {
    Undefined = 0,
    IntegerRegister = 1,
    FloatRegister = 2,
    Immediate8 = 3,
    Immediate16 = 4,
    Immediate32 = 5,
    Immediate64 = 6,
    Block = 7,
    Method = 8,
    StackSlot = 9,
    Literal = 10,
}

/// Number of distinct location categories.
pub const CATEGORY_COUNT: usize = 11;

impl LocationCategory {
    /// All categories in preference order.
    pub const ALL: [LocationCategory; CATEGORY_COUNT] = [
        LocationCategory::Undefined,
        LocationCategory::IntegerRegister,
        LocationCategory::FloatRegister,
        LocationCategory::Immediate8,
        LocationCategory::Immediate16,
        LocationCategory::Immediate32,
        LocationCategory::Immediate64,
        LocationCategory::Block,
        LocationCategory::Method,
        LocationCategory::StackSlot,
        LocationCategory::Literal,
    ];

    /// The next category in preference order, if any.
    pub fn next(self) -> Option<LocationCategory> {
        let ordinal = self as usize + 1;
        if ordinal < CATEGORY_COUNT {
            Some(LocationCategory::ALL[ordinal])
        } else {
            None
        }
    }

    /// The immediate category for a given width.
    pub fn immediate_from_width(width: ImmWidth) -> LocationCategory {
        match width {
            ImmWidth::W8 => LocationCategory::Immediate8,
            ImmWidth::W16 => LocationCategory::Immediate16,
            ImmWidth::W32 => LocationCategory::Immediate32,
            ImmWidth::W64 => LocationCategory::Immediate64,
        }
    }

    /// Check if this is one of the immediate categories.
    pub fn is_immediate(self) -> bool {
        CategorySet::I.contains(self)
    }
}

/// A set of location categories, stored as a bit mask over ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CategorySet(u16);

impl CategorySet {
    /// The empty set.
    pub const EMPTY: CategorySet = CategorySet(0);

    /// All immediate categories.
    pub const I: CategorySet = CategorySet::of(&[
        LocationCategory::Immediate8,
        LocationCategory::Immediate16,
        LocationCategory::Immediate32,
        LocationCategory::Immediate64,
    ]);

    /// Integer register only.
    pub const G: CategorySet = CategorySet::of(&[LocationCategory::IntegerRegister]);

    /// Integer register or stack slot.
    pub const G_S: CategorySet = CategorySet::of(&[
        LocationCategory::IntegerRegister,
        LocationCategory::StackSlot,
    ]);

    /// Float register only.
    pub const F: CategorySet = CategorySet::of(&[LocationCategory::FloatRegister]);

    /// Float register or stack slot.
    pub const F_S: CategorySet = CategorySet::of(&[
        LocationCategory::FloatRegister,
        LocationCategory::StackSlot,
    ]);

    /// Build a set from a list of categories.
    pub const fn of(categories: &[LocationCategory]) -> CategorySet {
        let mut bits = 0u16;
        let mut i = 0;
        while i < categories.len() {
            bits |= 1 << categories[i] as u16;
            i += 1;
        }
        CategorySet(bits)
    }

    /// Check membership.
    pub fn contains(self, category: LocationCategory) -> bool {
        self.0 & (1 << category as u16) != 0
    }

    /// Insert a category, returning the new set.
    pub const fn with(self, category: LocationCategory) -> CategorySet {
        CategorySet(self.0 | (1 << category as u16))
    }

    /// Set union.
    pub const fn union(self, other: CategorySet) -> CategorySet {
        CategorySet(self.0 | other.0)
    }

    /// Set intersection.
    pub const fn intersection(self, other: CategorySet) -> CategorySet {
        CategorySet(self.0 & other.0)
    }

    /// Check if the set is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate members in preference order.
    pub fn iter(self) -> impl Iterator<Item = LocationCategory> {
        LocationCategory::ALL
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

impl fmt::Display for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, c) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", c)?;
        }
        write!(f, "}}")
    }
}

/// An integer register, identified by its ordinal in the platform register
/// file. Platform naming lives behind the ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntReg(pub u8);

impl IntReg {
    /// Ordinal of this register.
    pub fn ordinal(self) -> u8 {
        self.0
    }
}

impl fmt::Display for IntReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A floating point register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FpReg(pub u8);

impl FpReg {
    /// Ordinal of this register.
    pub fn ordinal(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FpReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Either register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnyReg {
    Int(IntReg),
    Fp(FpReg),
}

impl AnyReg {
    /// The location occupied by this register.
    pub fn location(self) -> Location {
        match self {
            AnyReg::Int(r) => Location::IntegerRegister(r),
            AnyReg::Fp(r) => Location::FloatRegister(r),
        }
    }
}

impl fmt::Display for AnyReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyReg::Int(r) => write!(f, "{}", r),
            AnyReg::Fp(r) => write!(f, "{}", r),
        }
    }
}

/// What a stack slot is used for. Determines which frame the offset is
/// relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotPurpose {
    /// Incoming parameter in the caller's frame (offsets relative to SP
    /// before the prologue adjusts it).
    Parameter,
    /// Local/spill slot in this method's frame.
    Local,
    /// Frame-allocated memory block.
    Block,
}

/// A stack slot, identified by purpose and byte offset.
///
/// Slots are plain values; two slots with equal purpose and offset are the
/// same slot everywhere. `MethodGeneration` keeps canonical tables so slot
/// counts can be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackSlot {
    pub purpose: SlotPurpose,
    pub offset: u32,
}

impl StackSlot {
    pub fn new(purpose: SlotPurpose, offset: u32) -> Self {
        Self { purpose, offset }
    }
}

impl fmt::Display for StackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.purpose {
            SlotPurpose::Parameter => "param",
            SlotPurpose::Local => "local",
            SlotPurpose::Block => "block",
        };
        write!(f, "stack:{}+{}", tag, self.offset)
    }
}

/// A concrete storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    IntegerRegister(IntReg),
    FloatRegister(FpReg),
    StackSlot(StackSlot),
    /// Immediate encoded into the instruction, tagged with its width.
    Immediate(ImmWidth, ConstantValue),
    /// Index into the scalar literal pool.
    ScalarLiteral(u32),
    /// Index into the reference literal pool.
    ReferenceLiteral(u32),
    /// Branch target.
    Block(Block),
    /// Direct callee.
    Method(MethodRef),
    Undefined,
}

impl Location {
    /// The category of this location.
    pub fn category(&self) -> LocationCategory {
        match self {
            Location::IntegerRegister(_) => LocationCategory::IntegerRegister,
            Location::FloatRegister(_) => LocationCategory::FloatRegister,
            Location::StackSlot(_) => LocationCategory::StackSlot,
            Location::Immediate(width, _) => LocationCategory::immediate_from_width(*width),
            Location::ScalarLiteral(_) | Location::ReferenceLiteral(_) => LocationCategory::Literal,
            Location::Block(_) => LocationCategory::Block,
            Location::Method(_) => LocationCategory::Method,
            Location::Undefined => LocationCategory::Undefined,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::IntegerRegister(r) => write!(f, "{}", r),
            Location::FloatRegister(r) => write!(f, "{}", r),
            Location::StackSlot(s) => write!(f, "{}", s),
            Location::Immediate(w, v) => write!(f, "imm{}({})", w.bits(), v),
            Location::ScalarLiteral(i) => write!(f, "lit:{}", i),
            Location::ReferenceLiteral(i) => write!(f, "reflit:{}", i),
            Location::Block(b) => write!(f, "{}", b),
            Location::Method(m) => write!(f, "{}", m),
            Location::Undefined => write!(f, "undefined"),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn test_category_order() {
        assert!(LocationCategory::IntegerRegister < LocationCategory::Immediate8);
        assert!(LocationCategory::Immediate8 < LocationCategory::Immediate64);
        assert!(LocationCategory::Immediate64 < LocationCategory::Block);
        assert!(LocationCategory::Block < LocationCategory::Method);
        assert!(LocationCategory::Method < LocationCategory::StackSlot);
        assert!(LocationCategory::StackSlot < LocationCategory::Literal);
    }

    #[test]
    fn test_category_next_walk() {
        // Widening walk from Immediate8 stays inside I until it leaves at Block.
        let mut c = LocationCategory::Immediate8;
        let mut widths = Vec::new();
        while CategorySet::I.contains(c) {
            widths.push(c);
            c = c.next().expect("walk must terminate past Literal");
        }
        assert_eq!(
            widths,
            [
                LocationCategory::Immediate8,
                LocationCategory::Immediate16,
                LocationCategory::Immediate32,
                LocationCategory::Immediate64,
            ]
        );
        assert_eq!(c, LocationCategory::Block);
        assert_eq!(LocationCategory::Literal.next(), None);
    }

    #[test]
    fn test_immediate_from_width() {
        assert_eq!(
            LocationCategory::immediate_from_width(ImmWidth::W8),
            LocationCategory::Immediate8
        );
        assert_eq!(
            LocationCategory::immediate_from_width(ImmWidth::W64),
            LocationCategory::Immediate64
        );
    }

    #[test]
    fn test_category_set_ops() {
        let set = CategorySet::of(&[
            LocationCategory::IntegerRegister,
            LocationCategory::Literal,
        ]);
        assert!(set.contains(LocationCategory::IntegerRegister));
        assert!(!set.contains(LocationCategory::StackSlot));
        assert!(set.intersection(CategorySet::I).is_empty());
        assert_eq!(
            set.union(CategorySet::G_S),
            CategorySet::of(&[
                LocationCategory::IntegerRegister,
                LocationCategory::StackSlot,
                LocationCategory::Literal,
            ])
        );
        let members: Vec<_> = set.iter().collect();
        assert_eq!(
            members,
            [LocationCategory::IntegerRegister, LocationCategory::Literal]
        );
    }

    #[test]
    fn test_location_categories() {
        assert_eq!(
            Location::IntegerRegister(IntReg(3)).category(),
            LocationCategory::IntegerRegister
        );
        assert_eq!(
            Location::Immediate(ImmWidth::W16, ConstantValue::Int(300)).category(),
            LocationCategory::Immediate16
        );
        assert_eq!(
            Location::ScalarLiteral(0).category(),
            LocationCategory::Literal
        );
        assert_eq!(
            Location::StackSlot(StackSlot::new(SlotPurpose::Local, 16)).category(),
            LocationCategory::StackSlot
        );
    }

    #[test]
    fn test_stack_slot_identity() {
        let a = StackSlot::new(SlotPurpose::Local, 8);
        let b = StackSlot::new(SlotPurpose::Local, 8);
        let c = StackSlot::new(SlotPurpose::Parameter, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
