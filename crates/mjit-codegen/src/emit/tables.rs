//! Packed side-table encodings.
//!
//! Byte layouts consumed by the runtime's stack scanner and exception
//! unwinder. All integers are little-endian; the layouts below are fixed
//! and locked by tests, since the scanner reads them without any schema:
//!
//! - Stop table: `u32` count, then per stop `u32` position + one
//!   attribute byte (bits 0-1: 0 direct call, 1 indirect call,
//!   2 safepoint; bit 2: native call).
//! - Catch table: `u32` count, then per range `u32` start, `u32` end,
//!   `u32` catch position.
//! - Reference maps: `u32` count, `u16` frame-map width, `u16`
//!   register-map width, then per stop the frame map bytes followed by
//!   the register map bytes.
//! - Frame descriptors: `u32` count, then per stop one descriptor
//!   (`0xff` marks "none"): `u8` presence, then recursively `u8` parent
//!   presence + parent, `u16` local count, `u16` stack count, and one
//!   encoded location each.
//! - Direct callees: `u32` count, then one `u32` method reference per
//!   direct call, in stop order.

use alloc::vec::Vec;

use mjit_ir::{FrameDescriptor, ImmWidth, Location};

use super::{EmittedMethod, Stop, StopKind};

const DESCRIPTOR_ABSENT: u8 = 0xff;
const DESCRIPTOR_PRESENT: u8 = 1;
const PARENT_ABSENT: u8 = 0;

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn stop_attributes(stop: &Stop) -> u8 {
    let kind = match stop.kind {
        StopKind::DirectCall => 0,
        StopKind::IndirectCall => 1,
        StopKind::Safepoint => 2,
    };
    let native = if stop.native { 0b100 } else { 0 };
    kind | native
}

impl EmittedMethod {
    /// Pack stop positions and attributes.
    pub fn pack_stop_table(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, self.stops.len() as u32);
        for stop in &self.stops {
            push_u32(&mut out, stop.position);
            out.push(stop_attributes(stop));
        }
        out
    }

    /// Pack exception ranges.
    pub fn pack_catch_table(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, self.catch_ranges.len() as u32);
        for range in &self.catch_ranges {
            push_u32(&mut out, range.start);
            push_u32(&mut out, range.end);
            push_u32(&mut out, range.catch_position);
        }
        out
    }

    /// Pack per-stop frame and register reference maps.
    pub fn pack_reference_maps(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, self.stops.len() as u32);
        push_u16(&mut out, self.frame_map_bytes as u16);
        push_u16(&mut out, self.register_map_bytes as u16);
        for stop in &self.stops {
            debug_assert_eq!(stop.frame_map.len(), self.frame_map_bytes as usize);
            debug_assert_eq!(stop.register_map.len(), self.register_map_bytes as usize);
            out.extend_from_slice(&stop.frame_map);
            out.extend_from_slice(&stop.register_map);
        }
        out
    }

    /// Pack per-stop frame descriptors.
    pub fn pack_frame_descriptors(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, self.stops.len() as u32);
        for stop in &self.stops {
            match &stop.frame_descriptor {
                None => out.push(DESCRIPTOR_ABSENT),
                Some(descriptor) => {
                    out.push(DESCRIPTOR_PRESENT);
                    encode_descriptor(descriptor, &mut out);
                }
            }
        }
        out
    }

    /// Pack the direct-callee list.
    pub fn pack_direct_callees(&self) -> Vec<u8> {
        let callees = self.direct_callees();
        let mut out = Vec::new();
        push_u32(&mut out, callees.len() as u32);
        for callee in callees {
            push_u32(&mut out, callee.0);
        }
        out
    }
}

fn encode_descriptor(descriptor: &FrameDescriptor, out: &mut Vec<u8>) {
    match &descriptor.parent {
        None => out.push(PARENT_ABSENT),
        Some(parent) => {
            out.push(DESCRIPTOR_PRESENT);
            encode_descriptor(parent, out);
        }
    }
    push_u16(out, descriptor.locals.len() as u16);
    push_u16(out, descriptor.stack.len() as u16);
    for location in descriptor.locals.iter().chain(descriptor.stack.iter()) {
        encode_location(location, out);
    }
}

/// One location as a tag byte plus payload. Immediates carry a width byte
/// and the raw 64-bit pattern; everything else is a `u32`.
fn encode_location(location: &Location, out: &mut Vec<u8>) {
    match location {
        Location::Undefined => {
            out.push(0);
            push_u32(out, 0);
        }
        Location::IntegerRegister(reg) => {
            out.push(1);
            push_u32(out, reg.ordinal() as u32);
        }
        Location::FloatRegister(reg) => {
            out.push(2);
            push_u32(out, reg.ordinal() as u32);
        }
        Location::StackSlot(slot) => {
            let tag = match slot.purpose {
                mjit_ir::SlotPurpose::Parameter => 3,
                mjit_ir::SlotPurpose::Local => 4,
                mjit_ir::SlotPurpose::Block => 5,
            };
            out.push(tag);
            push_u32(out, slot.offset);
        }
        Location::Immediate(width, value) => {
            out.push(6);
            out.push(match width {
                ImmWidth::W8 => 0,
                ImmWidth::W16 => 1,
                ImmWidth::W32 => 2,
                ImmWidth::W64 => 3,
            });
            out.extend_from_slice(&value.as_i64().to_le_bytes());
        }
        Location::ScalarLiteral(index) => {
            out.push(7);
            push_u32(out, *index);
        }
        Location::ReferenceLiteral(index) => {
            out.push(8);
            push_u32(out, *index);
        }
        Location::Block(block) => {
            out.push(9);
            push_u32(out, block.raw());
        }
        Location::Method(method) => {
            out.push(10);
            push_u32(out, method.0);
        }
    }
}
