//! Target lowering: linearization and runtime side tables.
//!
//! Emission walks the final block order and assigns each code-bearing
//! instruction a position in the linear stream. Pseudo-instructions
//! (try/catch/filler/marker) bind positions without occupying one. The
//! result carries everything the encoder and the runtime's stack scanner
//! consume: literal pools, stop positions with reference maps, catch
//! ranges, frame descriptors and the direct-callee list.

pub mod tables;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use mjit_ir::{
    Block, FrameDescriptor, InfopointKind, Inst, InstKind, Kind, Location, Method, MethodRef,
    RefValue, SlotPurpose, ValuePayload,
};

use crate::methodgen::MethodGeneration;

/// How a stop came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    DirectCall,
    IndirectCall,
    Safepoint,
}

/// One runtime observation point in the emitted stream.
#[derive(Debug, Clone)]
pub struct Stop {
    pub position: u32,
    pub kind: StopKind,
    pub native: bool,
    /// Callee for direct calls.
    pub callee: Option<MethodRef>,
    /// One bit per frame slot; set when the slot holds a live reference.
    pub frame_map: Vec<u8>,
    /// One bit per integer register ordinal; set when the register holds
    /// a live reference.
    pub register_map: Vec<u8>,
    pub frame_descriptor: Option<FrameDescriptor>,
}

/// One exception range: positions in `[start, end)` with a raised
/// exception transfer to `catch_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchRange {
    pub start: u32,
    pub end: u32,
    pub catch_position: u32,
}

/// The linearized method.
#[derive(Debug, Clone)]
pub struct EmittedMethod {
    /// Code-bearing instructions in emission order; the index in this
    /// stream is the instruction's position.
    pub stream: Vec<Inst>,
    pub block_positions: BTreeMap<Block, u32>,
    /// Resolved addresses of marker instructions.
    pub marker_positions: BTreeMap<Inst, u32>,
    pub stops: Vec<Stop>,
    pub catch_ranges: Vec<CatchRange>,
    pub scalar_literals: Vec<u8>,
    pub reference_literals: Vec<RefValue>,
    pub frame_size: u32,
    pub frame_map_bytes: u32,
    pub register_map_bytes: u32,
}

impl EmittedMethod {
    /// Callees of direct calls, in stop order.
    pub fn direct_callees(&self) -> Vec<MethodRef> {
        self.stops.iter().filter_map(|s| s.callee).collect()
    }
}

/// Linearize an allocated method and build its side tables.
///
/// Requires block layout to be final and liveness to be current; reference
/// maps read the per-instruction live sets.
pub fn emit_method(generation: &MethodGeneration) -> EmittedMethod {
    let method = generation.method();
    let frame_slot_count = generation.local_stack_slot_count() as u32;
    let frame_map_bytes = frame_slot_count.div_ceil(8);
    let register_map_bytes = generation.abi().integer_register_count().div_ceil(8);
    let slot_size = generation.abi().stack_slot_size();

    let mut stream = Vec::new();
    let mut block_positions = BTreeMap::new();
    let mut marker_positions = BTreeMap::new();
    let mut stops = Vec::new();
    let mut catch_tracker = CatchTracker::default();

    for &block in method.block_order() {
        let block_start = stream.len() as u32;
        block_positions.insert(block, block_start);
        // A handler established in one block does not cover the next;
        // blocks needing coverage re-establish it.
        catch_tracker.enter_block(block_start);

        for &inst in method.block(block).insts() {
            let position = stream.len() as u32;
            match method.inst(inst).kind() {
                InstKind::Try { catch } => {
                    catch_tracker.set_handler(position, *catch);
                }
                InstKind::Marker => {
                    marker_positions.insert(inst, position);
                }
                InstKind::Catch { .. } | InstKind::Filler => {}
                kind => {
                    if let Some(stop_kind) = classify_stop(method, kind) {
                        let (frame_map, register_map) = reference_maps(
                            method,
                            inst,
                            slot_size,
                            frame_map_bytes as usize,
                            register_map_bytes as usize,
                        );
                        stops.push(Stop {
                            position,
                            kind: stop_kind,
                            native: matches!(kind, InstKind::Call(c) if c.native),
                            callee: direct_callee(method, kind),
                            frame_map,
                            register_map,
                            frame_descriptor: method.inst(inst).frame_descriptor().cloned(),
                        });
                    }
                    stream.push(inst);
                }
            }
        }
        catch_tracker.leave_block(stream.len() as u32);
    }

    let catch_ranges = catch_tracker.finish(&block_positions, method);

    EmittedMethod {
        stream,
        block_positions,
        marker_positions,
        stops,
        catch_ranges,
        scalar_literals: generation.literal_pool().scalar_bytes().to_vec(),
        reference_literals: generation.literal_pool().references().to_vec(),
        frame_size: generation.frame_size(),
        frame_map_bytes,
        register_map_bytes,
    }
}

fn classify_stop(method: &Method, kind: &InstKind) -> Option<StopKind> {
    match kind {
        InstKind::Call(data) => {
            let function = method.operand(data.function).value()?;
            match method.value(function).payload() {
                ValuePayload::Method(_) => Some(StopKind::DirectCall),
                _ => Some(StopKind::IndirectCall),
            }
        }
        InstKind::Infopoint {
            kind: InfopointKind::Safepoint,
            ..
        } => Some(StopKind::Safepoint),
        _ => None,
    }
}

fn direct_callee(method: &Method, kind: &InstKind) -> Option<MethodRef> {
    match kind {
        InstKind::Call(data) => {
            let function = method.operand(data.function).value()?;
            match method.value(function).payload() {
                ValuePayload::Method(m) => Some(*m),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Frame and register reference maps for the variables live at `inst`.
/// Frame bit index is `offset / slot_size`; register bit index is the
/// register ordinal.
fn reference_maps(
    method: &Method,
    inst: Inst,
    slot_size: u32,
    frame_map_bytes: usize,
    register_map_bytes: usize,
) -> (Vec<u8>, Vec<u8>) {
    let mut frame_map = alloc::vec![0u8; frame_map_bytes];
    let mut register_map = alloc::vec![0u8; register_map_bytes];
    let Some(live) = method.inst(inst).live_variables() else {
        return (frame_map, register_map);
    };
    method.check_pool_set(live);
    for serial in live.iter() {
        let value = method.variable_by_serial(serial);
        let data = method.value(value);
        if data.kind() != Kind::Reference {
            continue;
        }
        match data.location() {
            Some(Location::StackSlot(slot)) if slot.purpose == SlotPurpose::Local => {
                let bit = (slot.offset / slot_size) as usize;
                frame_map[bit / 8] |= 1 << (bit % 8);
            }
            Some(Location::IntegerRegister(reg)) => {
                let bit = reg.ordinal() as usize;
                register_map[bit / 8] |= 1 << (bit % 8);
            }
            _ => {}
        }
    }
    (frame_map, register_map)
}

/// Tracks the active exception handler while walking the stream.
#[derive(Default)]
struct CatchTracker {
    /// (start, end, handler) with handler resolved to a position later.
    raw_ranges: Vec<(u32, u32, Block)>,
    active: Option<(u32, Block)>,
}

impl CatchTracker {
    fn enter_block(&mut self, _position: u32) {
        self.active = None;
    }

    fn set_handler(&mut self, position: u32, handler: Option<Block>) {
        self.close(position);
        if let Some(handler) = handler {
            self.active = Some((position, handler));
        }
    }

    fn leave_block(&mut self, position: u32) {
        self.close(position);
    }

    fn close(&mut self, position: u32) {
        if let Some((start, handler)) = self.active.take() {
            if position > start {
                self.raw_ranges.push((start, position, handler));
            }
        }
    }

    fn finish(self, block_positions: &BTreeMap<Block, u32>, _method: &Method) -> Vec<CatchRange> {
        self.raw_ranges
            .into_iter()
            .map(|(start, end, handler)| CatchRange {
                start,
                end,
                catch_position: *block_positions
                    .get(&handler)
                    .expect("catch block missing from layout"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use mjit_abi::testing::TestAbi;
    use mjit_ir::analysis::liveness::compute_liveness;
    use mjit_ir::{
        AnyReg, BlockRole, ConstantValue, IntReg, Kind, Location, SlotPurpose, StackSlot,
    };

    use super::*;
    use crate::methodgen::MethodGeneration;

    fn new_generation() -> MethodGeneration {
        MethodGeneration::new(Box::new(TestAbi::new()), false, true)
    }

    #[test]
    fn test_stream_skips_pseudo_instructions() {
        let mut generation = new_generation();
        let b = generation.create_block(BlockRole::Normal);
        let v = generation.create_variable(Kind::Int);
        let w = generation.create_variable(Kind::Int);
        generation.create_assignment(b, Kind::Int, v, w); // position 0
        generation
            .method_mut()
            .append_simple(b, InstKind::Marker);
        generation
            .method_mut()
            .append_simple(b, InstKind::Filler);
        let ret = generation
            .method_mut()
            .append_simple(b, InstKind::Return); // position 1

        let emitted = emit_method(&generation);
        assert_eq!(emitted.stream.len(), 2);
        assert_eq!(emitted.stream[1], ret);
        // The marker resolved to the position the return landed on.
        let marker_inst = generation.method().inst_at(b, 1);
        assert_eq!(emitted.marker_positions.get(&marker_inst), Some(&1));
    }

    #[test]
    fn test_stop_classification() {
        let mut generation = new_generation();
        let b = generation.create_block(BlockRole::Normal);
        let callee = generation.method_mut().create_method_value(MethodRef(4));
        generation.create_call(b, callee, &[], None, false);

        let indirect_target = generation.create_variable(Kind::Word);
        generation.create_call(b, indirect_target, &[], None, true);

        generation.method_mut().append_simple(
            b,
            InstKind::Infopoint {
                kind: InfopointKind::Safepoint,
                dest: None,
            },
        );
        generation
            .method_mut()
            .append_simple(b, InstKind::Return);

        let emitted = emit_method(&generation);
        assert_eq!(emitted.stops.len(), 3);
        assert_eq!(emitted.stops[0].kind, StopKind::DirectCall);
        assert_eq!(emitted.stops[0].callee, Some(MethodRef(4)));
        assert!(!emitted.stops[0].native);
        assert_eq!(emitted.stops[1].kind, StopKind::IndirectCall);
        assert!(emitted.stops[1].native);
        assert_eq!(emitted.stops[2].kind, StopKind::Safepoint);
        assert_eq!(emitted.stops[2].position, 2);
        assert_eq!(emitted.direct_callees(), [MethodRef(4)]);
    }

    #[test]
    fn test_catch_ranges_cover_calls() {
        let mut generation = new_generation();
        let b = generation.create_block(BlockRole::Normal);
        let handler = generation.create_block(BlockRole::ExceptionDispatcher);
        let callee = generation.method_mut().create_method_value(MethodRef(1));

        generation.method_mut().append_simple(
            b,
            InstKind::Try {
                catch: Some(handler),
            },
        );
        generation.create_call(b, callee, &[], None, false); // position 0
        generation
            .method_mut()
            .append_simple(b, InstKind::Try { catch: None });
        generation
            .method_mut()
            .append_simple(b, InstKind::Return); // position 1

        generation
            .method_mut()
            .append_simple(handler, InstKind::Catch { parameter: None });
        generation
            .method_mut()
            .append_simple(handler, InstKind::Return); // position 2

        let emitted = emit_method(&generation);
        assert_eq!(emitted.catch_ranges.len(), 1);
        let range = emitted.catch_ranges[0];
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1);
        // The handler block starts at position 2.
        assert_eq!(range.catch_position, 2);
    }

    #[test]
    fn test_handler_does_not_leak_across_blocks() {
        let mut generation = new_generation();
        let b0 = generation.create_block(BlockRole::Normal);
        let b1 = generation.create_block(BlockRole::Normal);
        let handler = generation.create_block(BlockRole::ExceptionDispatcher);
        let callee = generation.method_mut().create_method_value(MethodRef(1));

        generation.method_mut().append_simple(
            b0,
            InstKind::Try {
                catch: Some(handler),
            },
        );
        generation.create_call(b0, callee, &[], None, false);
        generation.add_jump(b0, b1);
        generation.create_call(b1, callee, &[], None, false);
        generation
            .method_mut()
            .append_simple(b1, InstKind::Return);
        generation
            .method_mut()
            .append_simple(handler, InstKind::Return);

        let emitted = emit_method(&generation);
        // Only b0's instructions are covered.
        assert_eq!(emitted.catch_ranges.len(), 1);
        assert_eq!(emitted.catch_ranges[0].start, 0);
        assert_eq!(emitted.catch_ranges[0].end, 2);
    }

    #[test]
    fn test_reference_maps() {
        let mut generation = new_generation();
        let b = generation.create_block(BlockRole::Normal);
        let slot_size = generation.abi().stack_slot_size();

        // A reference in frame slot 1 and one in register r2, both live
        // across a call; a non-reference in slot 0 stays out of the map.
        let spilled_ref = generation.create_variable(Kind::Reference);
        let reg_ref = generation.create_variable(Kind::Reference);
        let plain = generation.create_variable(Kind::Long);
        let seed_ref = generation.create_variable(Kind::Reference);
        let seed = generation.create_variable(Kind::Long);

        generation.create_assignment(b, Kind::Reference, spilled_ref, seed_ref);
        generation.create_assignment(b, Kind::Reference, reg_ref, seed_ref);
        generation.create_assignment(b, Kind::Long, plain, seed);
        let callee = generation.method_mut().create_method_value(MethodRef(2));
        generation.create_call(b, callee, &[], None, false);
        // Keep all three live past the call.
        generation.create_assignment(b, Kind::Reference, seed_ref, spilled_ref);
        generation.create_assignment(b, Kind::Reference, seed_ref, reg_ref);
        generation.create_assignment(b, Kind::Long, seed, plain);
        generation
            .method_mut()
            .append_simple(b, InstKind::Return);

        let slot0 = generation.allocate_spill_stack_slot();
        let slot1 = generation.allocate_spill_stack_slot();
        assert_eq!(slot1.offset, slot_size);
        generation
            .method_mut()
            .set_location(plain, Some(Location::StackSlot(slot0)));
        generation
            .method_mut()
            .set_location(spilled_ref, Some(Location::StackSlot(slot1)));
        generation
            .method_mut()
            .set_location(reg_ref, Some(AnyReg::Int(IntReg(2)).location()));

        compute_liveness(generation.method_mut());
        let emitted = emit_method(&generation);
        let call_stop = &emitted.stops[0];
        assert_eq!(call_stop.kind, StopKind::DirectCall);
        // Slot 1 bit set, slot 0 clear.
        assert_eq!(call_stop.frame_map, [0b0000_0010]);
        // Register 2 bit set.
        assert_eq!(call_stop.register_map, [0b0000_0100, 0]);
    }

    #[test]
    fn test_parameter_slots_stay_out_of_frame_map() {
        let mut generation = new_generation();
        let b = generation.create_block(BlockRole::Normal);
        let param_ref = generation.create_variable(Kind::Reference);
        let seed = generation.create_variable(Kind::Reference);
        generation.create_assignment(b, Kind::Reference, param_ref, seed);
        let callee = generation.method_mut().create_method_value(MethodRef(2));
        generation.create_call(b, callee, &[], None, false);
        generation.create_assignment(b, Kind::Reference, seed, param_ref);
        generation
            .method_mut()
            .append_simple(b, InstKind::Return);

        // One local slot so the frame map has width.
        generation.allocate_spill_stack_slot();
        let caller_slot = StackSlot::new(SlotPurpose::Parameter, 0);
        generation
            .method_mut()
            .set_location(param_ref, Some(Location::StackSlot(caller_slot)));

        compute_liveness(generation.method_mut());
        let emitted = emit_method(&generation);
        assert_eq!(emitted.stops[0].frame_map, [0]);
    }

    #[test]
    fn test_literals_and_frame_size_carried_over() {
        let mut generation = new_generation();
        let b = generation.create_block(BlockRole::Normal);
        let v = generation.create_variable(Kind::Reference);
        let c = generation.create_constant(ConstantValue::Reference(mjit_ir::RefValue(9)));
        generation.create_assignment(b, Kind::Reference, v, c);
        generation
            .method_mut()
            .append_simple(b, InstKind::Return);
        crate::allocate_constants(&mut generation);
        generation.allocate_spill_stack_slot();

        let emitted = emit_method(&generation);
        assert_eq!(emitted.reference_literals, [mjit_ir::RefValue(9)]);
        assert_eq!(emitted.frame_size, generation.frame_size());
        assert_eq!(emitted.frame_map_bytes, 1);
    }
}
