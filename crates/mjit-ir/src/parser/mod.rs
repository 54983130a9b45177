//! Parser for the textual method form.
//!
//! The textual form exists for tests and diagnostics; it covers the
//! ABI-independent subset of the IR. Calls parsed from text carry plain
//! operands without calling-convention pinning.
//!
//! ```text
//! method {
//! vars { v0: int, v1: int }
//! consts { c0: int 40 }
//! block0:
//!     v0 = c0
//!     branch v0, block1, block2
//! block1:
//!     v1 = v0
//!     jump block2
//! block2:
//!     return
//! }
//! ```

mod primitives;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, opt},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

use crate::block::BlockRole;
use crate::constant::{ConstantValue, MethodRef};
use crate::entity::{Block, Value};
use crate::inst::{AssignmentReason, CallData, InfopointKind, InstKind};
use crate::kind::Kind;
use crate::location::{CategorySet, LocationCategory};
use crate::method::{assignment_dest_categories, assignment_src_categories, Method, Placement};
use crate::operand::Effect;
use primitives::{
    blank, parse_block_index, parse_const, parse_constant_value, parse_kind, parse_method_ref,
    parse_val_ref, parse_var, ValRef,
};

/// Parse error with position information.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at position {}: {}",
            self.position, self.message
        )
    }
}

fn parse_error(original: &str, remaining: &str, message: &str) -> ParseError {
    ParseError {
        message: alloc::string::ToString::to_string(message),
        position: original.len() - remaining.len(),
    }
}

#[derive(Debug, Clone)]
enum StmtAst {
    Assign { dest: ValRef, src: ValRef },
    Jump(u32),
    Branch(ValRef, u32, u32),
    Switch {
        tag: ValRef,
        arms: Vec<(ValRef, u32)>,
        default_target: u32,
    },
    Call {
        callee: u32,
        args: Vec<ValRef>,
        result: Option<ValRef>,
    },
    Try(Option<u32>),
    Catch,
    Safepoint,
    Here(ValRef),
    Marker,
    Filler,
    Return,
}

#[derive(Debug, Clone)]
struct BlockAst {
    index: u32,
    dispatcher: bool,
    stmts: Vec<StmtAst>,
}

#[derive(Debug, Clone)]
struct MethodAst {
    vars: Vec<(u32, Kind)>,
    consts: Vec<(u32, ConstantValue)>,
    blocks: Vec<BlockAst>,
}

fn parse_vars(input: &str) -> IResult<&str, Vec<(u32, Kind)>> {
    preceded(
        tuple((tag("vars"), blank, char('{'), blank)),
        terminated(
            separated_list0(
                tuple((blank, char(','), blank)),
                separated_pair(parse_var, tuple((blank, char(':'), blank)), parse_kind),
            ),
            tuple((blank, char('}'))),
        ),
    )(input)
}

fn parse_consts(input: &str) -> IResult<&str, Vec<(u32, ConstantValue)>> {
    preceded(
        tuple((tag("consts"), blank, char('{'), blank)),
        terminated(
            separated_list0(
                tuple((blank, char(','), blank)),
                separated_pair(
                    parse_const,
                    tuple((blank, char(':'), blank)),
                    parse_constant_value,
                ),
            ),
            tuple((blank, char('}'))),
        ),
    )(input)
}

fn parse_switch(input: &str) -> IResult<&str, StmtAst> {
    map(
        tuple((
            preceded(pair(tag("switch"), blank), parse_val_ref),
            preceded(
                tuple((blank, char(','), blank, char('['), blank)),
                separated_list1(
                    tuple((blank, char(','), blank)),
                    separated_pair(
                        parse_val_ref,
                        tuple((blank, tag("->"), blank)),
                        parse_block_index,
                    ),
                ),
            ),
            preceded(
                tuple((blank, char(']'), blank, tag("default"), blank)),
                parse_block_index,
            ),
        )),
        |(tag_ref, arms, default_target)| StmtAst::Switch {
            tag: tag_ref,
            arms,
            default_target,
        },
    )(input)
}

fn parse_call(input: &str) -> IResult<&str, StmtAst> {
    map(
        tuple((
            preceded(pair(tag("call"), blank), parse_method_ref),
            delimited(
                pair(char('('), blank),
                separated_list0(tuple((blank, char(','), blank)), parse_val_ref),
                pair(blank, char(')')),
            ),
            opt(preceded(tuple((blank, tag("->"), blank)), parse_val_ref)),
        )),
        |(callee, args, result)| StmtAst::Call {
            callee,
            args,
            result,
        },
    )(input)
}

fn parse_stmt(input: &str) -> IResult<&str, StmtAst> {
    alt((
        parse_switch,
        parse_call,
        map(
            tuple((
                preceded(pair(tag("branch"), blank), parse_val_ref),
                preceded(tuple((blank, char(','), blank)), parse_block_index),
                preceded(tuple((blank, char(','), blank)), parse_block_index),
            )),
            |(cond, t, f)| StmtAst::Branch(cond, t, f),
        ),
        map(
            preceded(pair(tag("jump"), blank), parse_block_index),
            StmtAst::Jump,
        ),
        map(
            preceded(pair(tag("try"), blank), parse_block_index),
            |b| StmtAst::Try(Some(b)),
        ),
        map(tag("try"), |_| StmtAst::Try(None)),
        map(tag("catch"), |_| StmtAst::Catch),
        map(tag("safepoint"), |_| StmtAst::Safepoint),
        map(tag("marker"), |_| StmtAst::Marker),
        map(tag("filler"), |_| StmtAst::Filler),
        map(tag("return"), |_| StmtAst::Return),
        // `v0 = here` and `v0 = <val>` both start with a value ref.
        map(
            separated_pair(
                parse_val_ref,
                tuple((blank, char('='), blank)),
                alt((
                    map(tag("here"), |_| None),
                    map(parse_val_ref, Some),
                )),
            ),
            |(dest, src)| match src {
                None => StmtAst::Here(dest),
                Some(src) => StmtAst::Assign { dest, src },
            },
        ),
    ))(input)
}

fn parse_block(input: &str) -> IResult<&str, BlockAst> {
    map(
        tuple((
            parse_block_index,
            opt(preceded(blank, tag("dispatcher"))),
            preceded(blank, char(':')),
            many0(preceded(blank, parse_stmt)),
        )),
        |(index, dispatcher, _, stmts)| BlockAst {
            index,
            dispatcher: dispatcher.is_some(),
            stmts,
        },
    )(input)
}

fn parse_method_internal(input: &str) -> IResult<&str, MethodAst> {
    map(
        delimited(
            tuple((tag("method"), blank, char('{'), blank)),
            tuple((
                opt(terminated(parse_vars, blank)),
                opt(terminated(parse_consts, blank)),
                many0(terminated(parse_block, blank)),
            )),
            char('}'),
        ),
        |(vars, consts, blocks)| MethodAst {
            vars: vars.unwrap_or_default(),
            consts: consts.unwrap_or_default(),
            blocks,
        },
    )(input)
}

/// Parse a method from its textual form.
pub fn parse_method(input: &str) -> Result<Method, ParseError> {
    let trimmed = input.trim();
    let ast = match parse_method_internal(trimmed) {
        Ok((remaining, ast)) if remaining.trim().is_empty() => ast,
        Ok((remaining, _)) => {
            return Err(parse_error(
                trimmed,
                remaining,
                &alloc::format!("unexpected input remaining: {}", remaining),
            ))
        }
        Err(e) => {
            return Err(parse_error(
                trimmed,
                trimmed,
                &alloc::format!("syntax error: {:?}", e),
            ))
        }
    };
    build_method(trimmed, ast)
}

fn build_method(input: &str, ast: MethodAst) -> Result<Method, ParseError> {
    let mut method = Method::new();
    let fail = |message: String| parse_error(input, "", &message);

    // Declarations must be dense and in order so references are stable.
    let mut vars: Vec<Value> = Vec::new();
    for (i, &(id, kind)) in ast.vars.iter().enumerate() {
        if id as usize != i {
            return Err(fail(alloc::format!("variable v{} declared out of order", id)));
        }
        vars.push(method.create_variable(kind));
    }
    let mut consts: Vec<Value> = Vec::new();
    for (i, &(id, value)) in ast.consts.iter().enumerate() {
        if id as usize != i {
            return Err(fail(alloc::format!("constant c{} declared out of order", id)));
        }
        consts.push(method.create_constant(value));
    }

    let mut blocks: Vec<Block> = Vec::new();
    for (i, block_ast) in ast.blocks.iter().enumerate() {
        if block_ast.index as usize != i {
            return Err(fail(alloc::format!(
                "block{} declared out of order",
                block_ast.index
            )));
        }
        let role = if block_ast.dispatcher {
            BlockRole::ExceptionDispatcher
        } else {
            BlockRole::Normal
        };
        blocks.push(method.create_block(role));
    }

    let resolve = |vars: &[Value], consts: &[Value], val: ValRef| -> Result<Value, ParseError> {
        match val {
            ValRef::Var(i) => vars
                .get(i as usize)
                .copied()
                .ok_or_else(|| parse_error(input, "", &alloc::format!("undeclared v{}", i))),
            ValRef::Const(i) => consts
                .get(i as usize)
                .copied()
                .ok_or_else(|| parse_error(input, "", &alloc::format!("undeclared c{}", i))),
        }
    };
    let resolve_block = |blocks: &[Block], i: u32| -> Result<Block, ParseError> {
        blocks
            .get(i as usize)
            .copied()
            .ok_or_else(|| parse_error(input, "", &alloc::format!("undeclared block{}", i)))
    };

    for block_ast in &ast.blocks {
        let block = blocks[block_ast.index as usize];
        for stmt in &block_ast.stmts {
            match stmt {
                StmtAst::Assign { dest, src } => {
                    let dest = resolve(&vars, &consts, *dest)?;
                    let src = resolve(&vars, &consts, *src)?;
                    let kind = method.value(dest).kind();
                    method.append_assignment(block, kind, dest, src, AssignmentReason::Normal);
                }
                StmtAst::Jump(target) => {
                    let target = resolve_block(&blocks, *target)?;
                    method.append_jump(block, target);
                }
                StmtAst::Branch(cond, t, f) => {
                    let cond = resolve(&vars, &consts, *cond)?;
                    let t = resolve_block(&blocks, *t)?;
                    let f = resolve_block(&blocks, *f)?;
                    method.append_branch(block, cond, t, f);
                }
                StmtAst::Switch {
                    tag,
                    arms,
                    default_target,
                } => {
                    let tag = resolve(&vars, &consts, *tag)?;
                    let mut matches = Vec::new();
                    let mut targets = Vec::new();
                    for &(m, t) in arms {
                        matches.push(resolve(&vars, &consts, m)?);
                        targets.push(resolve_block(&blocks, t)?);
                    }
                    let default_target = resolve_block(&blocks, *default_target)?;
                    method.append_switch(block, tag, matches, targets, default_target);
                }
                StmtAst::Call {
                    callee,
                    args,
                    result,
                } => {
                    let callee_value = method.create_method_value(MethodRef(*callee));
                    let mut arg_values = Vec::new();
                    for &arg in args {
                        arg_values.push(resolve(&vars, &consts, arg)?);
                    }
                    let result_value = match result {
                        Some(r) => Some(resolve(&vars, &consts, *r)?),
                        None => None,
                    };
                    method.build_inst(Placement::Append(block), |m, inst| {
                        let function_categories =
                            CategorySet::G.with(LocationCategory::Method);
                        let function = m.make_operand(inst, Effect::Use, function_categories);
                        m.bind(function, callee_value);
                        let args = arg_values
                            .iter()
                            .map(|&v| {
                                let categories =
                                    assignment_src_categories(m.value(v).kind());
                                let op = m.make_operand(inst, Effect::Use, categories);
                                m.bind(op, v);
                                op
                            })
                            .collect();
                        let result = result_value.map(|v| {
                            let categories =
                                assignment_dest_categories(m.value(v).kind());
                            let op = m.make_operand(inst, Effect::Definition, categories);
                            m.bind(op, v);
                            op
                        });
                        InstKind::Call(CallData {
                            function,
                            result,
                            args,
                            caller_save_defs: Vec::new(),
                            native: false,
                        })
                    });
                }
                StmtAst::Try(target) => {
                    let catch = match target {
                        Some(t) => Some(resolve_block(&blocks, *t)?),
                        None => None,
                    };
                    method.append_simple(block, InstKind::Try { catch });
                }
                StmtAst::Catch => {
                    method.append_simple(block, InstKind::Catch { parameter: None });
                }
                StmtAst::Safepoint => {
                    method.append_simple(
                        block,
                        InstKind::Infopoint {
                            kind: InfopointKind::Safepoint,
                            dest: None,
                        },
                    );
                }
                StmtAst::Here(dest) => {
                    let dest = resolve(&vars, &consts, *dest)?;
                    method.build_inst(Placement::Append(block), |m, inst| {
                        let categories = assignment_dest_categories(m.value(dest).kind());
                        let op = m.make_operand(inst, Effect::Definition, categories);
                        m.bind(op, dest);
                        InstKind::Infopoint {
                            kind: InfopointKind::Here,
                            dest: Some(op),
                        }
                    });
                }
                StmtAst::Marker => {
                    method.append_simple(block, InstKind::Marker);
                }
                StmtAst::Filler => {
                    method.append_simple(block, InstKind::Filler);
                }
                StmtAst::Return => {
                    method.append_simple(block, InstKind::Return);
                }
            }
        }
    }

    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValuePayload;

    #[test]
    fn test_parse_minimal_method() {
        let method = parse_method(
            r#"
method {
block0:
    return
}"#,
        )
        .expect("parse failed");
        assert_eq!(method.block_count(), 1);
        let entry = method.entry_block().unwrap();
        assert_eq!(method.block(entry).inst_count(), 1);
    }

    #[test]
    fn test_parse_vars_consts_and_assignment() {
        let method = parse_method(
            r#"
method {
vars { v0: int, v1: ref }
consts { c0: int 42, c1: ref null }
block0:
    v0 = c0
    v1 = c1
    return
}"#,
        )
        .expect("parse failed");
        assert_eq!(method.variables().len(), 2);
        assert_eq!(method.constants().len(), 2);
        let c0 = method.constants()[0];
        assert_eq!(
            method.value(c0).constant_value(),
            Some(ConstantValue::Int(42))
        );
        assert_eq!(method.value(c0).num_uses(), 1);
    }

    #[test]
    fn test_parse_control_flow() {
        let method = parse_method(
            r#"
method {
vars { v0: int }
block0:
    branch v0, block1, block2
block1:
    jump block2
block2:
    return
}"#,
        )
        .expect("parse failed");
        let order = method.block_order().to_vec();
        assert_eq!(method.collect_normal_successors(order[0]), [order[1], order[2]]);
        assert_eq!(method.block(order[2]).predecessors(), [order[0], order[1]]);
    }

    #[test]
    fn test_parse_switch() {
        let method = parse_method(
            r#"
method {
vars { v0: int }
consts { c0: int 1, c1: int 5 }
block0:
    switch v0, [c0 -> block1, c1 -> block2] default block3
block1:
    return
block2:
    return
block3:
    return
}"#,
        )
        .expect("parse failed");
        let entry = method.entry_block().unwrap();
        let switch = method.inst_at(entry, 0);
        match method.inst(switch).kind() {
            InstKind::Switch(data) => {
                assert_eq!(data.matches.len(), 2);
                assert_eq!(data.targets.len(), 2);
            }
            other => panic!("expected switch, got {:?}", other),
        }
        assert_eq!(method.collect_normal_successors(entry).len(), 3);
    }

    #[test]
    fn test_parse_call_and_exceptions() {
        let method = parse_method(
            r#"
method {
vars { v0: int, v1: int }
block0:
    try block1
    call @7(v0) -> v1
    return
block1 dispatcher:
    catch
    return
}"#,
        )
        .expect("parse failed");
        let order = method.block_order().to_vec();
        assert_eq!(
            method.block(order[1]).role(),
            BlockRole::ExceptionDispatcher
        );
        let call = method.inst_at(order[0], 1);
        match method.inst(call).kind() {
            InstKind::Call(data) => {
                assert_eq!(data.args.len(), 1);
                assert!(data.result.is_some());
                let function_value = method.operand(data.function).value().unwrap();
                assert!(matches!(
                    method.value(function_value).payload(),
                    ValuePayload::Method(MethodRef(7))
                ));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_comments_and_infopoints() {
        let method = parse_method(
            r#"
method {
vars { v0: word } ; address capture
block0:
    safepoint      ; poll
    v0 = here
    marker
    return
}"#,
        )
        .expect("parse failed");
        let entry = method.entry_block().unwrap();
        assert_eq!(method.block(entry).inst_count(), 4);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_method("").is_err());
        assert!(parse_method("method {").is_err());
        assert!(parse_method("method { block0: return } extra").is_err());
    }

    #[test]
    fn test_parse_rejects_undeclared_references() {
        let result = parse_method(
            r#"
method {
block0:
    v0 = v1
    return
}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_order_declarations() {
        let result = parse_method(
            r#"
method {
vars { v1: int }
block0:
    return
}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip_through_display() {
        let text = r#"
method {
vars { v0: int, v1: int }
consts { c0: int 3 }
block0:
    v0 = c0
    branch v0, block1, block2
block1:
    v1 = v0
    jump block2
block2:
    return
}"#;
        let method = parse_method(text).expect("parse failed");
        let printed = alloc::format!("{}", method);
        assert!(printed.contains("branch v0, block1, block2"));
        assert!(printed.contains("jump block2"));
    }
}
