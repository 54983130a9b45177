//! Primitive parsers for kinds, value references and literals.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace1},
    combinator::{map, map_res, opt, recognize},
    multi::many0,
    sequence::{pair, preceded},
    IResult,
};

use crate::constant::{ConstantValue, RefValue};
use crate::kind::Kind;

/// A reference to a declared variable or constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValRef {
    Var(u32),
    Const(u32),
}

/// Parse whitespace and comments (`;` to end of line), discarding them.
pub(crate) fn blank(input: &str) -> IResult<&str, ()> {
    map(
        many0(alt((
            map(multispace1, |_| ()),
            map(
                pair(char(';'), take_while1(|c: char| c != '\n')),
                |_| (),
            ),
        ))),
        |_| (),
    )(input)
}

/// Parse an integer literal
pub(crate) fn integer(input: &str) -> IResult<&str, i64> {
    map_res(
        recognize(pair(
            opt(char('-')),
            take_while1(|c: char| c.is_ascii_digit()),
        )),
        |s: &str| s.parse::<i64>(),
    )(input)
}

/// Parse an unsigned index
pub(crate) fn index(input: &str) -> IResult<&str, u32> {
    map_res(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
        s.parse::<u32>()
    })(input)
}

/// Parse a kind name (int, long, word, ref, float, double)
pub(crate) fn parse_kind(input: &str) -> IResult<&str, Kind> {
    alt((
        map(tag("int"), |_| Kind::Int),
        map(tag("long"), |_| Kind::Long),
        map(tag("word"), |_| Kind::Word),
        map(tag("ref"), |_| Kind::Reference),
        map(tag("float"), |_| Kind::Float),
        map(tag("double"), |_| Kind::Double),
    ))(input)
}

/// Parse a variable reference (v0, v1, ...)
pub(crate) fn parse_var(input: &str) -> IResult<&str, u32> {
    preceded(char('v'), index)(input)
}

/// Parse a constant reference (c0, c1, ...)
pub(crate) fn parse_const(input: &str) -> IResult<&str, u32> {
    preceded(char('c'), index)(input)
}

/// Parse a value reference (variable or constant)
pub(crate) fn parse_val_ref(input: &str) -> IResult<&str, ValRef> {
    alt((
        map(parse_var, ValRef::Var),
        map(parse_const, ValRef::Const),
    ))(input)
}

/// Parse a block reference (block0, block1, ...)
pub(crate) fn parse_block_index(input: &str) -> IResult<&str, u32> {
    preceded(tag("block"), index)(input)
}

/// Parse a method reference (@0, @1, ...)
pub(crate) fn parse_method_ref(input: &str) -> IResult<&str, u32> {
    preceded(char('@'), index)(input)
}

/// Parse a constant payload (`int 42`, `long -7`, `word 8`, `ref null`,
/// `ref 5`)
pub(crate) fn parse_constant_value(input: &str) -> IResult<&str, ConstantValue> {
    alt((
        map(
            preceded(pair(tag("int"), multispace1), integer),
            |v| ConstantValue::Int(v as i32),
        ),
        map(
            preceded(pair(tag("long"), multispace1), integer),
            ConstantValue::Long,
        ),
        map(
            preceded(pair(tag("word"), multispace1), integer),
            |v| ConstantValue::Word(v as u64),
        ),
        map(pair(tag("ref"), preceded(multispace1, tag("null"))), |_| {
            ConstantValue::Reference(RefValue::NULL)
        }),
        map(
            preceded(pair(tag("ref"), multispace1), integer),
            |v| ConstantValue::Reference(RefValue(v as u64)),
        ),
    ))(input)
}
