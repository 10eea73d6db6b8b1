//! Filter expression parser using nom.
//!
//! Parses the compact filter terms accepted on the command line into a
//! [`SearchSpec`].
//!
//! # Syntax Overview
//!
//! ```text
//! age>=18          `age` >= ?
//! age<65           `age` < ?
//! name~^A,^B       (`name` REGEXP ? OR `name` REGEXP ?)
//! status=new,open  `status` IN (?, ?)
//! title="a, b"     `title` IN (?)      quoted values may hold commas
//! ```

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, value},
    multi::separated_list1,
    sequence::{delimited, preceded},
};

use crate::ast::{CompareOp, SearchSpec, Term};
use crate::error::{BinderyError, BinderyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Compare(CompareOp),
    Regexp,
    Equal,
}

/// Parse one filter expression into its field and term.
pub fn parse_filter(input: &str) -> BinderyResult<(String, Term)> {
    let input = input.trim();

    match parse_expr(input) {
        Ok(("", (field, op, values_at, values))) => {
            build_term(op, values, input.len() - values_at.len()).map(|term| (field.to_string(), term))
        }
        Ok((remaining, _)) => Err(BinderyError::parse(
            input.len() - remaining.len(),
            format!("Unexpected trailing content: '{}'", remaining),
        )),
        Err(e) => Err(BinderyError::parse(0, format!("Parse failed: {:?}", e))),
    }
}

/// Parse several expressions into one search; repeated fields accumulate.
pub fn parse_filters<I, S>(inputs: I) -> BinderyResult<SearchSpec>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut spec = SearchSpec::new();
    for input in inputs {
        let (field, term) = parse_filter(input.as_ref())?;
        spec.push(field, term);
    }
    Ok(spec)
}

/// `position` is the offset of the value list within the expression.
fn build_term(op: Op, mut values: Vec<String>, position: usize) -> BinderyResult<Term> {
    match op {
        Op::Compare(cmp) => {
            if values.len() != 1 {
                return Err(BinderyError::parse(
                    position,
                    format!("'{}' takes a single value", cmp.symbol()),
                ));
            }
            Ok(Term::Compare(cmp, values.remove(0)))
        }
        Op::Regexp => Ok(Term::Regexp(values)),
        Op::Equal => Ok(Term::In(values)),
    }
}

fn parse_expr(input: &str) -> IResult<&str, (&str, Op, &str, Vec<String>)> {
    let (input, field) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = parse_operator(input)?;
    let (values_at, _) = multispace0(input)?;
    let (input, values) = parse_values(values_at)?;
    Ok((input, (field, op, values_at, values)))
}

/// Parse a field name (letters, digits, `_`, `.`).
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.')(input)
}

fn parse_operator(input: &str) -> IResult<&str, Op> {
    alt((
        value(Op::Compare(CompareOp::Ge), tag(">=")),
        value(Op::Compare(CompareOp::Le), tag("<=")),
        value(Op::Compare(CompareOp::Gt), tag(">")),
        value(Op::Compare(CompareOp::Lt), tag("<")),
        value(Op::Regexp, tag("~")),
        value(Op::Equal, tag("=")),
    ))(input)
}

/// Comma-separated values, each quoted or bare.
fn parse_values(input: &str) -> IResult<&str, Vec<String>> {
    separated_list1(
        preceded(multispace0, char(',')),
        preceded(multispace0, parse_value),
    )(input)
}

fn parse_value(input: &str) -> IResult<&str, String> {
    alt((
        map(delimited(char('\''), take_while(|c: char| c != '\''), char('\'')), str::to_string),
        map(delimited(char('"'), take_while(|c: char| c != '"'), char('"')), str::to_string),
        map(is_not(","), |s: &str| s.trim_end().to_string()),
    ))(input)
}
