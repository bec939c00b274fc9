//! Recursive-descent parser for the expression DSL, built from the
//! token-level combinators in `lexer.rs`.
//!
//! `parse(src)` returns a [`Parsed`] expression or a [`ParseError`] carrying
//! the source position of the failure (§4.1 "Parse errors carry source
//! position").

use nom::{
    branch::alt,
    character::complete::{char, multispace0},
    combinator::{all_consuming, cut, map},
    error::{context, VerboseError},
    multi::{many0, separated_list0},
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::ast::{BinOp, Expr, Parsed};
use crate::lexer::{identifier, keyword, number, operator, string_literal, token};
use cdp_types::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: SourceSpan,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error at {}: {}", self.span, self.message)
    }
}

impl std::error::Error for ParseError {}

type PResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

/// Parse a complete expression; fails if trailing input remains.
pub fn parse(input: &str) -> Result<Parsed, ParseError> {
    match all_consuming(delimited(multispace0, or_expr, multispace0))(input) {
        Ok((_, expr)) => Ok(Parsed {
            expr,
            span: SourceSpan::new(0, input.len()),
        }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = e
                .errors
                .first()
                .map(|(rest, _)| input.len() - rest.len())
                .unwrap_or(0);
            Err(ParseError {
                message: nom::error::convert_error(input, e),
                span: SourceSpan::new(offset, input.len()),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError {
            message: "incomplete input".to_string(),
            span: SourceSpan::new(input.len(), input.len()),
        }),
    }
}

fn or_expr(input: &str) -> PResult<Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(operator("||"), and_expr))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, rhs| Expr::Binary(BinOp::Or, Box::new(acc), Box::new(rhs))),
    ))
}

fn and_expr(input: &str) -> PResult<Expr> {
    let (input, first) = compare(input)?;
    let (input, rest) = many0(preceded(operator("&&"), compare))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, rhs| Expr::Binary(BinOp::And, Box::new(acc), Box::new(rhs))),
    ))
}

fn compare(input: &str) -> PResult<Expr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(tuple((compare_op, factor)))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, (op, rhs)| Expr::Binary(op, Box::new(acc), Box::new(rhs))),
    ))
}

/// `in` must be tried before a bare identifier could swallow it, and the
/// two-character operators must be tried before their one-character
/// prefixes (`==` before nothing, `>=` before `>`).
fn compare_op(input: &str) -> PResult<BinOp> {
    alt((
        map(operator("=="), |_| BinOp::Eq),
        map(operator("!="), |_| BinOp::Ne),
        map(operator(">="), |_| BinOp::Ge),
        map(operator("<="), |_| BinOp::Le),
        map(operator(">"), |_| BinOp::Gt),
        map(operator("<"), |_| BinOp::Lt),
        map(token(keyword("in")), |_| BinOp::In),
    ))(input)
}

fn factor(input: &str) -> PResult<Expr> {
    alt((
        map(token(number), Expr::Number),
        map(token(string_literal), Expr::String),
        map(token(keyword("true")), |_| Expr::Bool(true)),
        map(token(keyword("false")), |_| Expr::Bool(false)),
        paren_expr,
        array_literal,
        field_chain,
    ))(input)
}

fn paren_expr(input: &str) -> PResult<Expr> {
    delimited(
        token(char('(')),
        or_expr,
        cut(context("closing parenthesis", token(char(')')))),
    )(input)
}

fn array_literal(input: &str) -> PResult<Expr> {
    let (input, items) = delimited(
        token(char('[')),
        separated_list0(token(char(',')), or_expr),
        cut(context("closing bracket", token(char(']')))),
    )(input)?;
    Ok((input, Expr::Array(items)))
}

fn field_chain(input: &str) -> PResult<Expr> {
    let (input, base) = primary(input)?;
    let (input, fields) = many0(preceded(token(char('.')), token(identifier)))(input)?;
    Ok((
        input,
        fields
            .into_iter()
            .fold(base, |acc, field| Expr::FieldAccess(Box::new(acc), field.to_string())),
    ))
}

fn primary(input: &str) -> PResult<Expr> {
    map(token(identifier), |ident: &str| Expr::Ident(ident.to_string()))(input)
}
