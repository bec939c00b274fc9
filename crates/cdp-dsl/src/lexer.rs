//! Token-level leaf parsers shared by the expression grammar in `parser.rs`.
//!
//! These are plain `nom` combinators over `&str`; there is no separate token
//! stream. Splitting them out mirrors the `lexer`/`parser` separation
//! described in the expression engine's design: this module recognizes
//! individual lexemes (numbers, strings, identifiers, keywords, operators),
//! `parser.rs` composes them into the precedence-climbing grammar.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{map, opt, recognize, value},
    error::{ContextError, ParseError as NomParseError},
    multi::many0,
    sequence::{pair, preceded, tuple},
    IResult,
};

/// Consume leading whitespace, then run `p`. Every token-level parser in
/// this module is whitespace-insensitive on its left edge; `parser.rs`
/// relies on that to avoid littering every call site with `multispace0`.
pub fn token<'a, O, E: NomParseError<&'a str>, F>(
    mut p: F,
) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
    F: FnMut(&'a str) -> IResult<&'a str, O, E>,
{
    move |input: &'a str| {
        let (input, _) = multispace0(input)?;
        p(input)
    }
}

pub fn identifier<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

pub fn number<'a, E: NomParseError<&'a str>>(input: &'a str) -> IResult<&'a str, f64, E> {
    map(
        recognize(tuple((digit1, opt(pair(char('.'), digit1))))),
        |s: &str| s.parse::<f64>().unwrap_or(f64::NAN),
    )(input)
}

pub fn string_literal<'a, E: NomParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> IResult<&'a str, String, E> {
    let (input, _) = char('"')(input)?;
    let (input, content) = opt(escaped_transform(
        none_of("\\\""),
        '\\',
        alt((
            value("\\", tag("\\")),
            value("\"", tag("\"")),
            value("\n", tag("n")),
            value("\t", tag("t")),
        )),
    ))(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.unwrap_or_default()))
}

pub fn keyword<'a, E: NomParseError<&'a str>>(
    kw: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
    move |input: &'a str| {
        let (rest, ident) = identifier(input)?;
        if ident == kw {
            Ok((rest, ident))
        } else {
            Err(nom::Err::Error(E::from_error_kind(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    }
}

pub fn operator<'a, E: NomParseError<&'a str>>(
    op: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
    preceded(multispace0, tag(op))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identifiers() {
        let (rest, id) = identifier::<nom::error::Error<&str>>("app_open2 rest").unwrap();
        assert_eq!(id, "app_open2");
        assert_eq!(rest, " rest");
    }

    #[test]
    fn parses_decimal_numbers() {
        let (_, n) = number::<nom::error::Error<&str>>("12.5").unwrap();
        assert_eq!(n, 12.5);
    }

    #[test]
    fn parses_escaped_strings() {
        let (_, s) =
            string_literal::<nom::error::VerboseError<&str>>("\"a \\\"quoted\\\" word\"").unwrap();
        assert_eq!(s, "a \"quoted\" word");
    }
}
