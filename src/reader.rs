//! Source text to [`Form`] trees.
//!
//! Every form carries the 1-based line and column it starts at. Collection literals
//! read as constructor calls: `[a b]` is `(make-vector a b)`, `{k v}` is
//! `(make-hashmap k v)` and `#{a}` is `(make-hashset a)`. Commas are whitespace and `;`
//! starts a line comment.

use chrono::NaiveDate;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace1},
    combinator::{recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::pair,
};

use crate::ast::{Form, MAKE_HASHMAP, MAKE_HASHSET, MAKE_VECTOR, Position};
use crate::value::Value;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters allowed in identifiers, keyword and symbol names, and number tokens
fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || "-_+*/<>=!?&.%$^~|".contains(c)
}

/// Abort parsing: no other alternative can match here
fn fail<T>(input: &str, code: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, code)))
}

/// Whitespace, commas and line comments
fn trivia(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            tag(","),
            recognize(pair(char(';'), take_while(|c: char| c != '\n'))),
        ))),
    )
    .parse(input)
}

fn skip_trivia(input: &str) -> &str {
    match trivia(input) {
        Ok((rest, ())) => rest,
        Err(_) => input,
    }
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(is_token_char).parse(input)
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(chars))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => return fail(remaining, ErrorKind::Escaped),
                    None => return fail(remaining, ErrorKind::Eof),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => return fail(remaining, ErrorKind::Eof),
        }
    }
}

/// `\c`
fn parse_character(input: &str) -> IResult<&str, Value> {
    let (rest, _) = char('\\').parse(input)?;
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if !c.is_whitespace() => Ok((chars.as_str(), Value::Character(c))),
        Some(_) => fail(rest, ErrorKind::Char),
        None => fail(rest, ErrorKind::Eof),
    }
}

fn parse_keyword(input: &str) -> IResult<&str, Value> {
    let (rest, _) = char(':').parse(input)?;
    match token(rest) {
        Ok((rest, name)) => Ok((rest, Value::Keyword(name.to_owned()))),
        Err(_) => fail(rest, ErrorKind::Tag),
    }
}

fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let (rest, _) = char('\'').parse(input)?;
    match token(rest) {
        Ok((rest, name)) => Ok((rest, Value::Symbol(name.to_owned()))),
        Err(_) => fail(rest, ErrorKind::Tag),
    }
}

/// `#YYYY-MM-DD` dates, `#` + 8 binary digits, `#` + 8 hex digits
fn parse_hash_literal(input: &str) -> IResult<&str, Value> {
    let (rest, _) = char('#').parse(input)?;
    let (after, body) = match take_while1::<_, &str, nom::error::Error<&str>>(|c: char| c.is_ascii_alphanumeric() || c == '-')
        .parse(rest)
    {
        Ok(parsed) => parsed,
        Err(_) => return fail(rest, ErrorKind::Tag),
    };

    let is_date = body.len() == 10
        && body
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if is_date {
        return match NaiveDate::parse_from_str(body, "%Y-%m-%d") {
            Ok(date) => Ok((after, Value::Date(date))),
            Err(_) => fail(rest, ErrorKind::MapRes),
        };
    }

    let radix = if body.len() != 8 {
        None
    } else if body.chars().all(|c| c == '0' || c == '1') {
        Some(2)
    } else if body.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(16)
    } else {
        None
    };
    match radix.map(|radix| i64::from_str_radix(body, radix)) {
        Some(Ok(n)) => Ok((after, Value::IntegerNumber(n))),
        Some(Err(_)) => fail(rest, ErrorKind::MapRes),
        None => fail(rest, ErrorKind::Tag),
    }
}

/// Classify a bare token: constants, numbers, or an identifier
fn classify_token<'s>(
    input: &'s str,
    text: &'s str,
    position: Position,
) -> Result<Form, nom::Err<nom::error::Error<&'s str>>> {
    let literal = |value: Value| Ok(Form::Literal(value, position));
    match text {
        "nil" => return literal(Value::Nil),
        "true" => return literal(Value::Boolean(true)),
        "false" => return literal(Value::Boolean(false)),
        _ => {}
    }

    let unsigned = text.strip_prefix('-').unwrap_or(text);
    if !unsigned.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(Form::Identifier(text.to_owned(), position));
    }

    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if digits(unsigned) {
        return match text.parse::<i64>() {
            Ok(n) => literal(Value::IntegerNumber(n)),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                ErrorKind::MapRes,
            ))),
        };
    }
    match unsigned.split_once('.') {
        Some((whole, fraction)) if digits(whole) && digits(fraction) => match text.parse::<f64>() {
            Ok(x) => literal(Value::FloatNumber(x)),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                ErrorKind::Float,
            ))),
        },
        _ => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

struct Reader<'s> {
    source: &'s str,
    /// Byte offset of the first character of every line
    line_starts: Vec<usize>,
}

impl<'s> Reader<'s> {
    fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Reader {
            source,
            line_starts,
        }
    }

    fn offset(&self, rest: &str) -> usize {
        self.source.len().saturating_sub(rest.len())
    }

    /// Position of the start of `rest`, a suffix of the source
    fn position(&self, rest: &str) -> Position {
        let offset = self.offset(rest);
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self
            .line_starts
            .get(line.saturating_sub(1))
            .copied()
            .unwrap_or(0);
        let column = self
            .source
            .get(start..offset)
            .map_or(0, |prefix| prefix.chars().count());
        Position::new(line, column + 1)
    }

    fn form(&self, input: &'s str, depth: usize) -> IResult<&'s str, Form> {
        if depth >= MAX_PARSE_DEPTH {
            return fail(input, ErrorKind::TooLarge);
        }
        let position = self.position(input);

        let (constructor, open, close) = if input.starts_with('(') {
            (None, 1, ')')
        } else if input.starts_with('[') {
            (Some(MAKE_VECTOR), 1, ']')
        } else if input.starts_with('{') {
            (Some(MAKE_HASHMAP), 1, '}')
        } else if input.starts_with("#{") {
            (Some(MAKE_HASHSET), 2, '}')
        } else {
            return self.atom(input, position);
        };

        let (rest, mut items) = self.sequence(&input[open..], close, depth)?;
        if let Some(constructor) = constructor {
            items.insert(0, Form::Identifier(constructor.to_owned(), position));
        }
        Ok((rest, Form::List(items, position)))
    }

    /// Forms up to the closing delimiter
    fn sequence(&self, input: &'s str, close: char, depth: usize) -> IResult<&'s str, Vec<Form>> {
        let mut items = Vec::new();
        let mut input = input;
        loop {
            input = skip_trivia(input);
            match input.chars().next() {
                None => return fail(input, ErrorKind::Eof),
                Some(c) if c == close => return Ok((&input[c.len_utf8()..], items)),
                Some(')' | ']' | '}') => return fail(input, ErrorKind::Char),
                Some(_) => {
                    let (rest, form) = self.form(input, depth + 1)?;
                    items.push(form);
                    input = rest;
                }
            }
        }
    }

    fn atom(&self, input: &'s str, position: Position) -> IResult<&'s str, Form> {
        match alt((
            parse_string,
            parse_character,
            parse_keyword,
            parse_symbol,
            parse_hash_literal,
        ))
        .parse(input)
        {
            Ok((rest, value)) => return Ok((rest, Form::Literal(value, position))),
            Err(nom::Err::Error(_)) => {}
            Err(e) => return Err(e),
        }

        let Ok((rest, text)) = token(input) else {
            return fail(input, ErrorKind::Tag);
        };
        Ok((rest, classify_token(input, text, position)?))
    }

    fn error(&self, error: nom::Err<nom::error::Error<&str>>) -> Error {
        let (kind, at) = match error {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                let kind = match e.code {
                    ErrorKind::TooLarge => ParseErrorKind::TooDeeplyNested,
                    ErrorKind::Eof => ParseErrorKind::Incomplete,
                    ErrorKind::MapRes => ParseErrorKind::ImplementationLimit,
                    _ => ParseErrorKind::InvalidSyntax,
                };
                (kind, e.input)
            }
            nom::Err::Incomplete(_) => (ParseErrorKind::Incomplete, ""),
        };
        let message = match kind {
            ParseErrorKind::TooDeeplyNested => {
                format!("form too deeply nested (max depth: {MAX_PARSE_DEPTH})")
            }
            ParseErrorKind::Incomplete => "unexpected end of input".to_owned(),
            ParseErrorKind::ImplementationLimit => "literal out of range".to_owned(),
            ParseErrorKind::InvalidSyntax => "invalid syntax".to_owned(),
        };
        Error::Parse(
            ParseError::new(kind, message, self.position(at)).with_context(self.source, self.offset(at)),
        )
    }
}

/// Read every top-level form of `source`
pub fn read_all(source: &str) -> Result<Vec<Form>, Error> {
    let reader = Reader::new(source);
    let mut forms = Vec::new();
    let mut input = skip_trivia(source);
    while !input.is_empty() {
        let (rest, form) = reader.form(input, 0).map_err(|e| reader.error(e))?;
        forms.push(form);
        input = skip_trivia(rest);
    }
    Ok(forms)
}

/// Read exactly one form
pub fn read(source: &str) -> Result<Form, Error> {
    let mut forms = read_all(source)?.into_iter();
    match (forms.next(), forms.next()) {
        (Some(form), None) => Ok(form),
        (None, _) => Err(Error::Parse(ParseError::new(
            ParseErrorKind::Incomplete,
            "no form to read",
            Position::default(),
        ))),
        (Some(_), Some(extra)) => Err(Error::Parse(ParseError::new(
            ParseErrorKind::InvalidSyntax,
            format!("unexpected remaining input: '{extra}'"),
            extra.position(),
        ))),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::{kw, sym};
    use pretty_assertions::assert_eq;

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Literal(Value),              // Should read a single literal with this value
        Renders(&'static str),       // Should read a form displaying as this text
        Kind(ParseErrorKind),        // Reading should fail with this kind of error
        SpecificError(&'static str), // Reading should fail with error containing this string
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Literal(value.into())
    }

    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input})", i + 1);

            match (read(input), expected) {
                (Ok(Form::Literal(actual, _)), Literal(expected_val)) => {
                    assert_eq!(&actual, expected_val, "{test_id}: value mismatch");
                }
                (Ok(actual), Renders(expected_text)) => {
                    let displayed = actual.to_string();
                    assert_eq!(&displayed, expected_text, "{test_id}: display mismatch");

                    // Round trip: display -> read -> display is identical
                    let reparsed = read(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip read failed for '{displayed}': {e}")
                    });
                    assert_eq!(reparsed.to_string(), displayed, "{test_id}: round-trip mismatch");
                }
                (Err(Error::Parse(err)), Kind(expected_kind)) => {
                    assert_eq!(&err.kind, expected_kind, "{test_id}: {err}");
                }
                (Err(err), SpecificError(expected_text)) => {
                    let error_msg = format!("{err}");
                    assert!(
                        error_msg.contains(expected_text),
                        "{test_id}: error should contain '{expected_text}', got {error_msg}"
                    );
                }
                (actual, expected) => panic!("{test_id}: expected {expected:?}, got {actual:?}"),
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_reader_comprehensive() {
        let test_cases = vec![
            // ===== NUMBERS =====
            ("42", success(42)),
            ("-5", success(-5)),
            ("0", success(0)),
            ("3.25", success(3.25)),
            ("-0.5", success(-0.5)),
            ("9223372036854775807", success(i64::MAX)),
            ("-9223372036854775808", success(i64::MIN)),
            ("9223372036854775808", Kind(ParseErrorKind::ImplementationLimit)),
            ("#00001010", success(10)),
            ("#ff000000", success(0xff00_0000_i64)),
            ("#0000000g", Kind(ParseErrorKind::InvalidSyntax)),
            ("#123", Kind(ParseErrorKind::InvalidSyntax)),
            ("1abc", Kind(ParseErrorKind::InvalidSyntax)),
            ("1.", Kind(ParseErrorKind::InvalidSyntax)),
            // ===== CONSTANTS, STRINGS, CHARACTERS =====
            ("nil", success(Value::Nil)),
            ("true", success(true)),
            ("false", success(false)),
            ("\"hello world\"", success("hello world")),
            ("\"\"", success("")),
            ("\"with\\\"quotes\\n\"", success("with\"quotes\n")),
            ("\"bad \\q escape\"", Kind(ParseErrorKind::InvalidSyntax)),
            ("\"unterminated", Kind(ParseErrorKind::Incomplete)),
            ("\\a", success('a')),
            ("\\", Kind(ParseErrorKind::Incomplete)),
            // ===== KEYWORDS, SYMBOLS, DATES =====
            (":name", success(kw("name"))),
            (":has-dash?", success(kw("has-dash?"))),
            ("'sym", success(sym("sym"))),
            (":", Kind(ParseErrorKind::InvalidSyntax)),
            ("#2024-02-29", success(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())),
            ("#2023-02-29", Kind(ParseErrorKind::ImplementationLimit)),
            // ===== IDENTIFIERS =====
            ("foo", Renders("foo")),
            ("->>", Renders("->>")),
            ("-", Renders("-")),
            ("<=", Renders("<=")),
            ("lib/name", Renders("lib/name")),
            ("nil?", Renders("nil?")),
            // ===== LISTS AND COLLECTION LITERALS =====
            ("()", Renders("()")),
            ("(+ 1 2)", Renders("(+ 1 2)")),
            ("  ( +   1,2 )  ", Renders("(+ 1 2)")),
            ("[1 [2 3]]", Renders("[1 [2 3]]")),
            ("{:a 1}", Renders("{:a 1}")),
            ("#{1 2}", Renders("#{1 2}")),
            ("(f \"s\" \\c 'x #2024-01-05)", Renders("(f \"s\" \\c 'x #2024-01-05)")),
            ("; comment\n(do 1) ; trailing", Renders("(do 1)")),
            // ===== ERRORS =====
            ("(+ 1 2", Kind(ParseErrorKind::Incomplete)),
            ("[1 2)", Kind(ParseErrorKind::InvalidSyntax)),
            (")", Kind(ParseErrorKind::InvalidSyntax)),
            ("", SpecificError("no form to read")),
            ("1 2", SpecificError("unexpected remaining input: '2'")),
            ("(@)", SpecificError("ParseError at 1:2: invalid syntax")),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_positions_are_tracked() {
        let forms = read_all("(a)\n  (b\n   c)").unwrap();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].position(), Position::new(1, 1));
        assert_eq!(forms[1].position(), Position::new(2, 3));
        let Form::List(items, _) = &forms[1] else {
            panic!("expected a list");
        };
        assert_eq!(items[1].position(), Position::new(3, 4));
    }

    #[test]
    fn test_vector_literal_reads_as_constructor() {
        let form = read("[a 1]").unwrap();
        assert_eq!(form.vector_items().map(<[Form]>::len), Some(2));
        assert!(read("{:a 1}").unwrap().is_hashmap_literal());
    }

    #[test]
    fn test_nesting_limit() {
        let nested_ok = "(".repeat(MAX_PARSE_DEPTH - 1) + &")".repeat(MAX_PARSE_DEPTH - 1);
        assert!(read(&nested_ok).is_ok());

        let too_deep = "(".repeat(MAX_PARSE_DEPTH + 1) + &")".repeat(MAX_PARSE_DEPTH + 1);
        match read(&too_deep) {
            Err(Error::Parse(err)) => assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested),
            other => panic!("expected a nesting error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_context_snippet() {
        let Err(Error::Parse(err)) = read("(ok)\n(bad 1x)") else {
            panic!("expected a parse error");
        };
        assert_eq!(err.position, Position::new(2, 6));
        assert_eq!(err.context.as_deref(), Some("1x)"));
    }
}
