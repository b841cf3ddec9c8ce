//! `nom` grammar for directive arguments: the argument list itself, rule
//! variables, the operator expression and the action list.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, opt},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, terminated},
};

use warden_rules::{KeySelector, RuleError, Variable, VariableName};

/// Why a piece of directive text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A quoted string opened with this delimiter is never closed.
    Unterminated(char),
    /// Anything else.
    Syntax(String),
}

fn into_grammar_error(what: &str, err: nom::Err<nom::error::Error<&str>>) -> GrammarError {
    match err {
        nom::Err::Failure(e) => match e.input.chars().next() {
            Some(delimiter) => GrammarError::Unterminated(delimiter),
            None => GrammarError::Syntax(format!("unexpected end of {what}")),
        },
        nom::Err::Error(e) => GrammarError::Syntax(format!("invalid {what} near {:?}", e.input)),
        nom::Err::Incomplete(_) => GrammarError::Syntax(format!("incomplete {what}")),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A string between `delimiter`s. Only an escaped delimiter is unescaped;
/// other backslashes are kept for the operators that interpret them.
///
/// A missing closing delimiter is a hard failure so that `alt` does not
/// fall back to another branch.
fn quoted(delimiter: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        let (body, _) = char(delimiter)(input)?;
        let mut out = String::new();
        let mut chars = body.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\\' {
                if let Some(&(_, next)) = chars.peek() {
                    if next == delimiter {
                        out.push(next);
                        chars.next();
                        continue;
                    }
                }
                out.push(c);
            } else if c == delimiter {
                return Ok((&body[i + c.len_utf8()..], out));
            } else {
                out.push(c);
            }
        }
        Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )))
    }
}

fn bare(input: &str) -> IResult<&str, String> {
    map(take_while1(|c: char| !c.is_whitespace()), str::to_owned)(input)
}

fn argument(input: &str) -> IResult<&str, String> {
    alt((quoted('"'), quoted('`'), bare))(input)
}

fn directive_line(input: &str) -> IResult<&str, (&str, Vec<String>)> {
    let (input, name) = preceded(multispace0, take_while1(|c: char| !c.is_whitespace()))(input)?;
    let (input, args) = many0(preceded(multispace1, argument))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (name, args)))
}

/// Split a logical line into the directive keyword and its arguments.
pub fn directive(line: &str) -> Result<(&str, Vec<String>), GrammarError> {
    all_consuming(directive_line)(line)
        .map(|(_, parsed)| parsed)
        .map_err(|e| into_grammar_error("directive", e))
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RawVariable<'a> {
    prefix: Option<char>,
    name: &'a str,
    key: Option<String>,
}

/// `/pattern/`, returned with its slashes. `\/` inside the pattern is
/// unescaped.
fn regex_key(input: &str) -> IResult<&str, String> {
    let (body, _) = char('/')(input)?;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '/' if !escaped => {
                let pattern = body[..i].replace("\\/", "/");
                return Ok((&body[i + 1..], format!("/{pattern}/")));
            }
            _ => escaped = false,
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn key_selector(input: &str) -> IResult<&str, String> {
    alt((
        regex_key,
        quoted('\''),
        map(take_while1(|c: char| c != '|' && !c.is_whitespace()), str::to_owned),
    ))(input)
}

fn variable(input: &str) -> IResult<&str, RawVariable<'_>> {
    let (input, prefix) = opt(alt((char('!'), char('&'))))(input)?;
    let (input, name) = take_while1(is_name_char)(input)?;
    let (input, key) = opt(preceded(char(':'), key_selector))(input)?;
    Ok((input, RawVariable { prefix, name, key }))
}

fn variable_list(input: &str) -> IResult<&str, Vec<RawVariable<'_>>> {
    delimited(
        multispace0,
        separated_list1(delimited(multispace0, char('|'), multispace0), variable),
        multispace0,
    )(input)
}

/// Parse `ARGS|!ARGS:id|&REQUEST_HEADERS|REQUEST_COOKIES:/^sess/`.
///
/// An exclusion (`!NAME:key`) applies to the closest preceding variable of
/// the same name.
pub fn variables(input: &str) -> Result<Vec<Variable>, RuleError> {
    let (_, raw) = all_consuming(variable_list)(input)
        .map_err(|_| RuleError::InvalidVariable(format!("cannot parse variables {input:?}")))?;

    let mut out: Vec<Variable> = Vec::with_capacity(raw.len());
    for item in raw {
        let name: VariableName = item.name.parse()?;
        let key = item.key.as_deref().map(KeySelector::parse).transpose()?;
        match item.prefix {
            Some('!') => {
                let key = key.ok_or_else(|| {
                    RuleError::InvalidVariable(format!("exclusion of {name} needs a key"))
                })?;
                let target = out
                    .iter_mut()
                    .rev()
                    .find(|v| v.name == name && !v.count)
                    .ok_or_else(|| {
                        RuleError::InvalidVariable(format!(
                            "exclusion of {name} without a preceding {name}"
                        ))
                    })?;
                target.exceptions.push(key);
            }
            prefix => {
                let mut var = Variable::new(name);
                var.key = key;
                var.count = prefix == Some('&');
                out.push(var);
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// A parsed `[!]@name argument` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSpec<'a> {
    /// Leading `!`.
    pub negated: bool,
    /// Operator name; `rx` when the expression has no `@`.
    pub name: &'a str,
    /// Everything after the name, trimmed.
    pub argument: &'a str,
}

fn operator_expr(input: &str) -> IResult<&str, (bool, Option<&str>)> {
    let (input, _) = multispace0(input)?;
    let (input, negated) = map(opt(char('!')), |b| b.is_some())(input)?;
    let (input, name) = opt(preceded(char('@'), take_while1(is_name_char)))(input)?;
    Ok((input, (negated, name)))
}

/// Parse the operator argument of `SecRule`.
pub fn operator(input: &str) -> Result<OperatorSpec<'_>, GrammarError> {
    let (rest, (negated, name)) =
        operator_expr(input).map_err(|e| into_grammar_error("operator", e))?;
    if name.is_none() && rest.starts_with('@') {
        return Err(GrammarError::Syntax("missing operator name after '@'".into()));
    }
    Ok(OperatorSpec {
        negated,
        name: name.unwrap_or("rx"),
        argument: rest.trim(),
    })
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

fn action_value(input: &str) -> IResult<&str, String> {
    alt((
        terminated(quoted('\''), multispace0),
        map(take_while(|c: char| c != ','), |v: &str| v.trim().to_owned()),
    ))(input)
}

fn action(input: &str) -> IResult<&str, (String, Option<String>)> {
    let (input, name) = preceded(
        multispace0,
        take_while1(|c: char| is_name_char(c) || c == '-'),
    )(input)?;
    let (input, value) = opt(preceded(
        delimited(multispace0, char(':'), multispace0),
        action_value,
    ))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (name.to_owned(), value)))
}

fn action_list(input: &str) -> IResult<&str, Vec<(String, Option<String>)>> {
    terminated(
        separated_list1(char(','), action),
        preceded(opt(char(',')), multispace0),
    )(input)
}

/// Parse `id:1,phase:2,tag:'a,b',deny` into `(name, value)` pairs in order.
pub fn actions(input: &str) -> Result<Vec<(String, Option<String>)>, GrammarError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    all_consuming(action_list)(input)
        .map(|(_, list)| list)
        .map_err(|e| into_grammar_error("action list", e))
}
