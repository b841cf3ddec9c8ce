//! Builtin transformations.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

use crate::plugin::Transformation;
use crate::registry::Registry;

/// Register every builtin transformation.
pub fn register(registry: &Registry) {
    registry.register_transformation("none", Identity);
    registry.register_transformation("lowercase", Lowercase);
    registry.register_transformation("uppercase", Uppercase);
    registry.register_transformation("trim", Trim);
    registry.register_transformation("compressWhitespace", CompressWhitespace);
    registry.register_transformation("removeWhitespace", RemoveWhitespace);
    registry.register_transformation("removeNulls", RemoveNulls);
    registry.register_transformation("urlDecode", UrlDecode);
    registry.register_transformation("length", Length);
}

/// `t:none`. The parser treats it as "clear the list so far"; as a
/// transformation it leaves the value alone.
#[derive(Debug)]
pub struct Identity;

impl Transformation for Identity {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(input)
    }
}

#[derive(Debug)]
pub struct Lowercase;

impl Transformation for Lowercase {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.chars().any(char::is_uppercase) {
            Cow::Owned(input.to_lowercase())
        } else {
            Cow::Borrowed(input)
        }
    }
}

#[derive(Debug)]
pub struct Uppercase;

impl Transformation for Uppercase {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.chars().any(char::is_lowercase) {
            Cow::Owned(input.to_uppercase())
        } else {
            Cow::Borrowed(input)
        }
    }
}

#[derive(Debug)]
pub struct Trim;

impl Transformation for Trim {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(input.trim())
    }
}

/// Collapse runs of whitespace into a single space.
#[derive(Debug)]
pub struct CompressWhitespace;

impl Transformation for CompressWhitespace {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let needs_work = input
            .as_bytes()
            .windows(2)
            .any(|w| w[0].is_ascii_whitespace() && w[1].is_ascii_whitespace())
            || input.chars().any(|c| c.is_whitespace() && c != ' ');
        if !needs_work {
            return Cow::Borrowed(input);
        }
        let mut out = String::with_capacity(input.len());
        let mut in_space = false;
        for c in input.chars() {
            if c.is_whitespace() {
                if !in_space {
                    out.push(' ');
                }
                in_space = true;
            } else {
                out.push(c);
                in_space = false;
            }
        }
        Cow::Owned(out)
    }
}

#[derive(Debug)]
pub struct RemoveWhitespace;

impl Transformation for RemoveWhitespace {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.chars().any(char::is_whitespace) {
            Cow::Owned(input.chars().filter(|c| !c.is_whitespace()).collect())
        } else {
            Cow::Borrowed(input)
        }
    }
}

#[derive(Debug)]
pub struct RemoveNulls;

impl Transformation for RemoveNulls {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.contains('\0') {
            Cow::Owned(input.replace('\0', ""))
        } else {
            Cow::Borrowed(input)
        }
    }
}

/// Percent-decode, treating `+` as a space. Invalid UTF-8 is replaced.
#[derive(Debug)]
pub struct UrlDecode;

impl Transformation for UrlDecode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains(['%', '+']) {
            return Cow::Borrowed(input);
        }
        let spaced = input.replace('+', " ");
        Cow::Owned(percent_decode_str(&spaced).decode_utf8_lossy().into_owned())
    }
}

/// Replace the value with its length in bytes.
#[derive(Debug)]
pub struct Length;

impl Transformation for Length {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Owned(input.len().to_string())
    }
}
