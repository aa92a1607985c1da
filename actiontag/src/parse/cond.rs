// actiontag - a parser for action tags in form field annotations.
// Copyright (C) 2025 The actiontag authors.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! Splitting a conditional tag's argument list.
//!
//! The body of `@IF(condition, then, else)` is divided at the commas that
//! are at the top level, outside parentheses and outside quoted strings.
//! The quote tracking here deliberately matches the established behavior:
//! a quote character toggles string state whenever it matches the opening
//! quote, with no awareness of backslash escapes.  An escaped quote inside
//! a string therefore ends it.  Callers that need escaped quotes in a
//! condition must use the other quote character.

/// One top-level part of an argument list body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgPart {
    pub text: String,
    /// Codepoint offset of the part's first character within the body.
    /// An empty part's offset is where its first character would be.
    pub offset: usize,
}

/// Splits `body` at top-level commas.
///
/// Parentheses are counted outside quoted strings; a comma only splits at
/// depth zero.  A trailing empty part (a body ending in a top-level comma)
/// is dropped; empty parts between commas are kept.
pub fn split_args(body: &str) -> Vec<ArgPart> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut quote = None;
    for (index, c) in body.chars().enumerate() {
        if (c == '"' || c == '\'') && (!in_string || quote == Some(c)) {
            in_string = !in_string;
            quote = in_string.then_some(c);
        } else if !in_string {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(ArgPart {
                        text: std::mem::take(&mut current),
                        offset: start,
                    });
                    start = index + 1;
                    continue;
                }
                _ => (),
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(ArgPart {
            text: current,
            offset: start,
        });
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::{ArgPart, split_args};

    fn check(body: &str, expect: &[(&str, usize)]) {
        let expect = expect
            .iter()
            .map(|&(text, offset)| ArgPart {
                text: text.into(),
                offset,
            })
            .collect::<Vec<_>>();
        assert_eq!(split_args(body), expect, "body: {body:?}");
    }

    #[test]
    fn three_parts() {
        check(
            "[age] > 18, @HIDDEN, @READONLY",
            &[("[age] > 18", 0), (" @HIDDEN", 11), (" @READONLY", 20)],
        );
    }

    #[test]
    fn commas_inside_parens_do_not_split() {
        check(
            "f(a, b) = 1, x, y",
            &[("f(a, b) = 1", 0), (" x", 12), (" y", 15)],
        );
    }

    #[test]
    fn commas_inside_strings_do_not_split() {
        check(
            "[v] = \"a, b\", t, e",
            &[("[v] = \"a, b\"", 0), (" t", 13), (" e", 16)],
        );
        check("'x, y', a, b", &[("'x, y'", 0), (" a", 7), (" b", 10)]);
    }

    #[test]
    fn mismatched_quote_does_not_close() {
        // A single quote inside a double-quoted string is literal text.
        check("\"it's\", a, b", &[("\"it's\"", 0), (" a", 7), (" b", 10)]);
    }

    #[test]
    fn escaped_quote_ends_string() {
        // The splitter has no escape handling, so `\"` closes the string,
        // the comma splits, and the later `"` opens a new string that
        // swallows the final comma.
        check("\"a\\\", b\", c", &[("\"a\\\"", 0), (" b\", c", 5)]);
    }

    #[test]
    fn trailing_empty_part_dropped() {
        check("a, b,", &[("a", 0), (" b", 2)]);
        check("a,,b", &[("a", 0), ("", 2), ("b", 3)]);
    }

    #[test]
    fn unbalanced_close_paren_saturates() {
        check("a), b, c", &[("a)", 0), (" b", 3), (" c", 6)]);
    }

    #[test]
    fn duplicate_part_text_gets_distinct_offsets() {
        check("x, x, x", &[("x", 0), (" x", 2), (" x", 5)]);
    }

    #[test]
    fn empty_body() {
        check("", &[]);
    }
}
