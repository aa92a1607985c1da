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

//! Action tag scanning.
//!
//! An action tag is an `@NAME` marker embedded in free-form field annotation
//! text, optionally followed by a parameter.  This module implements the
//! character-level scanner that divides annotation text into an ordered list
//! of [Segment]s: runs of plain text ([Segment::Text]) and recognized tags
//! ([Segment::Tag]), the latter with an optional typed [Parameter].
//!
//! The scanner never fails.  Malformed syntax degrades to annotated text
//! segments or to warnings attached to a tag, and the returned segments
//! always cover the input exactly once, in order.  Positions are expressed
//! as codepoint indexes (not byte offsets) so that they remain meaningful
//! for multi-byte text, and spans are inclusive on both ends.
//!
//! A tag named [`IF_TAG`] whose parameter is an argument list is treated as a
//! conditional: its body is split into condition, then, and else parts, and
//! the two branches are recursively scanned with their spans re-based into
//! the coordinate system of the outermost input.  [`cond`] implements the
//! splitting.

use serde::{Deserialize, Serialize};

pub mod cond;

use cond::split_args;

/// The tag name that designates a conditional tag.
pub const IF_TAG: &str = "@IF";

/// Maximum nesting depth for conditional branches.  Past this depth a
/// tag keeps its argument list but its branches stay unparsed, with a
/// warning.
pub const MAX_CONDITIONAL_DEPTH: usize = 64;

const ESCAPE: char = '\\';
const TAG_START: char = '@';

/// Valid first and last character of a tag name.
fn is_name_edge(c: char) -> bool {
    c.is_ascii_uppercase()
}

/// Valid interior character of a tag name.
fn is_name_char(c: char) -> bool {
    c.is_ascii_uppercase() || c == '_' || c == '-'
}

/// Whitespace that may precede a tag starter or terminate a bare parameter.
fn is_tag_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Characters that end a tag name.  A comma also ends a name inside a
/// recursive invocation (`nested`), to support comma-separated conditional
/// arguments.
fn is_name_terminator(c: char, nested: bool) -> bool {
    matches!(c, ' ' | '\t' | '=' | '(' | '{' | '\n' | '\r') || (nested && c == ',')
}

/// Legal escape targets inside JSON string literals, besides `\"` and `\\`.
fn is_json_escape(c: char) -> bool {
    matches!(c, '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')
}

/// An inclusive range of codepoint indexes into the original input.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Index of the first codepoint.
    pub start: usize,
    /// Index of the last codepoint (inclusive).
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of codepoints covered.  Never zero; a span always locates
    /// at least one character.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Whether `other` lies entirely within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A non-fatal issue attached to a tag or, for incomplete parameters, to the
/// text segment covering the partial parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub span: Span,
    pub message: String,
}

impl Warning {
    fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// The kind of a tag parameter.
///
/// This mirrors the variants of [Parameter], plus [ParameterKind::None] for
/// tags that take no parameter.  The registry declares the kinds each known
/// tag accepts in these terms.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParameterKind {
    Integer,
    UnquotedString,
    QuotedString,
    Json,
    ArgumentList,
    None,
}

/// A typed tag parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Parameter {
    /// A run of digits, e.g. `@MAXCHECKED=5`.
    Integer { span: Span, text: String },

    /// A bare token ending at whitespace, e.g. `@NONEOFTHEABOVE=99-none`.
    /// Also produced when an integer parameter runs into a non-digit.
    UnquotedString { span: Span, text: String },

    /// A single- or double-quoted string.  `text` holds the unescaped value
    /// without the quotes; `quote` is the delimiter that enclosed it.  The
    /// span includes both quote characters.
    QuotedString { span: Span, text: String, quote: char },

    /// A brace- or bracket-delimited JSON value.  `text` is the raw captured
    /// text; `valid` records the outcome of a strict JSON parse, with the
    /// parser's message in `error` on failure.
    Json {
        span: Span,
        text: String,
        valid: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A parenthesized argument list.  `body` is the content between the
    /// parentheses, exclusive; the span includes them.
    ArgumentList { span: Span, body: String },
}

impl Parameter {
    pub fn kind(&self) -> ParameterKind {
        match self {
            Self::Integer { .. } => ParameterKind::Integer,
            Self::UnquotedString { .. } => ParameterKind::UnquotedString,
            Self::QuotedString { .. } => ParameterKind::QuotedString,
            Self::Json { .. } => ParameterKind::Json,
            Self::ArgumentList { .. } => ParameterKind::ArgumentList,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Integer { span, .. }
            | Self::UnquotedString { span, .. }
            | Self::QuotedString { span, .. }
            | Self::Json { span, .. }
            | Self::ArgumentList { span, .. } => *span,
        }
    }

    /// The parameter's value as text: the stored (unescaped) value for
    /// quoted strings, the body for argument lists, and the raw text for
    /// the other kinds.
    pub fn value(&self) -> &str {
        match self {
            Self::Integer { text, .. }
            | Self::UnquotedString { text, .. }
            | Self::QuotedString { text, .. }
            | Self::Json { text, .. } => text,
            Self::ArgumentList { body, .. } => body,
        }
    }
}

/// A run of text that is not part of any recognized tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub span: Span,
    /// The text of the run.  Escape processing may make this shorter than
    /// the span (a consumed backslash still belongs to the span).
    pub text: String,
    /// Why a tag candidate was downgraded to plain text, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

/// A recognized action tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagSegment {
    /// Span of the whole construct, name and parameter included.
    pub span: Span,
    /// The tag name, including the leading `@`.
    pub name: String,
    /// Span of the name alone.
    pub name_span: Span,
    /// Raw text of the whole construct.
    pub full: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    /// Present on an [IF_TAG] tag whose argument list split cleanly into
    /// condition, then, and else parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional: Option<Box<Conditional>>,
}

/// The three parts of a conditional tag's argument list, with the then and
/// else branches recursively scanned.  All spans in the branch segments are
/// absolute, i.e. expressed in the coordinate system of the outermost input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conditional {
    pub condition: String,
    pub then_text: String,
    pub else_text: String,
    pub then_segments: Vec<Segment>,
    pub else_segments: Vec<Segment>,
}

/// One parse result unit.  A parse call returns segments that are contiguous,
/// non-overlapping, and cover the input exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Segment {
    Text(TextSegment),
    Tag(TagSegment),
}

impl Segment {
    pub fn span(&self) -> Span {
        match self {
            Self::Text(text) => text.span,
            Self::Tag(tag) => tag.span,
        }
    }

    pub fn as_tag(&self) -> Option<&TagSegment> {
        match self {
            Self::Tag(tag) => Some(tag),
            Self::Text(_) => None,
        }
    }
}

/// Parses `input` into an ordered list of segments.
///
/// Equivalent to [`parse_at`] with an offset of zero.
pub fn parse(input: &str) -> Vec<Segment> {
    parse_at(input, 0)
}

/// Parses `input`, re-basing all spans by `offset` codepoints.
///
/// A nonzero offset marks the invocation as nested, which additionally makes
/// `,` terminate tag names (conditional branches are comma-separated).  This
/// function never fails: any input, including the empty string, yields a
/// well-formed segment list.  Empty input yields an empty list.
pub fn parse_at(input: &str, offset: usize) -> Vec<Segment> {
    parse_depth(input, offset, 0)
}

/// Parses `input` and keeps only the top-level tag segments.
pub fn parse_tags(input: &str) -> Vec<TagSegment> {
    parse(input)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Tag(tag) => Some(tag),
            Segment::Text(_) => None,
        })
        .collect()
}

fn parse_depth(input: &str, offset: usize, depth: usize) -> Vec<Segment> {
    let mut segments = Scanner::new(input, offset).run();
    attach_conditionals(&mut segments, depth);
    segments
}

/// Attaches conditional sub-trees to every [IF_TAG] tag with an argument
/// list parameter.  A body that does not split into exactly three top-level
/// parts gets a warning instead; so does a tag nested beyond
/// [MAX_CONDITIONAL_DEPTH].
fn attach_conditionals(segments: &mut [Segment], depth: usize) {
    for segment in segments {
        let Segment::Tag(tag) = segment else { continue };
        if tag.name != IF_TAG {
            continue;
        }
        let Some(Parameter::ArgumentList { span, body }) = &tag.parameter else {
            continue;
        };
        if depth >= MAX_CONDITIONAL_DEPTH {
            log::warn!("conditional tag at {}..={} exceeds nesting limit", span.start, span.end);
            tag.warnings.push(Warning::new(
                tag.span,
                "Too many nested @IF levels; then/else branches were not parsed.",
            ));
            continue;
        }
        let parts = split_args(body);
        if parts.len() != 3 {
            tag.warnings.push(Warning::new(tag.span, "Invalid @IF syntax."));
            continue;
        }
        // The body starts one codepoint past the opening parenthesis; the
        // parameter span (which includes the parentheses) is already
        // absolute, so branch offsets come out absolute as well.
        let body_start = span.start + 1;
        let mut parts = parts.into_iter();
        let condition = parts.next().unwrap();
        let then_part = parts.next().unwrap();
        let else_part = parts.next().unwrap();
        let then_segments = parse_depth(&then_part.text, body_start + then_part.offset, depth + 1);
        let else_segments = parse_depth(&else_part.text, body_start + else_part.offset, depth + 1);
        tag.conditional = Some(Box::new(Conditional {
            condition: condition.text,
            then_text: then_part.text,
            else_text: else_part.text,
            then_segments,
            else_segments,
        }));
    }
}

/// A tag whose name has been validated but whose segment has not been
/// emitted yet (a parameter may still follow).
#[derive(Debug, Default)]
struct PendingTag {
    name: String,
    start: usize,
    end: usize,
}

/// Text consumed between a tag name and a parameter candidate (whitespace
/// and `=`).  Discarded into the tag's full span when a parameter
/// materializes; re-emitted as plain text when none does.
#[derive(Debug, Default)]
struct Pending {
    start: usize,
    text: String,
}

impl Pending {
    fn push(&mut self, pos: usize, c: char) {
        if self.text.is_empty() {
            self.start = pos;
        }
        self.text.push(c);
    }
}

/// Accumulator for a plain-text run.
#[derive(Debug, Default)]
struct Outside {
    /// Position of the first input character belonging to this run, set as
    /// soon as one is consumed (a pending escape counts).
    anchor: Option<usize>,
    text: String,
    escaped: bool,
}

/// Scanner mode.  Each variant carries only the data that mode needs.
#[derive(Debug)]
enum State {
    /// Accumulating a plain-text run.
    Outside(Outside),

    /// Consuming a tag name after a validated `@` starter.
    TagName { start: usize, name: String },

    /// After a complete, valid tag name: looking for what follows.
    /// `after_equals` is set once an explicit `=` has been seen, which
    /// narrows what may start the parameter.
    Search {
        tag: PendingTag,
        pending: Pending,
        after_equals: bool,
    },

    /// Consuming a typed parameter body.
    Param {
        tag: PendingTag,
        pending: Pending,
        warnings: Vec<Warning>,
        start: usize,
        lexer: ParamLexer,
    },
}

/// Per-kind parameter consumption state.
#[derive(Debug)]
enum ParamLexer {
    Integer {
        text: String,
    },
    Unquoted {
        text: String,
    },
    Quoted {
        quote: char,
        text: String,
        escaped: bool,
    },
    Json {
        open: char,
        close: char,
        depth: usize,
        in_literal: bool,
        escaped: bool,
    },
    Args {
        depth: usize,
        literal: Option<char>,
        escaped: bool,
        comment: bool,
        line: String,
    },
}

/// Outcome of one dispatch step.
enum Action {
    /// Consume the current character.
    Advance,
    /// Re-examine the current character under the new state.
    Reconsume,
}

struct Scanner {
    chars: Vec<char>,
    offset: usize,
    nested: bool,
    out: Vec<Segment>,
}

impl Scanner {
    fn new(input: &str, offset: usize) -> Self {
        Self {
            chars: input.chars().collect(),
            offset,
            nested: offset > 0,
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Segment> {
        let len = self.chars.len();
        let mut state = State::Outside(Outside::default());
        let mut pos = 0;
        while pos < len {
            let c = self.chars[pos];
            match self.step(&mut state, pos, c) {
                Action::Advance => pos += 1,
                Action::Reconsume => (),
            }
        }
        self.finish(state, len);
        self.out
    }

    fn prev(&self, pos: usize) -> Option<char> {
        pos.checked_sub(1).map(|i| self.chars[i])
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::new(start + self.offset, end + self.offset)
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..=end].iter().collect()
    }

    fn push_text(
        &mut self,
        span: Span,
        text: String,
        annotation: Option<String>,
        warnings: Vec<Warning>,
    ) {
        self.out.push(Segment::Text(TextSegment {
            span,
            text,
            annotation,
            warnings,
        }));
    }

    /// Flushes the current plain-text run, if any, ending at `end_pos - 1`.
    fn flush_outside(&mut self, outside: &mut Outside, end_pos: usize) {
        if !outside.text.is_empty() {
            let start = outside.anchor.take().unwrap();
            let text = std::mem::take(&mut outside.text);
            let span = self.span(start, end_pos - 1);
            self.push_text(span, text, None, Vec::new());
        } else {
            outside.anchor = None;
        }
    }

    /// Emits a tag segment.  `full_end` is the local position of the last
    /// codepoint belonging to the construct (the name's last character when
    /// there is no parameter).
    fn emit_tag(
        &mut self,
        tag: PendingTag,
        parameter: Option<Parameter>,
        warnings: Vec<Warning>,
        full_end: usize,
    ) {
        let full = self.slice(tag.start, full_end);
        self.out.push(Segment::Tag(TagSegment {
            span: self.span(tag.start, full_end),
            name: tag.name,
            name_span: self.span(tag.start, tag.end),
            full,
            parameter,
            warnings,
            conditional: None,
        }));
    }

    /// Emits a tag followed by an annotated text segment covering the
    /// pending text and the partial parameter.  This is the one case where
    /// a single failed construct produces two segments; warnings gathered
    /// while consuming the parameter move onto the text segment.
    fn emit_incomplete(
        &mut self,
        tag: PendingTag,
        pending: Pending,
        warnings: Vec<Warning>,
        param_start: usize,
        end: usize,
        annotation: String,
    ) {
        let name_end = tag.end;
        self.emit_tag(tag, None, Vec::new(), name_end);
        let start = if pending.text.is_empty() {
            param_start
        } else {
            pending.start
        };
        let text = pending.text + &self.slice(param_start, end);
        let span = self.span(start, end);
        self.push_text(span, text, Some(annotation), warnings);
    }

    fn step(&mut self, state: &mut State, pos: usize, c: char) -> Action {
        match state {
            State::Outside(_) => self.step_outside(state, pos, c),
            State::TagName { .. } => self.step_tag_name(state, pos, c),
            State::Search { .. } => self.step_search(state, pos, c),
            State::Param { .. } => self.step_param(state, pos, c),
        }
    }

    fn step_outside(&mut self, state: &mut State, pos: usize, c: char) -> Action {
        let State::Outside(outside) = state else {
            unreachable!()
        };
        match c {
            ESCAPE => {
                outside.anchor.get_or_insert(pos);
                if outside.escaped {
                    outside.text.push(ESCAPE);
                    outside.escaped = false;
                } else {
                    outside.escaped = true;
                }
                Action::Advance
            }
            TAG_START if outside.escaped => {
                // An escaped `@` never starts a tag; the pair is emitted
                // literally.
                outside.text.push(ESCAPE);
                outside.text.push(TAG_START);
                outside.escaped = false;
                Action::Advance
            }
            TAG_START => {
                let next_is_name = self
                    .chars
                    .get(pos + 1)
                    .copied()
                    .is_some_and(is_name_edge);
                let prev_allows = self.prev(pos).is_none_or(is_tag_space);
                if next_is_name && prev_allows {
                    self.flush_outside(outside, pos);
                    *state = State::TagName {
                        start: pos,
                        name: String::from(TAG_START),
                    };
                } else {
                    self.flush_outside(outside, pos);
                    let span = self.span(pos, pos);
                    self.push_text(
                        span,
                        TAG_START.to_string(),
                        Some("Did not qualify as Action Tag starter.".into()),
                        Vec::new(),
                    );
                }
                Action::Advance
            }
            _ => {
                outside.anchor.get_or_insert(pos);
                if outside.escaped {
                    outside.text.push(ESCAPE);
                    outside.escaped = false;
                }
                outside.text.push(c);
                Action::Advance
            }
        }
    }

    fn step_tag_name(&mut self, state: &mut State, pos: usize, c: char) -> Action {
        let State::TagName { start, name } = state else {
            unreachable!()
        };
        let start = *start;
        if is_name_terminator(c, self.nested) {
            // The name must also end with A-Z; a trailing `-` or `_` (or a
            // bare `@`, though the starter rule rules that out) downgrades
            // the candidate.
            let name = std::mem::take(name);
            if self.prev(pos).is_some_and(is_name_edge) {
                *state = State::Search {
                    tag: PendingTag {
                        name,
                        start,
                        end: pos - 1,
                    },
                    pending: Pending::default(),
                    after_equals: false,
                };
            } else {
                let span = self.span(start, pos - 1);
                self.push_text(
                    span,
                    name,
                    Some("Did not qualify as a valid Action Tag name.".into()),
                    Vec::new(),
                );
                *state = State::Outside(Outside::default());
            }
            Action::Reconsume
        } else if is_name_char(c) {
            name.push(c);
            Action::Advance
        } else {
            // The offending character is reconsumed as plain text so
            // that every input character stays covered.
            let name = std::mem::take(name);
            let span = self.span(start, pos - 1);
            self.push_text(
                span,
                name,
                Some("Did not qualify as a valid Action Tag name.".into()),
                Vec::new(),
            );
            *state = State::Outside(Outside::default());
            Action::Reconsume
        }
    }

    fn step_search(&mut self, state: &mut State, pos: usize, c: char) -> Action {
        let State::Search {
            tag,
            pending,
            after_equals,
        } = state
        else {
            unreachable!()
        };
        if *after_equals {
            // After `=`, only a quote, a JSON opener, or a digit selects a
            // specific kind; anything else (except whitespace) starts an
            // unquoted string.
            match c {
                '\'' | '"' => {
                    let tag = std::mem::take(tag);
                    let pending = std::mem::take(pending);
                    *state = State::Param {
                        tag,
                        pending,
                        warnings: Vec::new(),
                        start: pos,
                        lexer: ParamLexer::Quoted {
                            quote: c,
                            text: String::new(),
                            escaped: false,
                        },
                    };
                }
                '{' | '[' => {
                    let tag = std::mem::take(tag);
                    let pending = std::mem::take(pending);
                    *state = State::Param {
                        tag,
                        pending,
                        warnings: Vec::new(),
                        start: pos,
                        lexer: ParamLexer::Json {
                            open: c,
                            close: if c == '{' { '}' } else { ']' },
                            depth: 1,
                            in_literal: false,
                            escaped: false,
                        },
                    };
                }
                _ if is_tag_space(c) => pending.push(pos, c),
                _ if c.is_ascii_digit() => {
                    let tag = std::mem::take(tag);
                    let pending = std::mem::take(pending);
                    *state = State::Param {
                        tag,
                        pending,
                        warnings: Vec::new(),
                        start: pos,
                        lexer: ParamLexer::Integer { text: c.to_string() },
                    };
                }
                _ => {
                    let tag = std::mem::take(tag);
                    let pending = std::mem::take(pending);
                    *state = State::Param {
                        tag,
                        pending,
                        warnings: Vec::new(),
                        start: pos,
                        lexer: ParamLexer::Unquoted { text: c.to_string() },
                    };
                }
            }
            Action::Advance
        } else if is_tag_space(c) {
            pending.push(pos, c);
            Action::Advance
        } else if c == '=' {
            pending.push(pos, c);
            *after_equals = true;
            Action::Advance
        } else if c == '(' {
            let tag = std::mem::take(tag);
            let pending = std::mem::take(pending);
            *state = State::Param {
                tag,
                pending,
                warnings: Vec::new(),
                start: pos,
                lexer: ParamLexer::Args {
                    depth: 1,
                    literal: None,
                    escaped: false,
                    comment: false,
                    line: String::new(),
                },
            };
            Action::Advance
        } else {
            // No parameter follows.  Finalize the tag and hand the pending
            // text back to the outside run before re-examining this char.
            let tag = std::mem::take(tag);
            let pending = std::mem::take(pending);
            let name_end = tag.end;
            self.emit_tag(tag, None, Vec::new(), name_end);
            *state = State::Outside(Outside {
                anchor: (!pending.text.is_empty()).then_some(pending.start),
                text: pending.text,
                escaped: false,
            });
            Action::Reconsume
        }
    }

    fn step_param(&mut self, state: &mut State, pos: usize, c: char) -> Action {
        let State::Param {
            tag,
            pending,
            warnings,
            start,
            lexer,
        } = state
        else {
            unreachable!()
        };
        let param_start = *start;
        match lexer {
            ParamLexer::Integer { text } => {
                if is_tag_space(c) {
                    let tag = std::mem::take(tag);
                    let warnings = std::mem::take(warnings);
                    let parameter = Parameter::Integer {
                        span: self.span(param_start, pos - 1),
                        text: std::mem::take(text),
                    };
                    self.emit_tag(tag, Some(parameter), warnings, pos - 1);
                    *state = State::Outside(Outside::default());
                    Action::Reconsume
                } else if c.is_ascii_digit() {
                    text.push(c);
                    Action::Advance
                } else {
                    // Tolerate malformed numbers: keep what was consumed
                    // and continue as an unquoted string.
                    let mut text = std::mem::take(text);
                    text.push(c);
                    *lexer = ParamLexer::Unquoted { text };
                    Action::Advance
                }
            }
            ParamLexer::Unquoted { text } => {
                if is_tag_space(c) {
                    let tag = std::mem::take(tag);
                    let warnings = std::mem::take(warnings);
                    let parameter = Parameter::UnquotedString {
                        span: self.span(param_start, pos - 1),
                        text: std::mem::take(text),
                    };
                    self.emit_tag(tag, Some(parameter), warnings, pos - 1);
                    *state = State::Outside(Outside::default());
                    Action::Reconsume
                } else {
                    text.push(c);
                    Action::Advance
                }
            }
            ParamLexer::Quoted {
                quote,
                text,
                escaped,
            } => {
                let quote = *quote;
                if c == ESCAPE {
                    if *escaped {
                        text.push(ESCAPE);
                        *escaped = false;
                    } else {
                        *escaped = true;
                    }
                } else if c == quote {
                    if *escaped {
                        text.push(c);
                        *escaped = false;
                    } else {
                        let tag = std::mem::take(tag);
                        let warnings = std::mem::take(warnings);
                        let parameter = Parameter::QuotedString {
                            span: self.span(param_start, pos),
                            text: std::mem::take(text),
                            quote,
                        };
                        self.emit_tag(tag, Some(parameter), warnings, pos);
                        *state = State::Outside(Outside::default());
                    }
                } else {
                    // An escape before any other character has no effect,
                    // and the backslash is not part of the value.
                    *escaped = false;
                    text.push(c);
                }
                Action::Advance
            }
            ParamLexer::Json {
                open,
                close,
                depth,
                in_literal,
                escaped,
            } => {
                let (open, close) = (*open, *close);
                if c == ESCAPE {
                    if !*in_literal {
                        warnings.push(Warning::new(
                            self.span(pos, pos),
                            "Invalid JSON syntax: Escape character '\\' may only occur inside string literals.",
                        ));
                    } else if *escaped {
                        *escaped = false;
                    } else {
                        *escaped = true;
                    }
                    return Action::Advance;
                }
                if c == '"' {
                    if !*in_literal {
                        *in_literal = true;
                    } else if *escaped {
                        *escaped = false;
                    } else {
                        *in_literal = false;
                    }
                    return Action::Advance;
                }
                if *escaped {
                    *escaped = false;
                    if !is_json_escape(c) {
                        warnings.push(Warning::new(
                            self.span(pos - 1, pos),
                            "Invalid escape sequence. See https://json.org for a list of allowed escape sequences inside JSON strings.",
                        ));
                    }
                }
                match c {
                    '\'' => {
                        if !*in_literal {
                            warnings.push(Warning::new(
                                self.span(pos, pos),
                                "Invalid JSON syntax. Single quotes are only allowed inside strings. Did you mean to use a double quote?",
                            ));
                        }
                    }
                    _ if c == open => {
                        if !*in_literal {
                            *depth += 1;
                        }
                    }
                    _ if c == close => {
                        if !*in_literal {
                            *depth -= 1;
                            if *depth == 0 {
                                let text = self.slice(param_start, pos);
                                let (valid, error) =
                                    match serde_json::from_str::<serde_json::Value>(&text) {
                                        Ok(_) => (true, None),
                                        Err(error) => (false, Some(error.to_string())),
                                    };
                                let tag = std::mem::take(tag);
                                let warnings = std::mem::take(warnings);
                                let parameter = Parameter::Json {
                                    span: self.span(param_start, pos),
                                    text,
                                    valid,
                                    error,
                                };
                                self.emit_tag(tag, Some(parameter), warnings, pos);
                                *state = State::Outside(Outside::default());
                            }
                        }
                    }
                    _ => (),
                }
                Action::Advance
            }
            ParamLexer::Args {
                depth,
                literal,
                escaped,
                comment,
                line,
            } => {
                // A `#` or `//` that is the first non-whitespace content on
                // its line opens a comment that runs to the next newline.
                if c == '\n' {
                    line.clear();
                    *comment = false;
                } else {
                    line.push(c);
                }
                if literal.is_none()
                    && !*comment
                    && (c == '#' || (c == '/' && self.prev(pos) == Some('/')))
                {
                    let marker = if c == '#' { "#" } else { "//" };
                    if line.trim() == marker {
                        *comment = true;
                    }
                }
                match c {
                    ESCAPE => {
                        if literal.is_none() {
                            warnings.push(Warning::new(
                                self.span(pos, pos),
                                "Invalid parameter syntax: Escape character '\\' may only occur inside string literals.",
                            ));
                        } else if *escaped {
                            *escaped = false;
                        } else {
                            *escaped = true;
                        }
                    }
                    '"' | '\'' => {
                        if literal.is_none() {
                            *literal = Some(c);
                        } else if *literal == Some(c) {
                            if *escaped {
                                *escaped = false;
                            } else {
                                *literal = None;
                            }
                        } else {
                            *escaped = false;
                        }
                    }
                    '(' => {
                        *escaped = false;
                        if literal.is_none() && !*comment {
                            *depth += 1;
                        }
                    }
                    ')' => {
                        *escaped = false;
                        if literal.is_none() && !*comment {
                            *depth -= 1;
                            if *depth == 0 {
                                let body = if pos > param_start + 1 {
                                    self.slice(param_start + 1, pos - 1)
                                } else {
                                    String::new()
                                };
                                let tag = std::mem::take(tag);
                                let warnings = std::mem::take(warnings);
                                let parameter = Parameter::ArgumentList {
                                    span: self.span(param_start, pos),
                                    body,
                                };
                                self.emit_tag(tag, Some(parameter), warnings, pos);
                                *state = State::Outside(Outside::default());
                            }
                        }
                    }
                    _ => *escaped = false,
                }
                Action::Advance
            }
        }
    }

    /// Handles end of input for whatever state the scanner ended up in.
    /// `len` is the input length in codepoints.
    fn finish(&mut self, state: State, len: usize) {
        match state {
            State::Outside(mut outside) => {
                if outside.escaped {
                    // A trailing backslash is kept so that the run covers
                    // every input character.
                    outside.text.push(ESCAPE);
                }
                if !outside.text.is_empty() {
                    let start = outside.anchor.unwrap();
                    let span = self.span(start, len - 1);
                    self.push_text(span, outside.text, None, Vec::new());
                }
            }
            State::TagName { start, name } => {
                if self.prev(len).is_some_and(is_name_edge) {
                    let tag = PendingTag {
                        name,
                        start,
                        end: len - 1,
                    };
                    self.emit_tag(tag, None, Vec::new(), len - 1);
                } else {
                    let span = self.span(start, len - 1);
                    self.push_text(
                        span,
                        name,
                        Some("Did not qualify as a valid Action Tag name.".into()),
                        Vec::new(),
                    );
                }
            }
            State::Search { tag, pending, .. } => {
                // End of input while looking for a parameter: the tag has
                // none, and whatever was buffered is plain text again.
                let name_end = tag.end;
                self.emit_tag(tag, None, Vec::new(), name_end);
                if !pending.text.is_empty() {
                    let span = self.span(pending.start, len - 1);
                    self.push_text(span, pending.text, None, Vec::new());
                }
            }
            State::Param {
                tag,
                pending,
                warnings,
                start,
                lexer,
            } => match lexer {
                ParamLexer::Integer { text } => {
                    let parameter = Parameter::Integer {
                        span: self.span(start, len - 1),
                        text,
                    };
                    self.emit_tag(tag, Some(parameter), warnings, len - 1);
                }
                ParamLexer::Unquoted { text } => {
                    let parameter = Parameter::UnquotedString {
                        span: self.span(start, len - 1),
                        text,
                    };
                    self.emit_tag(tag, Some(parameter), warnings, len - 1);
                }
                ParamLexer::Quoted { quote, .. } => {
                    self.emit_incomplete(
                        tag,
                        pending,
                        warnings,
                        start,
                        len - 1,
                        format!("Incomplete potential parameter. Missing end quote [{quote}]."),
                    );
                }
                ParamLexer::Json { .. } => {
                    self.emit_incomplete(
                        tag,
                        pending,
                        warnings,
                        start,
                        len - 1,
                        "Incomplete or broken potential JSON parameter.".into(),
                    );
                }
                ParamLexer::Args { .. } => {
                    self.emit_incomplete(
                        tag,
                        pending,
                        warnings,
                        start,
                        len - 1,
                        "Incomplete potential argument-style parameter (inside parentheses).".into(),
                    );
                }
            },
        }
    }
}
