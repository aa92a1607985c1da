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

//! Static metadata for the known action tags.
//!
//! The scanner recognizes any well-formed `@NAME`; this registry records,
//! for each tag the system actually defines, which parameter kinds it
//! accepts, where it applies, and a few auxiliary validation facts.  The
//! scanner never consults it.  Validation and UI layers look tags up here
//! after parsing.

use serde::Serialize;

use crate::parse::ParameterKind;

/// Where a tag takes effect.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    MobileApp,
    Survey,
    DataEntry,
    Calc,
    Import,
    Pdf,
}

/// Field types a tag may be attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Calc,
    Checkbox,
    Descriptive,
    File,
    Radio,
    Select,
    Slider,
    Sql,
    Text,
    Textarea,
    Truefalse,
    Yesno,
}

/// One registry entry.
#[derive(Clone, Debug, Serialize)]
pub struct TagInfo {
    pub name: &'static str,
    /// Parameter kinds the tag accepts.  [ParameterKind::None] means the
    /// tag may appear bare.
    pub params: &'static [ParameterKind],
    pub scopes: &'static [Scope],
    pub field_types: &'static [FieldType],
    /// Whether the parameter value supports piping.  Unset when nothing
    /// is known either way.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_piping: Option<bool>,
    /// Maximum number of occurrences allowed per form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_per_form: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    /// Tag that replaces a deprecated one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equivalent_to: Option<&'static str>,
    /// Tags this tag must not be combined with on the same field.
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub not_together_with: &'static [&'static str],
    /// Tags inside whose branches this tag should raise a warning.
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub warn_when_inside: &'static [&'static str],
    /// Restriction on what the argument list may reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_limit: Option<&'static str>,
}

impl TagInfo {
    const fn new(
        name: &'static str,
        params: &'static [ParameterKind],
        scopes: &'static [Scope],
        field_types: &'static [FieldType],
    ) -> Self {
        Self {
            name,
            params,
            scopes,
            field_types,
            supports_piping: None,
            max_per_form: None,
            deprecated: false,
            equivalent_to: None,
            not_together_with: &[],
            warn_when_inside: &[],
            args_limit: None,
        }
    }

    const fn piping(mut self, supported: bool) -> Self {
        self.supports_piping = Some(supported);
        self
    }

    const fn max_per_form(mut self, max: u32) -> Self {
        self.max_per_form = Some(max);
        self
    }

    const fn deprecated_for(mut self, replacement: &'static str) -> Self {
        self.deprecated = true;
        self.equivalent_to = Some(replacement);
        self
    }

    const fn not_together_with(mut self, tags: &'static [&'static str]) -> Self {
        self.not_together_with = tags;
        self
    }

    const fn warn_when_inside(mut self, tags: &'static [&'static str]) -> Self {
        self.warn_when_inside = tags;
        self
    }

    const fn args_limit(mut self, limit: &'static str) -> Self {
        self.args_limit = Some(limit);
        self
    }
}

use FieldType::*;
use ParameterKind::{ArgumentList, Integer, None as NoParam, QuotedString, UnquotedString};
use Scope::*;

const ANY_FIELD: &[FieldType] = &[
    FieldType::Calc, Checkbox, Descriptive, File, Radio, Select, Slider, Sql, Text, Textarea, Truefalse,
    Yesno,
];
const VALUE_FIELDS: &[FieldType] = &[
    Checkbox, Radio, Select, Slider, Sql, Text, Textarea, Truefalse, Yesno,
];
const INPUT_FIELDS: &[FieldType] = &[
    Checkbox, File, Radio, Select, Slider, Sql, Text, Textarea, Truefalse, Yesno,
];
const ENTRY_SCOPES: &[Scope] = &[MobileApp, Survey, DataEntry];
const CALC_SCOPES: &[Scope] = &[MobileApp, Survey, DataEntry, Scope::Calc, Import];

/// The known tags, sorted by name for binary search.
pub const TAG_INFO: &[TagInfo] = &[
    TagInfo::new("@APPUSERNAME-APP", &[NoParam], &[MobileApp], &[Text, Textarea]),
    TagInfo::new("@BARCODE-APP", &[NoParam], &[MobileApp], &[Text, Textarea]),
    TagInfo::new("@CALCDATE", &[ArgumentList], CALC_SCOPES, &[Text, Textarea])
        .warn_when_inside(&["@IF"]),
    TagInfo::new("@CALCTEXT", &[ArgumentList], CALC_SCOPES, &[Text, Textarea])
        .warn_when_inside(&["@IF"]),
    TagInfo::new("@CHARLIMIT", &[Integer, QuotedString], ENTRY_SCOPES, &[Text, Textarea])
        .piping(false),
    TagInfo::new("@DEFAULT", &[QuotedString], ENTRY_SCOPES, &[Text, Textarea]).piping(true),
    TagInfo::new("@DOWNLOAD-COUNT", &[ArgumentList], &[Survey, DataEntry], &[Text, Textarea])
        .args_limit("same-scope-field"),
    TagInfo::new("@FORCE-MINMAX", &[NoParam], &[Survey, DataEntry, Import], &[Text]),
    TagInfo::new("@HIDDEN", &[NoParam], ENTRY_SCOPES, ANY_FIELD),
    TagInfo::new("@HIDDEN-APP", &[NoParam], &[MobileApp], ANY_FIELD),
    TagInfo::new("@HIDDEN-FORM", &[NoParam], &[DataEntry], ANY_FIELD),
    TagInfo::new("@HIDDEN-PDF", &[NoParam], &[Pdf], ANY_FIELD),
    TagInfo::new("@HIDDEN-SURVEY", &[NoParam], &[Survey], ANY_FIELD),
    TagInfo::new("@HIDEBUTTON", &[NoParam], &[Survey, DataEntry], &[Text]),
    TagInfo::new(
        "@HIDECHOICE",
        &[QuotedString],
        &[Survey, DataEntry],
        &[Checkbox, Radio, Select, Truefalse, Yesno],
    ),
    TagInfo::new("@IF", &[ArgumentList], ENTRY_SCOPES, ANY_FIELD),
    TagInfo::new("@INLINE", &[NoParam, ArgumentList], ENTRY_SCOPES, &[File]),
    TagInfo::new("@LANGUAGE-CURRENT-FORM", &[NoParam], &[DataEntry], &[Radio, Select, Text]),
    TagInfo::new("@LANGUAGE-CURRENT-SURVEY", &[NoParam], &[Survey], &[Radio, Select, Text]),
    TagInfo::new("@LANGUAGE-FORCE", &[QuotedString], &[Survey, DataEntry], ANY_FIELD)
        .max_per_form(1),
    TagInfo::new("@LANGUAGE-FORCE-FORM", &[QuotedString], &[DataEntry], ANY_FIELD)
        .max_per_form(1),
    TagInfo::new("@LANGUAGE-FORCE-SURVEY", &[QuotedString], &[Survey], ANY_FIELD)
        .max_per_form(1),
    TagInfo::new("@LANGUAGE-SET", &[NoParam], &[Survey, DataEntry], &[Radio, Select]),
    TagInfo::new("@LATITUDE", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new("@LONGITUDE", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new("@MAXCHECKED", &[Integer, QuotedString], ENTRY_SCOPES, &[Checkbox]),
    TagInfo::new("@MAXCHOICE", &[ArgumentList], ENTRY_SCOPES, &[Checkbox, Radio, Select]),
    TagInfo::new(
        "@MAXCHOICE-SURVEY-COMPLETE",
        &[ArgumentList],
        &[Survey],
        &[Checkbox, Radio, Select],
    ),
    TagInfo::new("@NOMISSING", &[NoParam], ENTRY_SCOPES, INPUT_FIELDS),
    TagInfo::new(
        "@NONEOFTHEABOVE",
        &[Integer, QuotedString, UnquotedString],
        ENTRY_SCOPES,
        &[Checkbox],
    ),
    TagInfo::new("@NOW", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new("@NOW-SERVER", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new("@NOW-UTC", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new("@PASSWORDMASK", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new("@PLACEHOLDER", &[QuotedString], ENTRY_SCOPES, &[Text, Textarea]).piping(true),
    TagInfo::new("@PREFILL", &[QuotedString], ENTRY_SCOPES, VALUE_FIELDS)
        .deprecated_for("@SETVALUE"),
    TagInfo::new(
        "@RANDOMORDER",
        &[NoParam],
        ENTRY_SCOPES,
        &[Checkbox, Radio, Select, Truefalse, Yesno],
    ),
    TagInfo::new("@READONLY", &[NoParam], ENTRY_SCOPES, INPUT_FIELDS),
    TagInfo::new("@READONLY-APP", &[NoParam], &[MobileApp], INPUT_FIELDS),
    TagInfo::new("@READONLY-FORM", &[NoParam], &[DataEntry], INPUT_FIELDS),
    TagInfo::new("@READONLY-SURVEY", &[NoParam], &[Survey], INPUT_FIELDS),
    TagInfo::new("@RICHTEXT", &[NoParam], &[Survey, DataEntry], &[Textarea]),
    TagInfo::new("@SETVALUE", &[QuotedString], ENTRY_SCOPES, VALUE_FIELDS),
    TagInfo::new("@SYNC-APP", &[NoParam], &[MobileApp], &[File]),
    TagInfo::new("@TODAY", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new("@TODAY-SERVER", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new("@TODAY-UTC", &[NoParam], ENTRY_SCOPES, &[Text]),
    TagInfo::new(
        "@USERNAME",
        &[NoParam],
        ENTRY_SCOPES,
        &[Radio, Select, Sql, Text, Textarea],
    ),
    TagInfo::new("@WORDLIMIT", &[Integer, QuotedString], ENTRY_SCOPES, &[Text, Textarea])
        .piping(false)
        .not_together_with(&["@CHARLIMIT"]),
];

/// Looks up a tag by its full name, leading `@` included.
pub fn tag_info(name: &str) -> Option<&'static TagInfo> {
    TAG_INFO
        .binary_search_by(|info| info.name.cmp(name))
        .ok()
        .map(|index| &TAG_INFO[index])
}

#[cfg(test)]
mod tests {
    use super::{FieldType, Scope, TAG_INFO, tag_info};
    use crate::parse::ParameterKind;

    #[test]
    fn table_is_sorted() {
        for pair in TAG_INFO.windows(2) {
            assert!(
                pair[0].name < pair[1].name,
                "{} must sort before {}",
                pair[0].name,
                pair[1].name
            );
        }
    }

    #[test]
    fn lookup() {
        let info = tag_info("@HIDDEN").unwrap();
        assert_eq!(info.params, &[ParameterKind::None]);
        assert!(info.scopes.contains(&Scope::Survey));
        assert!(tag_info("@NOSUCHTAG").is_none());
        assert!(tag_info("HIDDEN").is_none());
    }

    #[test]
    fn auxiliary_facts() {
        let prefill = tag_info("@PREFILL").unwrap();
        assert!(prefill.deprecated);
        assert_eq!(prefill.equivalent_to, Some("@SETVALUE"));

        let wordlimit = tag_info("@WORDLIMIT").unwrap();
        assert_eq!(wordlimit.not_together_with, &["@CHARLIMIT"]);
        assert_eq!(wordlimit.supports_piping, Some(false));

        let force = tag_info("@LANGUAGE-FORCE").unwrap();
        assert_eq!(force.max_per_form, Some(1));

        let calcdate = tag_info("@CALCDATE").unwrap();
        assert_eq!(calcdate.warn_when_inside, &["@IF"]);

        let download = tag_info("@DOWNLOAD-COUNT").unwrap();
        assert_eq!(download.args_limit, Some("same-scope-field"));

        let inline = tag_info("@INLINE").unwrap();
        assert_eq!(
            inline.params,
            &[ParameterKind::None, ParameterKind::ArgumentList]
        );
    }

    #[test]
    fn field_type_lists() {
        let hidden = tag_info("@HIDDEN").unwrap();
        assert_eq!(hidden.field_types.len(), 12);
        assert!(hidden.field_types.contains(&FieldType::Descriptive));

        let readonly = tag_info("@READONLY").unwrap();
        assert!(!readonly.field_types.contains(&FieldType::Descriptive));
        assert!(!readonly.field_types.contains(&FieldType::Calc));
    }
}
