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

//! Collecting action tags across a set of fields.
//!
//! [TagCollector] runs the scanner over every field's annotation text and
//! aggregates the tags it finds into a map keyed by tag name, optionally
//! filtered by tag or field name and optionally with conditional tags
//! resolved against a [ResolveContext].  Condition evaluation itself is
//! external: callers supply a [ConditionEvaluator] and the collector only
//! decides which branch's tags to keep.
//!
//! Collection results are memoized in a [TagCache] owned by the collector,
//! keyed by the complete argument set of the call.  The cache can be
//! disabled or cleared at any time; a disabled cache never changes results,
//! only cost.

use indexmap::IndexMap;
use thiserror::Error as ThisError;

use crate::parse::{self, Segment, TagSegment};

/// Ordered mapping from field name to its annotation text.
pub type FieldSource = IndexMap<String, String>;

/// Collection result: tag name to its occurrences, in discovery order.
pub type TagMap = IndexMap<String, Vec<Occurrence>>;

/// Collection result regrouped per field.
pub type FieldTagMap = IndexMap<String, TagMap>;

/// One use of a tag on some field.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Occurrence {
    /// Monotonic counter across the whole collection run.
    pub id: usize,
    pub field: String,
    /// The parameter's text value, or the empty string for a bare tag.
    pub params: String,
    /// Id of the enclosing conditional tag's occurrence, for a tag found
    /// inside a conditional branch.  Always absent when branches were
    /// resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested: Option<usize>,
}

/// Restricts a collection run to certain tags and/or fields.  Empty lists
/// do not restrict.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TagFilter {
    pub tags: Vec<String>,
    pub fields: Vec<String>,
}

impl TagFilter {
    pub fn tags<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn fields<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    fn accepts_tag(&self, name: &str) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|tag| tag == name)
    }
}

/// Identifies where in the data-collection workflow a collection happens.
/// `project_id` is always required; the other coordinates are optional and
/// only their joint presence (see [ResolveContext::is_full]) enables
/// conditional resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResolveContext {
    pub project_id: u64,
    pub record: Option<String>,
    pub event_id: Option<u64>,
    pub instrument: Option<String>,
    pub instance: u64,
}

impl ResolveContext {
    pub fn new(project_id: u64) -> Self {
        Self {
            project_id,
            instance: 1,
            ..Self::default()
        }
    }

    /// Whether record, event, and instrument are all present, which is
    /// what conditional resolution requires.
    pub fn is_full(&self) -> bool {
        self.record.as_deref().is_some_and(|record| !record.is_empty())
            && self.event_id.is_some_and(|event_id| event_id != 0)
            && self
                .instrument
                .as_deref()
                .is_some_and(|instrument| !instrument.is_empty())
    }
}

/// Decides the truth value of a conditional tag's condition expression.
/// Implemented by the hosting application; the collector never interprets
/// condition text itself.
pub trait ConditionEvaluator {
    fn evaluate(&self, condition: &str, context: &ResolveContext) -> bool;
}

/// Errors from a collection run.  These indicate caller mistakes, not
/// problems with the annotation text (which never fails to parse).
#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum TagError {
    #[error("Invalid context: a project_id of at least 1 must be provided.")]
    MissingProject,

    #[error("Field `{0}` was not found in the provided metadata.")]
    UnknownField(String),
}

/// Everything that determines a collection result, in hashable form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    fields: Vec<(String, String)>,
    filter: Option<TagFilter>,
    context: ResolveContext,
    resolve: bool,
}

/// Memoization of collection results.
#[derive(Debug, Default)]
pub struct TagCache {
    disabled: bool,
    entries: hashbrown::HashMap<CacheKey, TagMap>,
}

impl TagCache {
    fn get(&self, key: &CacheKey) -> Option<&TagMap> {
        if self.disabled {
            None
        } else {
            self.entries.get(key)
        }
    }

    fn insert(&mut self, key: CacheKey, value: TagMap) {
        if !self.disabled {
            self.entries.insert(key, value);
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.disabled = !enabled;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Aggregates tags over a [FieldSource].
pub struct TagCollector<'a> {
    evaluator: Option<&'a dyn ConditionEvaluator>,
    cache: TagCache,
}

impl<'a> TagCollector<'a> {
    pub fn new() -> Self {
        Self {
            evaluator: None,
            cache: TagCache::default(),
        }
    }

    /// Supplies the evaluator that enables conditional resolution under a
    /// full context.
    pub fn with_evaluator(evaluator: &'a dyn ConditionEvaluator) -> Self {
        Self {
            evaluator: Some(evaluator),
            cache: TagCache::default(),
        }
    }

    pub fn cache_mut(&mut self) -> &mut TagCache {
        &mut self.cache
    }

    /// Collects all tags from `fields`, subject to `filter`, under
    /// `context`.
    ///
    /// When the context is full and an evaluator is present, conditional
    /// tags in each field are resolved: only the tags of the branch the
    /// evaluator selects are kept, flattened to the top level.  Otherwise
    /// both branches are walked and nested tags carry their enclosing
    /// occurrence's id.
    pub fn collect(
        &mut self,
        fields: &FieldSource,
        filter: Option<&TagFilter>,
        context: &ResolveContext,
    ) -> Result<TagMap, TagError> {
        if context.project_id < 1 {
            return Err(TagError::MissingProject);
        }

        // Honor the field filter's own order; every filtered name must
        // exist in the source.
        let selected: Vec<(&String, &String)> = match filter {
            Some(filter) if !filter.fields.is_empty() => filter
                .fields
                .iter()
                .map(|name| {
                    fields
                        .get_key_value(name)
                        .ok_or_else(|| TagError::UnknownField(name.clone()))
                })
                .collect::<Result<_, _>>()?,
            _ => fields.iter().collect(),
        };

        let resolve = context.is_full() && self.evaluator.is_some();
        let key = CacheKey {
            fields: selected
                .iter()
                .map(|(name, text)| ((*name).clone(), (*text).clone()))
                .collect(),
            filter: filter.cloned(),
            context: context.clone(),
            resolve,
        };
        if let Some(cached) = self.cache.get(&key) {
            log::debug!("tag collection cache hit ({} fields)", key.fields.len());
            return Ok(cached.clone());
        }
        log::debug!("tag collection cache miss ({} fields)", key.fields.len());

        let empty_filter = TagFilter::default();
        let filter = filter.unwrap_or(&empty_filter);
        let mut result = TagMap::new();
        let mut next_id = 0;
        for (field, text) in selected {
            // Fields that cannot contain a tag are not worth parsing.
            if !text.contains('@') {
                continue;
            }
            let segments = parse::parse(text);
            match self.evaluator {
                Some(evaluator) if resolve && text.contains(parse::IF_TAG) => {
                    walk_resolved(
                        &segments, field, filter, context, evaluator, &mut result, &mut next_id,
                    );
                }
                _ => walk(&segments, field, filter, None, &mut result, &mut next_id),
            }
        }

        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// Like [TagCollector::collect], but grouped by field first.
    pub fn collect_by_field(
        &mut self,
        fields: &FieldSource,
        filter: Option<&TagFilter>,
        context: &ResolveContext,
    ) -> Result<FieldTagMap, TagError> {
        let flat = self.collect(fields, filter, context)?;
        let mut by_field = FieldTagMap::new();
        for (tag, occurrences) in flat {
            for occurrence in occurrences {
                by_field
                    .entry(occurrence.field.clone())
                    .or_default()
                    .entry(tag.clone())
                    .or_default()
                    .push(occurrence);
            }
        }
        Ok(by_field)
    }
}

impl Default for TagCollector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn record_occurrence(
    tag: &TagSegment,
    field: &str,
    nested: Option<usize>,
    result: &mut TagMap,
    next_id: &mut usize,
) -> usize {
    let id = *next_id;
    *next_id += 1;
    result.entry(tag.name.clone()).or_default().push(Occurrence {
        id,
        field: field.to_string(),
        params: tag
            .parameter
            .as_ref()
            .map_or_else(String::new, |parameter| parameter.value().to_string()),
        nested,
    });
    id
}

/// Pre-order walk recording every tag, branches included.  A tag the
/// filter rejects is skipped along with its whole conditional subtree.
fn walk(
    segments: &[Segment],
    field: &str,
    filter: &TagFilter,
    nested: Option<usize>,
    result: &mut TagMap,
    next_id: &mut usize,
) {
    for segment in segments {
        let Segment::Tag(tag) = segment else { continue };
        if !filter.accepts_tag(&tag.name) {
            continue;
        }
        let id = record_occurrence(tag, field, nested, result, next_id);
        if let Some(conditional) = &tag.conditional {
            walk(&conditional.then_segments, field, filter, Some(id), result, next_id);
            walk(&conditional.else_segments, field, filter, Some(id), result, next_id);
        }
    }
}

/// Walk with conditional resolution: a conditional tag itself is not
/// recorded; the branch the evaluator picks is walked in its place, so
/// every recorded tag ends up at the top level.
fn walk_resolved(
    segments: &[Segment],
    field: &str,
    filter: &TagFilter,
    context: &ResolveContext,
    evaluator: &dyn ConditionEvaluator,
    result: &mut TagMap,
    next_id: &mut usize,
) {
    for segment in segments {
        let Segment::Tag(tag) = segment else { continue };
        if let Some(conditional) = &tag.conditional {
            let branch = if evaluator.evaluate(&conditional.condition, context) {
                &conditional.then_segments
            } else {
                &conditional.else_segments
            };
            walk_resolved(branch, field, filter, context, evaluator, result, next_id);
        } else {
            if !filter.accepts_tag(&tag.name) {
                continue;
            }
            record_occurrence(tag, field, None, result, next_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> FieldSource {
        pairs
            .iter()
            .map(|&(field, text)| (field.to_string(), text.to_string()))
            .collect()
    }

    fn occurrences<'m>(map: &'m TagMap, tag: &str) -> &'m [Occurrence] {
        map.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    struct FixedEvaluator(bool);

    impl ConditionEvaluator for FixedEvaluator {
        fn evaluate(&self, _condition: &str, _context: &ResolveContext) -> bool {
            self.0
        }
    }

    fn full_context() -> ResolveContext {
        ResolveContext {
            project_id: 42,
            record: Some("1".into()),
            event_id: Some(1001),
            instrument: Some("form_1".into()),
            instance: 1,
        }
    }

    #[test]
    fn collects_across_fields_with_monotonic_ids() {
        let fields = source(&[
            ("age", "@HIDDEN @DEFAULT=\"18\""),
            ("name", "no tags here"),
            ("note", "@HIDDEN-SURVEY"),
        ]);
        let mut collector = TagCollector::new();
        let map = collector
            .collect(&fields, None, &ResolveContext::new(1))
            .unwrap();

        assert_eq!(map.len(), 3);
        let hidden = occurrences(&map, "@HIDDEN");
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].id, 0);
        assert_eq!(hidden[0].field, "age");
        assert_eq!(hidden[0].params, "");
        assert_eq!(occurrences(&map, "@DEFAULT")[0].params, "18");
        assert_eq!(occurrences(&map, "@DEFAULT")[0].id, 1);
        assert_eq!(occurrences(&map, "@HIDDEN-SURVEY")[0].id, 2);
    }

    #[test]
    fn project_id_required() {
        let fields = source(&[("f", "@HIDDEN")]);
        let mut collector = TagCollector::new();
        assert_eq!(
            collector.collect(&fields, None, &ResolveContext::default()),
            Err(TagError::MissingProject)
        );
    }

    #[test]
    fn unknown_field_in_filter_is_an_error() {
        let fields = source(&[("f", "@HIDDEN")]);
        let filter = TagFilter::fields(["f", "missing"]);
        let mut collector = TagCollector::new();
        assert_eq!(
            collector.collect(&fields, Some(&filter), &ResolveContext::new(1)),
            Err(TagError::UnknownField("missing".into()))
        );
    }

    #[test]
    fn field_filter_preserves_filter_order() {
        let fields = source(&[("a", "@HIDDEN"), ("b", "@READONLY")]);
        let filter = TagFilter::fields(["b", "a"]);
        let mut collector = TagCollector::new();
        let map = collector
            .collect(&fields, Some(&filter), &ResolveContext::new(1))
            .unwrap();
        assert_eq!(occurrences(&map, "@READONLY")[0].id, 0);
        assert_eq!(occurrences(&map, "@HIDDEN")[0].id, 1);
    }

    #[test]
    fn tag_filter_skips_conditional_subtree() {
        let fields = source(&[("f", "@IF([x]=1, @HIDDEN, @READONLY) @HIDDEN")]);
        let filter = TagFilter::tags(["@HIDDEN"]);
        let mut collector = TagCollector::new();
        let map = collector
            .collect(&fields, Some(&filter), &ResolveContext::new(1))
            .unwrap();
        // The @IF itself is rejected by the filter, so the @HIDDEN inside
        // its branch is never visited; only the trailing one remains.
        let hidden = occurrences(&map, "@HIDDEN");
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].nested, None);
    }

    #[test]
    fn nested_ids_without_resolution() {
        let fields = source(&[("f", "@IF([x]=1, @HIDDEN, @READONLY)")]);
        let mut collector = TagCollector::new();
        let map = collector
            .collect(&fields, None, &ResolveContext::new(1))
            .unwrap();
        let if_id = occurrences(&map, "@IF")[0].id;
        assert_eq!(occurrences(&map, "@IF")[0].params, "[x]=1, @HIDDEN, @READONLY");
        assert_eq!(occurrences(&map, "@HIDDEN")[0].nested, Some(if_id));
        assert_eq!(occurrences(&map, "@READONLY")[0].nested, Some(if_id));
    }

    #[test]
    fn full_context_resolves_conditionals() {
        let fields = source(&[("f", "@IF([x]=1, @HIDDEN, @READONLY)")]);
        let evaluator = FixedEvaluator(true);
        let mut collector = TagCollector::with_evaluator(&evaluator);
        let map = collector.collect(&fields, None, &full_context()).unwrap();
        assert!(map.get("@IF").is_none());
        assert!(map.get("@READONLY").is_none());
        let hidden = occurrences(&map, "@HIDDEN");
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].nested, None);

        let evaluator = FixedEvaluator(false);
        let mut collector = TagCollector::with_evaluator(&evaluator);
        let map = collector.collect(&fields, None, &full_context()).unwrap();
        assert!(map.get("@HIDDEN").is_none());
        assert_eq!(occurrences(&map, "@READONLY").len(), 1);
    }

    #[test]
    fn partial_context_keeps_both_branches() {
        let fields = source(&[("f", "@IF([x]=1, @HIDDEN, @READONLY)")]);
        let evaluator = FixedEvaluator(true);
        let mut collector = TagCollector::with_evaluator(&evaluator);
        // No record/event/instrument, so no resolution despite the
        // evaluator being available.
        let map = collector
            .collect(&fields, None, &ResolveContext::new(1))
            .unwrap();
        assert_eq!(occurrences(&map, "@IF").len(), 1);
        assert_eq!(occurrences(&map, "@HIDDEN").len(), 1);
        assert_eq!(occurrences(&map, "@READONLY").len(), 1);
    }

    #[test]
    fn cache_disabled_gives_same_result() {
        let fields = source(&[("a", "@HIDDEN @SETVALUE=\"x\""), ("b", "@IF(1, @NOW, @TODAY)")]);
        let mut cached = TagCollector::new();
        let mut uncached = TagCollector::new();
        uncached.cache_mut().set_enabled(false);
        let context = ResolveContext::new(7);
        let first = cached.collect(&fields, None, &context).unwrap();
        let second = cached.collect(&fields, None, &context).unwrap();
        let third = uncached.collect(&fields, None, &context).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(cached.cache_mut().len(), 1);
        assert!(uncached.cache_mut().is_empty());
    }

    #[test]
    fn cache_distinguishes_arguments() {
        let fields = source(&[("a", "@HIDDEN @READONLY")]);
        let mut collector = TagCollector::new();
        let context = ResolveContext::new(7);
        collector.collect(&fields, None, &context).unwrap();
        let filter = TagFilter::tags(["@HIDDEN"]);
        let filtered = collector
            .collect(&fields, Some(&filter), &context)
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(collector.cache_mut().len(), 2);
        collector.cache_mut().clear();
        assert!(collector.cache_mut().is_empty());
    }

    #[test]
    fn by_field_regroups() {
        let fields = source(&[("a", "@HIDDEN @READONLY"), ("b", "@HIDDEN")]);
        let mut collector = TagCollector::new();
        let map = collector
            .collect_by_field(&fields, None, &ResolveContext::new(1))
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"].len(), 2);
        assert_eq!(map["a"]["@HIDDEN"][0].field, "a");
        assert_eq!(map["b"]["@HIDDEN"][0].field, "b");
    }
}
