//! The compiled matcher and its query surface.
//!
//! [`Extractor`] owns the product automaton plus one compiled regex per
//! extraction. A query is one automaton pass (candidate selection) and one
//! regex confirmation (capture recovery). The automaton and regex sources are
//! compiled from the same flattened piece tree, so a candidate the automaton
//! accepts should always regex-match; [`Extractor::extract`] treats a
//! disagreement as an internal fault, [`Extractor::extract_safe`] falls back
//! to the next candidate instead.

use serde_json::Value;

use crate::autom::PolyMatcher;
use crate::debug_enabled;
use crate::error::ExtractionError;
use crate::model::JsonMap;

/// One extraction, fully compiled.
#[derive(Debug)]
pub(crate) struct CookedExtraction {
    pub(crate) name: String,
    pub(crate) append: Option<JsonMap>,
    pub(crate) regex: regex::Regex,
    pub(crate) regex_source: String,
    pub(crate) automaton_source: String,
    pub(crate) extractor_names: Vec<String>,
}

/// The compiled matcher. Immutable; safe for unsynchronized concurrent use.
#[derive(Debug)]
pub struct Extractor {
    matcher: PolyMatcher,
    extractions: Vec<CookedExtraction>,
}

impl Extractor {
    pub(crate) fn new(matcher: PolyMatcher, extractions: Vec<CookedExtraction>) -> Self {
        Extractor { matcher, extractions }
    }

    /// Number of compiled extraction rules.
    pub fn extraction_count(&self) -> usize {
        self.extractions.len()
    }

    /// Matches `input` against all rules. `Ok(None)` means no rule matched;
    /// `Err` means the automaton accepted a candidate whose compiled regex
    /// then failed, which is an internal inconsistency, not an input problem.
    pub fn extract(&self, input: &str) -> Result<Option<ExtractionResult<'_>>, ExtractionError> {
        let candidates = self.matcher.matches(input);
        let Some(&first) = candidates.first() else {
            return Ok(None);
        };
        match self.try_candidate(first, input) {
            Some(result) => Ok(Some(result)),
            None => {
                let extraction = &self.extractions[first];
                Err(ExtractionError {
                    input: input.to_string(),
                    message: format!(
                        "Internal error: high-level match for extraction #{first} ({}) failed to match generated regexp: {}",
                        extraction.name, extraction.regex_source
                    ),
                })
            }
        }
    }

    /// Like [`extract`](Self::extract), but on a regex mismatch tries the
    /// remaining candidates in priority order instead of failing. Degradation
    /// is logged when `GLEANER_DEBUG` is set; exhausting all candidates is a
    /// plain non-match.
    pub fn extract_safe(&self, input: &str) -> Option<ExtractionResult<'_>> {
        let candidates = self.matcher.matches(input);
        for (rank, &ix) in candidates.iter().enumerate() {
            if let Some(result) = self.try_candidate(ix, input) {
                if rank > 0 && debug_enabled() {
                    eprintln!(
                        "[gleaner] degraded match for input {input:?}: candidate #{ix} ({}) confirmed after {rank} rejection(s)",
                        self.extractions[ix].name
                    );
                }
                return Some(result);
            }
            if debug_enabled() {
                eprintln!(
                    "[gleaner] candidate #{ix} ({}) accepted by automaton but rejected by regexp for input {input:?}",
                    self.extractions[ix].name
                );
            }
        }
        None
    }

    fn try_candidate(&self, ix: usize, input: &str) -> Option<ExtractionResult<'_>> {
        let extraction = &self.extractions[ix];
        let caps = extraction.regex.captures(input)?;
        let values = (1..=extraction.extractor_names.len())
            .map(|group| caps.get(group).map(|m| m.as_str().to_string()))
            .collect();
        Some(ExtractionResult { extraction, input: input.to_string(), values })
    }
}

/// One successful match: which rule, against what input, with what captures.
#[derive(Debug)]
pub struct ExtractionResult<'e> {
    extraction: &'e CookedExtraction,
    input: String,
    /// Capture values in extractor declaration order; `None` for groups that
    /// did not participate in the match.
    values: Vec<Option<String>>,
}

impl ExtractionResult<'_> {
    /// Name of the matched extraction rule.
    pub fn id(&self) -> &str {
        &self.extraction.name
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// The rule's static `append` metadata, if any.
    pub fn append(&self) -> Option<&serde_json::Map<String, Value>> {
        self.extraction.append.as_ref()
    }

    /// Extractor names paired with their captured values, declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.extraction
            .extractor_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_deref))
    }

    /// Builds the insertion-ordered result map: the rule id first (under
    /// `id_key`, when given), then extractor values in declaration order,
    /// then the static append entries.
    pub fn as_map(&self, id_key: Option<&str>) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        if let Some(key) = id_key {
            map.insert(key.to_string(), Value::String(self.extraction.name.clone()));
        }
        for (name, value) in self.fields() {
            let value = match value {
                Some(v) => Value::String(v.to_string()),
                None => Value::Null,
            };
            map.insert(name.to_string(), value);
        }
        if let Some(append) = &self.extraction.append {
            for (key, value) in append {
                map.insert(key.clone(), value.clone());
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use crate::DefinitionReader;

    use super::*;

    fn extractor(text: &str) -> Extractor {
        DefinitionReader::from_str(text).read().unwrap()
    }

    #[test]
    fn single_rule_end_to_end() {
        let x = extractor(concat!(
            "pattern %word [a-zA-Z]+\n",
            "template @t value=$v(%word)\n",
            "extract X {\n",
            "  template @t\n",
            "}\n",
        ));
        let result = x.extract("value=abc").unwrap().unwrap();
        assert_eq!(result.id(), "X");
        assert_eq!(result.input(), "value=abc");
        let fields: Vec<(&str, Option<&str>)> = result.fields().collect();
        assert_eq!(fields, [("v", Some("abc"))]);

        assert!(x.extract("value=123").unwrap().is_none());
        assert!(x.extract("nope").unwrap().is_none());
    }

    #[test]
    fn declaration_order_is_match_priority() {
        let x = extractor(concat!(
            "pattern %word [a-zA-Z]+\n",
            "extract A {\n",
            "  template $x(%word)\n",
            "}\n",
            "extract B {\n",
            "  template %word\n",
            "}\n",
        ));
        let result = x.extract("abc").unwrap().unwrap();
        assert_eq!(result.id(), "A");
        assert_eq!(result.as_map(None)["x"], "abc");
    }

    #[test]
    fn result_map_orders_id_fields_then_append() {
        let x = extractor(concat!(
            "pattern %word [a-zA-Z]+\n",
            "extract X {\n",
            "  template $y(%word)\n",
            "  append {\"k\":1}\n",
            "}\n",
        ));
        let result = x.extract("abc").unwrap().unwrap();
        let map = result.as_map(Some("id"));
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "y", "k"]);
        assert_eq!(map["id"], "X");
        assert_eq!(map["y"], "abc");
        assert_eq!(map["k"], 1);

        let without_id = result.as_map(None);
        let keys: Vec<&str> = without_id.keys().map(String::as_str).collect();
        assert_eq!(keys, ["y", "k"]);
    }

    #[test]
    fn multiple_extractors_capture_in_declaration_order() {
        let x = extractor(concat!(
            "pattern %word [a-zA-Z]+\n",
            "pattern %num \\d+\n",
            "template @t $name(%word)=$count(%num)\n",
            "extract Pair {\n",
            "  template @t\n",
            "}\n",
        ));
        let result = x.extract("retries=12").unwrap().unwrap();
        let fields: Vec<(&str, Option<&str>)> = result.fields().collect();
        assert_eq!(fields, [("name", Some("retries")), ("count", Some("12"))]);
    }

    #[test]
    fn nested_extractors_capture_depth_first() {
        let x = extractor(concat!(
            "pattern %word [a-zA-Z]+\n",
            "pattern %num \\d+\n",
            "extract X {\n",
            "  template $kv($k(%word)=$v(%num))\n",
            "}\n",
        ));
        let result = x.extract("port=80").unwrap().unwrap();
        let fields: Vec<(&str, Option<&str>)> = result.fields().collect();
        assert_eq!(
            fields,
            [("kv", Some("port=80")), ("k", Some("port")), ("v", Some("80"))]
        );
    }

    #[test]
    fn whitespace_runs_in_literals_are_elastic() {
        let x = extractor(concat!(
            "pattern %word [a-zA-Z]+\n",
            "extract X {\n",
            "  template $a(%word) $b(%word)\n",
            "}\n",
        ));
        let result = x.extract("left   \t right").unwrap().unwrap();
        assert_eq!(result.as_map(None)["a"], "left");
        assert_eq!(result.as_map(None)["b"], "right");
    }

    #[test]
    fn extract_safe_agrees_with_extract() {
        let x = extractor(concat!(
            "pattern %word [a-zA-Z]+\n",
            "extract X {\n",
            "  template $v(%word)\n",
            "}\n",
        ));
        let safe = x.extract_safe("abc").unwrap();
        assert_eq!(safe.id(), "X");
        assert!(x.extract_safe("123").is_none());
    }

    #[test]
    fn undefined_pattern_fails_compilation() {
        let err = DefinitionReader::from_str(concat!(
            "template @t $v(%missing)\n",
            "extract X {\n",
            "  template @t\n",
            "}\n",
        ))
        .read()
        .unwrap_err();
        assert!(err.message().contains("missing"), "got: {err}");
    }

    #[test]
    fn named_groups_in_inline_patterns_fail_compilation() {
        // must not silently capture as group 1 and report "a" for $v
        let err = DefinitionReader::from_str(concat!(
            "extract X {\n",
            "  template %{(?<stray>a)}-$v(%{[0-9]+})\n",
            "}\n",
        ))
        .read()
        .unwrap_err();
        assert!(err.message().contains("reserved for extractor expressions"), "got: {err}");
    }

    #[test]
    fn definitions_without_extractions_fail_compilation() {
        let err = DefinitionReader::from_str("pattern %a x\n").read().unwrap_err();
        assert!(err.message().contains("No extraction definitions"), "got: {err}");
    }

    #[test]
    fn shared_extractor_is_concurrency_safe() {
        let x = extractor(concat!(
            "pattern %num \\d+\n",
            "extract N {\n",
            "  template n=$n(%num)\n",
            "}\n",
        ));
        std::thread::scope(|scope| {
            for i in 0..4 {
                let x = &x;
                scope.spawn(move || {
                    for j in 0..50 {
                        let input = format!("n={}", i * 100 + j);
                        let result = x.extract(&input).unwrap().unwrap();
                        assert_eq!(result.id(), "N");
                    }
                });
            }
        });
    }
}
