//! Definition compilation, front to back.
//!
//! [`DefinitionReader`] drives the full pipeline: tokenize the definition
//! text into uncooked tables, resolve pattern and template references, flatten
//! parametric references per extraction, compile each extraction's fragment
//! pair, and assemble the product automaton plus per-extraction regexes into
//! an [`Extractor`]. Compilation is all-or-nothing; the first definition
//! problem aborts with a located [`DefinitionError`].

pub(crate) mod flatten;
pub(crate) mod fragment;
pub(crate) mod resolve;
pub(crate) mod tokenize;

use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;

use crate::autom::PolyMatcher;
use crate::debug_enabled;
use crate::error::DefinitionError;
use crate::extract::{CookedExtraction, Extractor};
use crate::input::LineReader;

/// Compiles a definition text into an [`Extractor`].
pub struct DefinitionReader {
    lines: LineReader,
}

impl DefinitionReader {
    /// Reads definitions from an in-memory string.
    pub fn from_str(text: &str) -> Self {
        DefinitionReader { lines: LineReader::new("<input string>", text) }
    }

    /// Reads definitions from pre-split lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        for line in lines {
            joined.push_str(line.as_ref());
            joined.push('\n');
        }
        DefinitionReader { lines: LineReader::new("<input lines>", &joined) }
    }

    /// Reads definitions from a file. Fails here only on I/O; definition
    /// problems surface from [`read`](Self::read).
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let desc = format!("file '{}'", path.display());
        Ok(DefinitionReader { lines: LineReader::new(&desc, &text) })
    }

    /// Runs the whole pipeline. Consumes the reader; definitions are
    /// single-shot.
    pub fn read(mut self) -> Result<Extractor, DefinitionError> {
        let source_desc = self.lines.source_desc();

        let uncooked = tokenize::read_uncooked(&mut self.lines)?;
        if uncooked.extractions.is_empty() {
            return Err(DefinitionError::unlocated(
                &source_desc,
                "No extraction definitions found from definition",
            ));
        }

        let mut cooked = resolve::CookedDefinitions::resolve(&uncooked)?;
        let flattened = flatten::flatten_all(&uncooked, &mut cooked)?;

        let mut extractions = Vec::with_capacity(flattened.len());
        for flat in &flattened {
            let frags = fragment::compile_fragments(flat)?;
            // Anchor at both ends; the automaton dialect is anchored by
            // construction, the capture regex needs it spelled out.
            let regex_source = format!("^(?:{})$", frags.regex);
            let regex = Regex::new(&regex_source).map_err(|e| {
                flat.line.error(
                    0,
                    format!(
                        "Internal error: generated regexp for extraction '{}' is invalid: {e}",
                        flat.name
                    ),
                )
            })?;
            extractions.push(CookedExtraction {
                name: flat.name.clone(),
                append: flat.append.clone(),
                regex,
                regex_source,
                automaton_source: frags.automaton,
                extractor_names: flat.extractor_names.clone(),
            });
        }

        let automaton_sources: Vec<String> =
            extractions.iter().map(|x| x.automaton_source.clone()).collect();
        let matcher = PolyMatcher::new(&automaton_sources)
            .map_err(|msg| DefinitionError::unlocated(&source_desc, msg))?;

        if debug_enabled() {
            eprintln!(
                "[gleaner] compiled {} patterns, {} templates, {} extractions ({} product states)",
                cooked.pattern_count(),
                cooked.template_count(),
                extractions.len(),
                matcher.state_count()
            );
            for (i, x) in extractions.iter().enumerate() {
                eprintln!("[gleaner] extraction #{i} ({}): regexp {}", x.name, x.regex_source);
                eprintln!("[gleaner] extraction #{i} ({}): automaton {}", x.name, x.automaton_source);
            }
        }

        Ok(Extractor::new(matcher, extractions))
    }
}
