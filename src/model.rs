//! Definition model: the piece tree and the uncooked definition tables.
//!
//! Everything the tokenizer produces and the resolver consumes lives here:
//!
//! - [`Piece`]: one node of a tokenized definition body. Pieces are immutable
//!   values; substitution (binding a positional parameter, renaming an
//!   extractor) always builds a new piece instead of mutating in place, so a
//!   bound argument can safely be spliced into several call sites.
//! - [`UncookedDefinition`] / [`UncookedExtraction`]: declarations as read
//!   from the source, before any reference resolution.
//! - [`UncookedDefinitions`]: the three name tables (patterns, templates,
//!   extractions). Insertion order is preserved; extraction order defines
//!   match priority.
//! - [`ParamCollector`] / [`ParamSignature`]: positional-parameter typing for
//!   parametric templates (`@1` vs `$1`), collected while tokenizing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DefinitionError;
use crate::input::InputLine;

pub(crate) type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Source location of a piece: the logical line it was cut from plus a byte
/// offset into that line. Used solely for diagnostics.
#[derive(Debug, Clone)]
pub(crate) struct Loc {
    pub line: Arc<InputLine>,
    pub offset: usize,
}

impl Loc {
    pub fn new(line: &Arc<InputLine>, offset: usize) -> Self {
        Loc { line: Arc::clone(line), offset }
    }

    pub fn error(&self, message: impl Into<String>) -> DefinitionError {
        self.line.error(self.offset, message)
    }
}

/// One node of a tokenized definition body.
#[derive(Debug, Clone)]
pub(crate) enum Piece {
    /// Raw text to be matched literally (never empty).
    LiteralText(Literal),
    /// A regex fragment, kept verbatim until fragment compilation.
    LiteralPattern(Literal),
    /// `%name`: reference to a declared pattern.
    PatternRef(NameRef),
    /// `@name` / `@name(args)`: reference to a declared template.
    TemplateRef(TemplateRef),
    /// `$name(...)`: a named (or positional) capture point.
    Extractor(ExtractorExpr),
    /// `@N` inside a parametric template body.
    TemplateParam(ParamRef),
    /// `$N` inside a parametric-reference argument list.
    ExtractorParam(ParamRef),
}

impl Piece {
    pub fn loc(&self) -> &Loc {
        match self {
            Piece::LiteralText(p) | Piece::LiteralPattern(p) => &p.loc,
            Piece::PatternRef(p) => &p.loc,
            Piece::TemplateRef(p) => &p.loc,
            Piece::Extractor(p) => &p.loc,
            Piece::TemplateParam(p) | Piece::ExtractorParam(p) => &p.loc,
        }
    }

    /// Short human-readable tag for internal-error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Piece::LiteralText(_) => "literal text",
            Piece::LiteralPattern(_) => "literal pattern",
            Piece::PatternRef(_) => "pattern reference",
            Piece::TemplateRef(_) => "template reference",
            Piece::Extractor(_) => "extractor expression",
            Piece::TemplateParam(_) => "template parameter",
            Piece::ExtractorParam(_) => "extractor parameter",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Literal {
    pub loc: Loc,
    pub text: String,
}

#[derive(Debug, Clone)]
pub(crate) struct NameRef {
    pub loc: Loc,
    pub name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TemplateRef {
    pub loc: Loc,
    pub name: String,
    /// Actual arguments; present iff the referenced template is parametric.
    pub args: Option<Vec<Piece>>,
}

impl TemplateRef {
    pub fn with_args(&self, args: Vec<Piece>) -> Self {
        TemplateRef { loc: self.loc.clone(), name: self.name.clone(), args: Some(args) }
    }
}

/// Name slot of an extractor: fixed, or a positional parameter to be bound
/// at a call site.
#[derive(Debug, Clone)]
pub(crate) enum ExtractorName {
    Named(String),
    Positional(u32),
}

#[derive(Debug, Clone)]
pub(crate) struct ExtractorExpr {
    pub loc: Loc,
    pub name: ExtractorName,
    pub parts: Vec<Piece>,
}

impl ExtractorExpr {
    pub fn named(loc: Loc, name: String) -> Self {
        ExtractorExpr { loc, name: ExtractorName::Named(name), parts: Vec::new() }
    }

    pub fn positional(loc: Loc, position: u32) -> Self {
        ExtractorExpr { loc, name: ExtractorName::Positional(position), parts: Vec::new() }
    }

    pub fn with_parts(&self, parts: Vec<Piece>) -> Self {
        ExtractorExpr { loc: self.loc.clone(), name: self.name.clone(), parts }
    }

    /// Display form of the name slot for diagnostics (`name` or `$3`).
    pub fn display_name(&self) -> String {
        match &self.name {
            ExtractorName::Named(n) => n.clone(),
            ExtractorName::Positional(p) => format!("${p}"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ParamRef {
    pub loc: Loc,
    /// Name of the declaration (or referenced template) this marker sits in.
    #[allow(dead_code)]
    pub owner: String,
    /// 1-based position.
    pub position: u32,
}

// --- Positional-parameter signatures -----------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamKind {
    Template,
    Extractor,
}

impl ParamKind {
    pub fn marker(self) -> char {
        match self {
            ParamKind::Template => '@',
            ParamKind::Extractor => '$',
        }
    }
}

/// Collects `@N`/`$N` uses while tokenizing a parametric template body.
/// The first use of a position fixes its kind; a later use with the other
/// kind is a definition error.
#[derive(Debug, Default)]
pub(crate) struct ParamCollector {
    kinds: Vec<Option<ParamKind>>,
}

impl ParamCollector {
    pub fn add(
        &mut self,
        line: &Arc<InputLine>,
        offset: usize,
        position: u32,
        kind: ParamKind,
    ) -> Result<(), DefinitionError> {
        let slot = (position - 1) as usize;
        if slot >= self.kinds.len() {
            self.kinds.resize(slot + 1, None);
        }
        match self.kinds[slot] {
            Some(old) if old != kind => Err(line.error(
                offset,
                format!(
                    "Inconsistent references to parameter {position}: {} vs {}",
                    old.marker(),
                    kind.marker()
                ),
            )),
            _ => {
                self.kinds[slot] = Some(kind);
                Ok(())
            }
        }
    }

    /// Freezes the collector into a signature. A position that was declared
    /// reachable (some higher position is used) but never referenced itself
    /// could never be validated at call sites, so it is rejected here.
    pub fn into_signature(
        self,
        line: &Arc<InputLine>,
        template_name: &str,
    ) -> Result<ParamSignature, DefinitionError> {
        let mut kinds = Vec::with_capacity(self.kinds.len());
        for (i, slot) in self.kinds.into_iter().enumerate() {
            match slot {
                Some(kind) => kinds.push(kind),
                None => {
                    return Err(line.error(
                        0,
                        format!(
                            "Parameter {} of template '@{template_name}' is never referenced",
                            i + 1
                        ),
                    ));
                }
            }
        }
        Ok(ParamSignature { kinds })
    }
}

/// Declared parameter kinds of a parametric template, in position order.
#[derive(Debug, Clone)]
pub(crate) struct ParamSignature {
    kinds: Vec<ParamKind>,
}

impl ParamSignature {
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// `position` is 1-based and must be in range.
    pub fn kind(&self, position: usize) -> ParamKind {
        self.kinds[position - 1]
    }
}

// --- Uncooked declarations ----------------------------------------------------

/// A pattern or template declaration before resolution. The body is tokenized
/// in a second pass (template references need to know whether their target is
/// parametric), so `parts` starts empty.
#[derive(Debug)]
pub(crate) struct UncookedDefinition {
    pub name: String,
    pub line: Arc<InputLine>,
    /// Offset where the body starts, after the name and trailing whitespace.
    pub body_start: usize,
    /// Declared with `()` after the name.
    pub parametric: bool,
    pub parts: Vec<Piece>,
    /// Populated for parametric templates once the body is tokenized.
    pub signature: Option<ParamSignature>,
}

impl UncookedDefinition {
    pub fn new(name: String, line: &Arc<InputLine>, body_start: usize, parametric: bool) -> Self {
        UncookedDefinition {
            name,
            line: Arc::clone(line),
            body_start,
            parametric,
            parts: Vec::new(),
            signature: None,
        }
    }
}

/// An `extract Name { ... }` block before resolution.
#[derive(Debug)]
pub(crate) struct UncookedExtraction {
    pub name: String,
    pub line: Arc<InputLine>,
    pub template: UncookedDefinition,
    pub append: Option<JsonMap>,
}

/// Insertion-ordered name table.
#[derive(Debug)]
pub(crate) struct Table<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Table { entries: Vec::new(), index: HashMap::new() }
    }
}

impl<T> Table<T> {
    /// Returns `false` (and leaves the table unchanged) on a duplicate name.
    pub fn insert(&mut self, name: &str, value: T) -> bool {
        if self.index.contains_key(name) {
            return false;
        }
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }
}

/// The tokenized-but-unresolved definition tables.
#[derive(Debug, Default)]
pub(crate) struct UncookedDefinitions {
    pub patterns: Table<UncookedDefinition>,
    pub templates: Table<UncookedDefinition>,
    pub extractions: Table<UncookedExtraction>,
}

impl UncookedDefinitions {
    pub fn find_pattern(&self, name: &str) -> Option<&UncookedDefinition> {
        self.patterns.get(name)
    }

    pub fn find_template(&self, name: &str) -> Option<&UncookedDefinition> {
        self.templates.get(name)
    }
}
