//! Symbol resolution: turning uncooked tables into cooked ones.
//!
//! Patterns resolve to flat literal fragments (depth-first, memoized, with an
//! explicit in-progress stack so cyclic references are reported with the full
//! chain). Templates resolve as far as structure allows: pattern references
//! substitute their resolved text, non-parametric template references inline
//! recursively, parametric references stay structural for the flattener, and
//! extractor children resolve in place.

use std::collections::HashMap;

use crate::error::DefinitionError;
use crate::model::{
    Literal, Loc, NameRef, ParamSignature, Piece, TemplateRef, UncookedDefinition,
    UncookedDefinitions,
};

/// A template with everything except parametric references resolved away.
#[derive(Debug)]
pub(crate) struct CookedTemplate {
    pub name: String,
    pub signature: Option<ParamSignature>,
    pub parts: Vec<Piece>,
}

/// Resolved pattern and template tables.
#[derive(Debug, Default)]
pub(crate) struct CookedDefinitions {
    patterns: HashMap<String, Literal>,
    templates: HashMap<String, CookedTemplate>,
}

impl CookedDefinitions {
    pub fn resolve(uncooked: &UncookedDefinitions) -> Result<Self, DefinitionError> {
        let mut cooked = CookedDefinitions::default();
        cooked.resolve_patterns(uncooked)?;
        cooked.resolve_templates(uncooked)?;
        Ok(cooked)
    }

    pub fn pattern(&self, name: &str) -> Option<&Literal> {
        self.patterns.get(name)
    }

    pub fn template(&self, name: &str) -> Option<&CookedTemplate> {
        self.templates.get(name)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Resolves the body of one extraction's `template` property. Named
    /// templates are all cooked by now, so lookups go against the memoized
    /// tables only.
    pub fn resolve_extraction_template(
        &mut self,
        raw: &UncookedDefinition,
    ) -> Result<Vec<Piece>, DefinitionError> {
        let empty = UncookedDefinitions::default();
        let mut parts = Vec::new();
        self.resolve_template_contents(&empty, &raw.parts, &mut parts, &mut Vec::new(), &raw.name)?;
        Ok(parts)
    }

    // --- Patterns ------------------------------------------------------------

    fn resolve_patterns(&mut self, uncooked: &UncookedDefinitions) -> Result<(), DefinitionError> {
        for def in uncooked.patterns.values() {
            if self.patterns.contains_key(&def.name) {
                // already pulled in through another pattern's reference
                continue;
            }
            let lit = self.resolve_pattern(uncooked, def, &mut Vec::new())?;
            self.patterns.insert(def.name.clone(), lit);
        }
        Ok(())
    }

    fn resolve_pattern(
        &mut self,
        uncooked: &UncookedDefinitions,
        def: &UncookedDefinition,
        stack: &mut Vec<String>,
    ) -> Result<Literal, DefinitionError> {
        let mut text = String::new();
        for part in &def.parts {
            match part {
                Piece::LiteralPattern(lit) => text.push_str(&lit.text),
                Piece::PatternRef(r) => {
                    let lit = self.resolve_pattern_reference(uncooked, &def.name, r, stack)?;
                    text.push_str(&lit.text);
                }
                other => {
                    return Err(other.loc().error(format!(
                        "Internal error: unexpected {} in pattern '%{}'",
                        other.kind_name(),
                        def.name
                    )));
                }
            }
        }
        let loc = match def.parts.first() {
            Some(part) => part.loc().clone(),
            None => Loc::new(&def.line, def.body_start),
        };
        Ok(Literal { loc, text })
    }

    fn resolve_pattern_reference(
        &mut self,
        uncooked: &UncookedDefinitions,
        from: &str,
        reference: &NameRef,
        stack: &mut Vec<String>,
    ) -> Result<Literal, DefinitionError> {
        let name = &reference.name;
        if let Some(lit) = self.patterns.get(name) {
            return Ok(lit.clone());
        }
        stack.push(from.to_string());
        if stack.iter().any(|n| n == name) {
            return Err(reference.loc.error(format!(
                "Cyclic pattern reference to '%{name}' {}",
                stack_desc('%', stack, name)
            )));
        }
        let Some(raw) = uncooked.find_pattern(name) else {
            return Err(reference.loc.error(format!(
                "Referencing non-existing pattern '%{name}' {}",
                stack_desc('%', stack, name)
            )));
        };
        let lit = self.resolve_pattern(uncooked, raw, stack)?;
        self.patterns.insert(name.clone(), lit.clone());
        stack.pop();
        Ok(lit)
    }

    // --- Templates -----------------------------------------------------------

    fn resolve_templates(&mut self, uncooked: &UncookedDefinitions) -> Result<(), DefinitionError> {
        for def in uncooked.templates.values() {
            if self.templates.contains_key(&def.name) {
                continue;
            }
            let mut parts = Vec::new();
            self.resolve_template_contents(uncooked, &def.parts, &mut parts, &mut Vec::new(), &def.name)?;
            self.templates.insert(
                def.name.clone(),
                CookedTemplate { name: def.name.clone(), signature: def.signature.clone(), parts },
            );
        }
        Ok(())
    }

    fn resolve_template_contents(
        &mut self,
        uncooked: &UncookedDefinitions,
        input: &[Piece],
        out: &mut Vec<Piece>,
        stack: &mut Vec<String>,
        top: &str,
    ) -> Result<(), DefinitionError> {
        for part in input {
            match part {
                Piece::LiteralText(_) | Piece::LiteralPattern(_) => out.push(part.clone()),
                Piece::PatternRef(r) => {
                    let Some(lit) = self.patterns.get(&r.name) else {
                        return Err(r.loc.error(format!(
                            "Referencing non-existing pattern '%{}' from template '{top}'",
                            r.name
                        )));
                    };
                    out.push(Piece::LiteralPattern(lit.clone()));
                }
                Piece::TemplateRef(r) => {
                    if r.args.is_some() {
                        // parametric: bound (and thus inlined) only per call
                        // site, by the flattener
                        out.push(part.clone());
                    } else {
                        let inlined = self.resolve_template_reference(uncooked, top, r, stack)?;
                        out.extend(inlined);
                    }
                }
                Piece::Extractor(e) => {
                    let mut inner = Vec::new();
                    self.resolve_template_contents(uncooked, &e.parts, &mut inner, stack, top)?;
                    out.push(Piece::Extractor(e.with_parts(inner)));
                }
                Piece::TemplateParam(_) | Piece::ExtractorParam(_) => out.push(part.clone()),
            }
        }
        Ok(())
    }

    fn resolve_template_reference(
        &mut self,
        uncooked: &UncookedDefinitions,
        from: &str,
        reference: &TemplateRef,
        stack: &mut Vec<String>,
    ) -> Result<Vec<Piece>, DefinitionError> {
        let name = &reference.name;
        if let Some(template) = self.templates.get(name) {
            return Ok(template.parts.clone());
        }
        stack.push(from.to_string());
        if stack.iter().any(|n| n == name) {
            return Err(reference.loc.error(format!(
                "Cyclic template reference to '@{name}' {}",
                stack_desc('@', stack, name)
            )));
        }
        let Some(raw) = uncooked.find_template(name) else {
            return Err(reference.loc.error(format!(
                "Referencing non-existing template '@{name}' {}",
                stack_desc('@', stack, name)
            )));
        };
        let mut parts = Vec::new();
        self.resolve_template_contents(uncooked, &raw.parts, &mut parts, stack, name)?;
        self.templates.insert(
            name.clone(),
            CookedTemplate { name: name.clone(), signature: raw.signature.clone(), parts: parts.clone() },
        );
        stack.pop();
        Ok(parts)
    }
}

/// Renders a reference chain like `(%a->%b->%a)` for cycle diagnostics.
fn stack_desc(marker: char, stack: &[String], last: &str) -> String {
    let mut out = String::from("(");
    for name in stack {
        out.push(marker);
        out.push_str(name);
        out.push_str("->");
    }
    out.push(marker);
    out.push_str(last);
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::tokenize::read_uncooked;
    use crate::input::LineReader;
    use crate::model::testing::render_pieces;

    fn cooked(text: &str) -> CookedDefinitions {
        let uncooked = read_uncooked(&mut LineReader::new("<test>", text)).unwrap();
        CookedDefinitions::resolve(&uncooked).unwrap()
    }

    fn cooked_err(text: &str) -> String {
        let uncooked = read_uncooked(&mut LineReader::new("<test>", text)).unwrap();
        CookedDefinitions::resolve(&uncooked).unwrap_err().message().to_string()
    }

    #[test]
    fn patterns_resolve_transitively() {
        let defs = cooked("pattern %a x%b\npattern %b y%c\npattern %c z\n");
        assert_eq!(defs.pattern("a").unwrap().text, "xyz");
        assert_eq!(defs.pattern("b").unwrap().text, "yz");
        assert_eq!(defs.pattern("c").unwrap().text, "z");
    }

    #[test]
    fn self_referencing_pattern_reports_chain() {
        let msg = cooked_err("pattern %a x%a\n");
        assert!(msg.contains("Cyclic pattern reference to '%a' (%a->%a)"), "got: {msg}");
    }

    #[test]
    fn two_step_pattern_cycle_reports_chain() {
        let msg = cooked_err("pattern %a x%b\npattern %b y%a\n");
        assert!(msg.contains("Cyclic pattern reference to '%a' (%a->%b->%a)"), "got: {msg}");
    }

    #[test]
    fn undefined_pattern_reference_is_fatal() {
        let msg = cooked_err("pattern %a x%missing\n");
        assert!(msg.contains("Referencing non-existing pattern '%missing'"), "got: {msg}");
    }

    #[test]
    fn template_inlining_is_verbatim() {
        let defs = cooked(concat!(
            "pattern %num \\d+\n",
            "template @base v=%num\n",
            "template @outer [@base]\n",
        ));
        let outer = defs.template("outer").unwrap();
        assert_eq!(render_pieces(&outer.parts), r"text([) | text(v=) | pat(\d+) | text(])");
    }

    #[test]
    fn template_cycle_reports_chain() {
        let msg = cooked_err("template @a x@b\ntemplate @b y@a\n");
        assert!(msg.contains("Cyclic template reference to '@a' (@a->@b->@a)"), "got: {msg}");
    }

    #[test]
    fn parametric_references_stay_structural() {
        let defs = cooked(concat!(
            "pattern %w \\w+\n",
            "template @kv() @1=$2(%w)\n",
            "template @val V\n",
            "template @line <@kv(@val,$x)>\n",
        ));
        let line = defs.template("line").unwrap();
        assert_eq!(render_pieces(&line.parts), "text(<) | @kv(@val,$x()) | text(>)");
        // the parametric template's own body keeps its positional markers
        let kv = defs.template("kv").unwrap();
        assert_eq!(render_pieces(&kv.parts), r"@#1 | text(=) | $$2(pat(\w+))");
    }

    #[test]
    fn extractor_children_resolve_in_place() {
        let defs = cooked("pattern %w \\w+\ntemplate @t $v(%w)\n");
        let t = defs.template("t").unwrap();
        assert_eq!(render_pieces(&t.parts), r"$v(pat(\w+))");
    }
}
