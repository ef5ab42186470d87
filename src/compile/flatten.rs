//! Extraction flattening: eliminating parametric template references.
//!
//! The resolver leaves parametric references structural because their bodies
//! only mean something per call site. This pass walks each extraction's
//! resolved template body, builds argument bindings for every parametric
//! reference (validating count and kind against the declared signature),
//! substitutes positional markers with their bound pieces, and registers
//! final extractor names in declaration order with duplicate detection.
//! The output contains only literals and named extractor expressions.

use std::collections::HashSet;
use std::sync::Arc;

use crate::compile::resolve::CookedDefinitions;
use crate::error::DefinitionError;
use crate::input::InputLine;
use crate::model::{
    ExtractorExpr, ExtractorName, JsonMap, Loc, ParamKind, ParamRef, Piece, TemplateRef,
    UncookedDefinitions,
};

/// One extraction reduced to literals and named extractors.
#[derive(Debug)]
pub(crate) struct FlattenedExtraction {
    pub name: String,
    pub line: Arc<InputLine>,
    pub append: Option<JsonMap>,
    pub parts: Vec<Piece>,
    /// Final extractor names in declaration (capture-group) order.
    pub extractor_names: Vec<String>,
}

/// Pieces bound to one parametric reference's positions, 1-based.
struct Bindings {
    bound: Vec<Piece>,
}

impl Bindings {
    fn get(&self, position: u32) -> Option<&Piece> {
        self.bound.get((position - 1) as usize)
    }

    fn len(&self) -> usize {
        self.bound.len()
    }
}

/// Ordered extractor-name registry with duplicate rejection.
#[derive(Default)]
struct NameSet {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl NameSet {
    fn add(&mut self, loc: &Loc, name: &str) -> Result<(), DefinitionError> {
        if !self.seen.insert(name.to_string()) {
            return Err(loc.error(format!("Duplicate extractor name (${name})")));
        }
        self.names.push(name.to_string());
        Ok(())
    }
}

pub(crate) fn flatten_all(
    uncooked: &UncookedDefinitions,
    cooked: &mut CookedDefinitions,
) -> Result<Vec<FlattenedExtraction>, DefinitionError> {
    let mut out = Vec::with_capacity(uncooked.extractions.len());
    for raw in uncooked.extractions.values() {
        let resolved = cooked.resolve_extraction_template(&raw.template)?;
        let mut names = NameSet::default();
        let mut parts = Vec::new();
        flatten_parts(cooked, &resolved, &mut parts, &mut names, None)?;
        out.push(FlattenedExtraction {
            name: raw.name.clone(),
            line: Arc::clone(&raw.line),
            append: raw.append.clone(),
            parts,
            extractor_names: names.names,
        });
    }
    Ok(out)
}

fn flatten_parts(
    cooked: &CookedDefinitions,
    input: &[Piece],
    out: &mut Vec<Piece>,
    names: &mut NameSet,
    bindings: Option<&Bindings>,
) -> Result<(), DefinitionError> {
    for part in input {
        let substituted;
        let part = if let Piece::TemplateParam(p) = part {
            substituted = bound_piece(p, '@', bindings)?;
            &substituted
        } else {
            part
        };
        match part {
            Piece::LiteralText(_) | Piece::LiteralPattern(_) => out.push(part.clone()),
            Piece::Extractor(e) => flatten_extractor(cooked, e, out, names, bindings)?,
            Piece::TemplateRef(r) => flatten_template_ref(cooked, r, out, names, bindings)?,
            Piece::PatternRef(r) => {
                return Err(r.loc.error(format!(
                    "Internal error: unresolved pattern reference '%{}'",
                    r.name
                )));
            }
            Piece::TemplateParam(p) | Piece::ExtractorParam(p) => {
                return Err(p.loc.error(format!(
                    "Internal error: unexpected positional reference {} after substitution",
                    p.position
                )));
            }
        }
    }
    Ok(())
}

fn flatten_template_ref(
    cooked: &CookedDefinitions,
    reference: &TemplateRef,
    out: &mut Vec<Piece>,
    names: &mut NameSet,
    bindings: Option<&Bindings>,
) -> Result<(), DefinitionError> {
    let Some(template) = cooked.template(&reference.name) else {
        return Err(reference.loc.error(format!(
            "Internal error: reference to unknown template '@{}'",
            reference.name
        )));
    };

    let new_bindings = match &template.signature {
        Some(signature) => {
            let args = reference.args.as_deref().unwrap_or(&[]);
            if args.len() != signature.len() {
                return Err(reference.loc.error(format!(
                    "Parameter mismatch: template '@{}' expects {} parameters; {} passed",
                    reference.name,
                    signature.len(),
                    args.len()
                )));
            }
            let mut bound = Vec::with_capacity(args.len());
            for (i, arg) in args.iter().enumerate() {
                // Resolve against the caller's bindings first: an outer-scope
                // positional decides its actual kind only once substituted.
                let resolved = resolve_argument(arg, bindings)?;
                let expected = signature.kind(i + 1);
                let compatible = matches!(
                    (&resolved, expected),
                    (Piece::TemplateRef(_), ParamKind::Template)
                        | (Piece::Extractor(_), ParamKind::Extractor)
                );
                if !compatible {
                    return Err(reference.loc.error(format!(
                        "Parameter mismatch: template '@{}' expects type '{}' parameter {}, got {}",
                        reference.name,
                        expected.marker(),
                        i + 1,
                        resolved.kind_name()
                    )));
                }
                bound.push(resolved);
            }
            Some(Bindings { bound })
        }
        None => None,
    };

    flatten_parts(cooked, &template.parts, out, names, new_bindings.as_ref())
}

/// Resolves one actual argument of a parametric reference against the
/// caller's own bindings, recursively through nested argument lists.
fn resolve_argument(arg: &Piece, bindings: Option<&Bindings>) -> Result<Piece, DefinitionError> {
    match arg {
        Piece::TemplateParam(p) => bound_piece(p, '@', bindings),
        Piece::ExtractorParam(p) => bound_piece(p, '$', bindings),
        Piece::TemplateRef(r) => match &r.args {
            None => Ok(arg.clone()),
            Some(args) => {
                let resolved: Result<Vec<Piece>, DefinitionError> =
                    args.iter().map(|a| resolve_argument(a, bindings)).collect();
                Ok(Piece::TemplateRef(r.with_args(resolved?)))
            }
        },
        Piece::Extractor(e) => {
            let resolved: Result<Vec<Piece>, DefinitionError> =
                e.parts.iter().map(|p| resolve_argument(p, bindings)).collect();
            Ok(Piece::Extractor(e.with_parts(resolved?)))
        }
        Piece::LiteralText(_) | Piece::LiteralPattern(_) => Ok(arg.clone()),
        Piece::PatternRef(r) => Err(r.loc.error(format!(
            "Internal error: unresolved pattern reference '%{}' in argument list",
            r.name
        ))),
    }
}

fn bound_piece(
    p: &ParamRef,
    marker: char,
    bindings: Option<&Bindings>,
) -> Result<Piece, DefinitionError> {
    let Some(bindings) = bindings else {
        return Err(p.loc.error(format!(
            "Invalid parameter variable reference {marker}{}; template takes no parameters",
            p.position
        )));
    };
    match bindings.get(p.position) {
        Some(piece) => Ok(piece.clone()),
        None => Err(p.loc.error(format!(
            "Invalid parameter variable reference {marker}{}; template takes {} parameters",
            p.position,
            bindings.len()
        ))),
    }
}

fn flatten_extractor(
    cooked: &CookedDefinitions,
    extractor: &ExtractorExpr,
    out: &mut Vec<Piece>,
    names: &mut NameSet,
    bindings: Option<&Bindings>,
) -> Result<(), DefinitionError> {
    let name = match &extractor.name {
        ExtractorName::Named(n) => n.clone(),
        ExtractorName::Positional(pos) => {
            let param = ParamRef {
                loc: extractor.loc.clone(),
                owner: String::new(),
                position: *pos,
            };
            match bound_piece(&param, '$', bindings)? {
                Piece::Extractor(bound) => match bound.name {
                    ExtractorName::Named(n) => n,
                    ExtractorName::Positional(other) => {
                        return Err(extractor.loc.error(format!(
                            "Internal error: positional extractor parameter ({pos}) resolves to another positional ({other})"
                        )));
                    }
                },
                other => {
                    return Err(extractor.loc.error(format!(
                        "Internal error: unexpected extractor parameter of type {} (expecting extractor expression)",
                        other.kind_name()
                    )));
                }
            }
        }
    };
    // Registered before children so group order follows declaration order.
    names.add(&extractor.loc, &name)?;

    let mut inner = Vec::new();
    flatten_parts(cooked, &extractor.parts, &mut inner, names, bindings)?;
    out.push(Piece::Extractor(ExtractorExpr {
        loc: extractor.loc.clone(),
        name: ExtractorName::Named(name),
        parts: inner,
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::tokenize::read_uncooked;
    use crate::input::LineReader;
    use crate::model::testing::render_pieces;

    fn flattened(text: &str) -> Vec<FlattenedExtraction> {
        let uncooked = read_uncooked(&mut LineReader::new("<test>", text)).unwrap();
        let mut cooked = CookedDefinitions::resolve(&uncooked).unwrap();
        flatten_all(&uncooked, &mut cooked).unwrap()
    }

    fn flattened_err(text: &str) -> String {
        let uncooked = read_uncooked(&mut LineReader::new("<test>", text)).unwrap();
        let mut cooked = CookedDefinitions::resolve(&uncooked).unwrap();
        flatten_all(&uncooked, &mut cooked).unwrap_err().message().to_string()
    }

    #[test]
    fn simple_extraction_flattens_to_literals_and_extractors() {
        let all = flattened(concat!(
            "pattern %w \\w+\n",
            "template @t v=$v(%w)\n",
            "extract X {\n",
            "  template @t\n",
            "}\n",
        ));
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "X");
        assert_eq!(render_pieces(&all[0].parts), r"text(v=) | $v(pat(\w+))");
        assert_eq!(all[0].extractor_names, ["v"]);
    }

    #[test]
    fn parametric_reference_binds_both_kinds() {
        let all = flattened(concat!(
            "pattern %w \\w+\n",
            "template @kv() @1=$2(%w)\n",
            "template @key K\n",
            "extract X {\n",
            "  template @kv(@key,$val)\n",
            "}\n",
        ));
        assert_eq!(render_pieces(&all[0].parts), r"text(K) | text(=) | $val(pat(\w+))");
        assert_eq!(all[0].extractor_names, ["val"]);
    }

    #[test]
    fn argument_count_mismatch_is_fatal() {
        let msg = flattened_err(concat!(
            "pattern %w \\w+\n",
            "template @kv() @1=$2(%w)\n",
            "template @key K\n",
            "extract X {\n",
            "  template @kv(@key)\n",
            "}\n",
        ));
        assert!(msg.contains("expects 2 parameters; 1 passed"), "got: {msg}");
    }

    #[test]
    fn argument_kind_mismatch_is_fatal() {
        let msg = flattened_err(concat!(
            "pattern %w \\w+\n",
            "template @kv() @1=$2(%w)\n",
            "extract X {\n",
            "  template @kv($a,$b)\n",
            "}\n",
        ));
        assert!(msg.contains("expects type '@' parameter 1"), "got: {msg}");
    }

    #[test]
    fn duplicate_extractor_names_detected_through_substitution() {
        let msg = flattened_err(concat!(
            "pattern %w \\w+\n",
            "template @kv() $1(%w)\n",
            "extract X {\n",
            "  template @kv($v) $v(%w)\n",
            "}\n",
        ));
        assert!(msg.contains("Duplicate extractor name ($v)"), "got: {msg}");
    }

    #[test]
    fn outer_positionals_pass_through_nested_argument_lists() {
        let all = flattened(concat!(
            "pattern %w \\w+\n",
            "template @inner() [$1(%w)]\n",
            "template @outer() @inner($1)\n",
            "extract X {\n",
            "  template @outer($field)\n",
            "}\n",
        ));
        assert_eq!(render_pieces(&all[0].parts), r"text([) | $field(pat(\w+)) | text(])");
        assert_eq!(all[0].extractor_names, ["field"]);
    }

    #[test]
    fn extraction_order_defines_result_order() {
        let all = flattened(concat!(
            "template @a A\n",
            "template @b B\n",
            "extract Second {\n",
            "  template @b\n",
            "}\n",
            "extract First {\n",
            "  template @a\n",
            "}\n",
        ));
        let names: Vec<&str> = all.iter().map(|x| x.name.as_str()).collect();
        assert_eq!(names, ["Second", "First"]);
    }
}
