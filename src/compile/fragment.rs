//! Fragment compilation: flattened pieces into two textual regex dialects.
//!
//! Every extraction compiles into two parallel sources kept in sync piece by
//! piece:
//!
//! - the *automaton* dialect feeds the pre-filter DFA. Its engine takes
//!   backslash escapes literally, so well-known classes (`\d`, `\s`, `\w` and
//!   their negations) are rewritten to explicit bracket classes and control
//!   escapes to forms it understands. Any other backslash-alphanumeric escape
//!   is a definition error.
//! - the *regex* dialect feeds the confirming capture engine. Escapes pass
//!   verbatim; bare `(` groups are rewritten to `(?:` so that capture-group
//!   numbers stay reserved for extractor expressions.
//!
//! Literal text is identical in both: metacharacters quoted, with runs of
//! whitespace collapsed to `[ \t]+` so definitions match real-world spacing.

use crate::compile::flatten::FlattenedExtraction;
use crate::error::DefinitionError;
use crate::model::Piece;

const CLASS_D: &str = "0-9";
const CLASS_S: &str = r" \x08\x0C\n\r\t";
const CLASS_W: &str = "a-zA-Z_0-9";

/// The two compiled sources of one extraction.
#[derive(Debug)]
pub(crate) struct Fragments {
    pub automaton: String,
    pub regex: String,
}

pub(crate) fn compile_fragments(extraction: &FlattenedExtraction) -> Result<Fragments, DefinitionError> {
    let mut frags = Fragments { automaton: String::new(), regex: String::new() };
    append_parts(&extraction.parts, &mut frags)?;
    Ok(frags)
}

fn append_parts(parts: &[Piece], frags: &mut Fragments) -> Result<(), DefinitionError> {
    for part in parts {
        match part {
            Piece::LiteralText(l) => {
                let quoted = quote_literal(&l.text);
                frags.automaton.push_str(&quoted);
                frags.regex.push_str(&quoted);
            }
            Piece::LiteralPattern(l) => {
                massage_for_automaton(&l.text, &mut frags.automaton)
                    .map_err(|msg| l.loc.error(msg))?;
                massage_for_regex(&l.text, &mut frags.regex)
                    .map_err(|msg| l.loc.error(msg))?;
            }
            Piece::Extractor(e) => {
                frags.automaton.push('(');
                frags.regex.push('(');
                append_parts(&e.parts, frags)?;
                frags.automaton.push(')');
                frags.regex.push(')');
            }
            other => {
                return Err(other.loc().error(format!(
                    "Internal error: unexpected {} when compiling fragments",
                    other.kind_name()
                )));
            }
        }
    }
    Ok(())
}

/// Quotes literal text so it matches itself as a regex, in either dialect.
/// A run of whitespace matches any run of spaces and tabs.
fn quote_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {
                while matches!(chars.peek(), Some(&n) if (n as u32) <= 0x20) {
                    chars.next();
                }
                out.push_str("[ \t]+");
            }
            '.' | '(' | ')' | '[' | ']' | '\\' | '{' | '}' | '|' | '*' | '?' | '+' | '$'
            | '^' | '<' | '>' | '"' | '&' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Rewrites a raw pattern fragment for the automaton engine. Returns a plain
/// message on failure; the caller attaches the source location.
fn massage_for_automaton(pattern: &str, out: &mut String) -> Result<(), String> {
    if !pattern.contains('\\') {
        out.push_str(pattern);
        return Ok(());
    }
    let mut bracket_level = 0u32;
    // true right after an unescaped '[': the only slot where a negated class
    // may legally expand inside an existing bracket group
    let mut just_opened = false;
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                out.push(c);
                bracket_level += 1;
                just_opened = true;
                continue;
            }
            ']' => {
                out.push(c);
                bracket_level = bracket_level.saturating_sub(1);
            }
            '\\' => {
                let Some(d) = chars.next() else {
                    // orphan trailing backslash; let the engine's parser complain
                    out.push(c);
                    break;
                };
                match d {
                    '\\' => out.push_str("\\\\"),
                    'b' => out.push_str("\\x08"),
                    'f' => out.push_str("\\x0C"),
                    'n' | 'r' | 't' => {
                        out.push('\\');
                        out.push(d);
                    }
                    'd' => append_char_class(out, d, just_opened, bracket_level, CLASS_D, false)?,
                    'D' => append_char_class(out, d, just_opened, bracket_level, CLASS_D, true)?,
                    's' => append_char_class(out, d, just_opened, bracket_level, CLASS_S, false)?,
                    'S' => append_char_class(out, d, just_opened, bracket_level, CLASS_S, true)?,
                    'w' => append_char_class(out, d, just_opened, bracket_level, CLASS_W, false)?,
                    'W' => append_char_class(out, d, just_opened, bracket_level, CLASS_W, true)?,
                    _ if d.is_alphanumeric() => {
                        return Err(format!(
                            "Unrecognized backslash escape '\\{d}'; can only escape backslash (\\\\), use known control-codes (\\n, \\r, \\t), escape non-alphanumeric (\\$, \\(, ...) or refer to a 'well-known' character class (\\s, \\S, \\d, \\D, \\w, \\W)"
                        ));
                    }
                    _ => {
                        out.push('\\');
                        out.push(d);
                    }
                }
            }
            _ => out.push(c),
        }
        just_opened = false;
    }
    Ok(())
}

fn append_char_class(
    out: &mut String,
    class: char,
    just_opened: bool,
    bracket_level: u32,
    chars: &str,
    negated: bool,
) -> Result<(), String> {
    if bracket_level == 0 {
        out.push('[');
        if negated {
            out.push('^');
        }
        out.push_str(chars);
        out.push(']');
        return Ok(());
    }
    if negated && !just_opened {
        return Err(format!(
            "Can not use negated character class \\{class} within a character class in position other than first"
        ));
    }
    if negated {
        out.push('^');
    }
    out.push_str(chars);
    Ok(())
}

/// Rewrites a raw pattern fragment for the capture engine: escapes pass
/// verbatim, bare groups become non-capturing. `(?:` groups and inline flags
/// pass through; named captures and look-behind are definition errors, since
/// capture groups belong to extractor expressions alone. Returns a plain
/// message on failure; the caller attaches the source location.
fn massage_for_regex(pattern: &str, out: &mut String) -> Result<(), String> {
    let mut chars = pattern.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some((_, d)) = chars.next() {
                    out.push(d);
                }
            }
            '(' => {
                let rest = &pattern[i + 1..];
                if rest.starts_with('?') {
                    if rest.starts_with("?<") || rest.starts_with("?P<") {
                        let bad = if rest.starts_with("?P<") { "(?P<" } else { "(?<" };
                        return Err(format!(
                            "Invalid group construct '{bad}' in pattern: named capture groups and look-behind are not supported; capture groups are reserved for extractor expressions"
                        ));
                    }
                    out.push(c);
                } else {
                    out.push_str("(?:");
                }
            }
            _ => out.push(c),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::flatten::flatten_all;
    use crate::compile::resolve::CookedDefinitions;
    use crate::compile::tokenize::read_uncooked;
    use crate::input::LineReader;

    fn automaton(pattern: &str) -> String {
        let mut out = String::new();
        massage_for_automaton(pattern, &mut out).unwrap();
        out
    }

    fn regex(pattern: &str) -> String {
        let mut out = String::new();
        massage_for_regex(pattern, &mut out).unwrap();
        out
    }

    #[test]
    fn literal_quoting_escapes_metacharacters() {
        assert_eq!(quote_literal("a.b(c)"), r"a\.b\(c\)");
        assert_eq!(quote_literal("x<y>&z"), r"x\<y\>\&z");
    }

    #[test]
    fn literal_whitespace_runs_collapse() {
        assert_eq!(quote_literal("a \t b"), "a[ \t]+b");
        assert_eq!(quote_literal(" lead"), "[ \t]+lead");
    }

    #[test]
    fn automaton_rewrites_well_known_classes() {
        assert_eq!(automaton(r"\d+"), "[0-9]+");
        assert_eq!(automaton(r"\w*"), "[a-zA-Z_0-9]*");
        assert_eq!(automaton(r"[\d\s]"), "[0-9 \\x08\\x0C\\n\\r\\t]");
        assert_eq!(automaton(r"[\D]"), "[^0-9]");
    }

    #[test]
    fn automaton_translates_control_escapes() {
        assert_eq!(automaton(r"a\tb\nc"), r"a\tb\nc");
        assert_eq!(automaton(r"\b\f"), r"\x08\x0C");
        assert_eq!(automaton(r"\\d"), r"\\d");
    }

    #[test]
    fn automaton_passes_plain_fragments_through() {
        assert_eq!(automaton("[a-z]+(x|y)"), "[a-z]+(x|y)");
    }

    #[test]
    fn automaton_rejects_misplaced_negation() {
        let mut out = String::new();
        let err = massage_for_automaton(r"[x\D]", &mut out).unwrap_err();
        assert!(err.contains("negated character class"), "got: {err}");
    }

    #[test]
    fn automaton_rejects_unknown_alphanumeric_escapes() {
        let mut out = String::new();
        let err = massage_for_automaton(r"\q", &mut out).unwrap_err();
        assert!(err.contains("Unrecognized backslash escape"), "got: {err}");
    }

    #[test]
    fn regex_dialect_makes_groups_non_capturing() {
        assert_eq!(regex("(abc)"), "(?:abc)");
        assert_eq!(regex("(?:x)(?i)y"), "(?:x)(?i)y");
        assert_eq!(regex(r"\(x\)"), r"\(x\)");
        assert_eq!(regex(r"\d+"), r"\d+");
    }

    #[test]
    fn regex_dialect_rejects_named_groups_and_look_behind() {
        // a surviving capturing group would shift every extractor's index
        for pattern in ["(?<stray>a)", "(?P<stray>a)", "(?<=a)b"] {
            let mut out = String::new();
            let err = massage_for_regex(pattern, &mut out).unwrap_err();
            assert!(err.contains("reserved for extractor expressions"), "{pattern}: {err}");
        }
        assert_eq!(regex("a(?:b)?c"), "a(?:b)?c");
    }

    #[test]
    fn extraction_compiles_to_synchronized_dialects() {
        let text = concat!(
            "pattern %num \\d+\n",
            "template @t v=$v(%num) z\n",
            "extract X {\n",
            "  template @t\n",
            "}\n",
        );
        let uncooked = read_uncooked(&mut LineReader::new("<test>", text)).unwrap();
        let mut cooked = CookedDefinitions::resolve(&uncooked).unwrap();
        let all = flatten_all(&uncooked, &mut cooked).unwrap();
        let frags = compile_fragments(&all[0]).unwrap();
        assert_eq!(frags.regex, "v=(\\d+)[ \t]+z");
        assert_eq!(frags.automaton, "v=([0-9]+)[ \t]+z");
    }
}
