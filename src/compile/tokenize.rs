//! Marker-character tokenizer.
//!
//! First pass over the definition text: keyword dispatch (`pattern`,
//! `template`, `extract`), then body tokenization into [`Piece`] trees.
//! Runs in two phases so that a template reference in any body already knows
//! whether its target is parametric (parametric references are followed by an
//! argument list, plain ones are not). Nothing is resolved here; names are
//! checked for existence only where tokenization itself depends on it.

use std::sync::Arc;

use crate::error::DefinitionError;
use crate::input::{InputLine, LineReader};
use crate::model::{
    ExtractorExpr, JsonMap, Literal, Loc, NameRef, ParamCollector, ParamKind, ParamRef, Piece,
    TemplateRef, UncookedDefinition, UncookedDefinitions, UncookedExtraction,
};

const KNOWN_KEYWORDS: &str = "(pattern, template, extract)";
const EXTRACTION_PROPERTIES: &str = "(template, append)";

/// Positional parameters past this are rejected to bound binding-table sizes.
const MAX_PARAM_POSITION: u32 = 999_999;

/// Reads the whole definition input into uncooked (tokenized, unresolved)
/// tables.
pub(crate) fn read_uncooked(
    lines: &mut LineReader,
) -> Result<UncookedDefinitions, DefinitionError> {
    let mut defs = UncookedDefinitions::default();

    // Phase 1: headers (and whole extraction blocks, which are line-delimited).
    while let Some(line) = lines.next_line()? {
        let contents = line.contents();
        let Some(caps) = regex!(r"^\s*(\w+)\s*").captures(contents) else {
            return Err(line.error(
                0,
                format!("No keyword found from line; expected one of {KNOWN_KEYWORDS}"),
            ));
        };
        let keyword = &caps[1];
        let rest = caps.get(0).map_or(0, |m| m.end());
        match keyword {
            "pattern" => read_pattern_header(&line, rest, &mut defs)?,
            "template" => read_template_header(&line, rest, &mut defs)?,
            "extract" => read_extraction(lines, &line, rest, &mut defs)?,
            _ => {
                return Err(line.error(
                    0,
                    format!(
                        "Unrecognized keyword \"{keyword}\" encountered; expected one of {KNOWN_KEYWORDS}"
                    ),
                ));
            }
        }
    }

    // Phase 2a: pattern bodies (no cross-table lookups needed).
    for def in defs.patterns.values_mut() {
        tokenize_pattern_body(def)?;
    }

    // Phase 2b: template bodies. Tokenization looks other templates up in the
    // table being filled, so bodies are tokenized against the immutable table
    // and written back afterwards.
    let specs: Vec<(String, Arc<InputLine>, usize, bool)> = defs
        .templates
        .values()
        .map(|t| (t.name.clone(), Arc::clone(&t.line), t.body_start, t.parametric))
        .collect();
    let mut tokenized = Vec::with_capacity(specs.len());
    for (name, line, start, parametric) in specs {
        let desc = format!("template '{name}' definition");
        let mut collector = if parametric { Some(ParamCollector::default()) } else { None };
        let mut parts = Vec::new();
        tokenize_body(&line, start, &defs, &mut parts, &name, 0, &desc, collector.as_mut())?;
        let signature = match collector {
            Some(c) => Some(c.into_signature(&line, &name)?),
            None => None,
        };
        tokenized.push((parts, signature));
    }
    for (def, (parts, signature)) in defs.templates.values_mut().zip(tokenized) {
        def.parts = parts;
        def.signature = signature;
    }

    // Phase 2c: extraction template bodies. Never parametric.
    let specs: Vec<(String, Arc<InputLine>, usize)> = defs
        .extractions
        .values()
        .map(|x| (x.name.clone(), Arc::clone(&x.template.line), x.template.body_start))
        .collect();
    let mut tokenized = Vec::with_capacity(specs.len());
    for (name, line, start) in specs {
        let desc = format!("extraction template for '{name}'");
        let mut parts = Vec::new();
        tokenize_body(&line, start, &defs, &mut parts, &name, 0, &desc, None)?;
        tokenized.push(parts);
    }
    for (x, parts) in defs.extractions.values_mut().zip(tokenized) {
        x.template.parts = parts;
    }

    Ok(defs)
}

// --- Header lines ------------------------------------------------------------

fn read_pattern_header(
    line: &Arc<InputLine>,
    offset: usize,
    defs: &mut UncookedDefinitions,
) -> Result<(), DefinitionError> {
    let contents = line.contents();
    let Some(ix) = find_type_marker('%', contents, offset) else {
        return Err(line.error(offset, "Pattern name must be prefixed with '%'"));
    };
    let name_start = ix + 1;
    let (name, body_start) = parse_name_and_skip_space("pattern", line, contents, name_start)?;
    let def = UncookedDefinition::new(name.clone(), line, body_start, false);
    if !defs.patterns.insert(&name, def) {
        return Err(line.error(name_start, format!("Duplicate pattern definition for name '{name}'")));
    }
    Ok(())
}

fn read_template_header(
    line: &Arc<InputLine>,
    offset: usize,
    defs: &mut UncookedDefinitions,
) -> Result<(), DefinitionError> {
    let contents = line.contents();
    let Some(ix) = find_type_marker('@', contents, offset) else {
        return Err(line.error(offset, "Template name must be prefixed with '@'"));
    };
    let name_start = ix + 1;
    let (name, mut ix) = parse_name("template", line, contents, name_start, false)?;
    let parametric = match skip_empty_parens(contents, ix) {
        Some(past) => {
            ix = past;
            true
        }
        None => false,
    };
    let body_start = skip_space(contents, ix);
    if body_start == ix {
        return Err(line.error(ix, format!("Missing space character after template name '{name}'")));
    }
    let def = UncookedDefinition::new(name.clone(), line, body_start, parametric);
    if !defs.templates.insert(&name, def) {
        return Err(line.error(name_start, format!("Duplicate template definition for name '{name}'")));
    }
    Ok(())
}

fn read_extraction(
    lines: &mut LineReader,
    line: &Arc<InputLine>,
    offset: usize,
    defs: &mut UncookedDefinitions,
) -> Result<(), DefinitionError> {
    let contents = line.contents();
    let (name, ix) = parse_name_and_skip_space("extraction", line, contents, offset)?;
    if !only_remaining(contents, ix, '{') {
        return Err(line.error(
            ix,
            format!("Unexpected content for extraction '{name}': expected only opening '{{'"),
        ));
    }

    let mut template: Option<UncookedDefinition> = None;
    let mut append: Option<JsonMap> = None;

    loop {
        let Some(body_line) = lines.next_line()? else {
            return Err(lines.error(format!("Unexpected end-of-input in extraction '{name}' definition")));
        };
        let body = body_line.contents();
        let trimmed = trim_ws(body);
        if let Some(rest) = trimmed.strip_prefix('}') {
            if !trim_ws(rest).is_empty() {
                return Err(body_line.error(
                    0,
                    format!("Unexpected content after closing '}}' for extraction '{name}'"),
                ));
            }
            break;
        }

        let ix = skip_space(body, 0);
        let (prop, ix) = parse_name_and_skip_space("extraction property", &body_line, body, ix)?;
        match prop.as_str() {
            "template" => {
                if template.is_some() {
                    return Err(body_line.error(ix, format!("More than one 'template' specified for '{name}'")));
                }
                template = Some(UncookedDefinition::new(name.clone(), &body_line, ix, false));
            }
            "append" => {
                append = read_append(&body_line, ix, &body[ix..], append)?;
            }
            _ => {
                return Err(body_line.error(
                    0,
                    format!(
                        "Unrecognized extraction property \"{prop}\" encountered; expected one of {EXTRACTION_PROPERTIES}"
                    ),
                ));
            }
        }
    }

    let Some(template) = template else {
        return Err(line.error(offset, format!("Missing 'template' for extraction '{name}'")));
    };
    let extraction = UncookedExtraction { name: name.clone(), line: Arc::clone(line), template, append };
    if !defs.extractions.insert(&name, extraction) {
        return Err(line.error(offset, format!("Duplicate extraction definition for name '{name}'")));
    }
    Ok(())
}

/// Parses one `append` property value. The value is JSON; a bare key/value
/// sequence is wrapped in braces first. Multiple `append` lines merge
/// left-to-right, later values overwriting earlier keys in place.
fn read_append(
    line: &Arc<InputLine>,
    offset: usize,
    raw: &str,
    old: Option<JsonMap>,
) -> Result<Option<JsonMap>, DefinitionError> {
    let raw = trim_ws(raw);
    if raw.is_empty() {
        return Ok(old);
    }
    let wrapped;
    let doc = if raw.starts_with('{') {
        raw
    } else {
        wrapped = format!("{{{raw}}}");
        &wrapped
    };
    let value: serde_json::Value = serde_json::from_str(doc)
        .map_err(|e| line.error(offset, format!("Invalid JSON content to 'append': {e}")))?;
    let serde_json::Value::Object(map) = value else {
        return Err(line.error(
            offset,
            "Invalid 'append' value: must be JSON Object, or sequence of key/value pairs",
        ));
    };
    Ok(Some(match old {
        Some(mut merged) => {
            merged.extend(map);
            merged
        }
        None => map,
    }))
}

// --- Pattern bodies ----------------------------------------------------------

/// Pattern bodies are regex fragments: only `%` is special (`%%` escape,
/// `%name` reference, `%{...}` inline block whose contents pass through).
fn tokenize_pattern_body(def: &mut UncookedDefinition) -> Result<(), DefinitionError> {
    let line = Arc::clone(&def.line);
    let contents = line.contents();
    let end = contents.len();
    let mut ix = def.body_start;
    let mut buf = String::new();
    let mut literal_start = ix;

    while ix < end {
        let Some(c) = char_at(contents, ix) else { break };
        let c_end = ix + c.len_utf8();
        if c != '%' {
            buf.push(c);
            ix = c_end;
            continue;
        }
        if c_end >= end {
            return Err(line.error(c_end, format!("Orphan '%' at end of pattern '{}' definition", def.name)));
        }
        match char_at(contents, c_end) {
            Some('%') => {
                buf.push('%');
                ix = c_end + 1;
            }
            Some('{') => {
                let (text, past) = parse_inline_pattern(&line, contents, c_end + 1)?;
                buf.push_str(&text);
                ix = past;
            }
            _ => {
                let (name, past) = parse_name("pattern", &line, contents, c_end, false)?;
                if !buf.is_empty() {
                    def.parts.push(Piece::LiteralPattern(Literal {
                        loc: Loc::new(&line, literal_start),
                        text: std::mem::take(&mut buf),
                    }));
                }
                def.parts.push(Piece::PatternRef(NameRef { loc: Loc::new(&line, c_end), name }));
                ix = past;
                literal_start = ix;
            }
        }
    }

    if !buf.is_empty() {
        def.parts.push(Piece::LiteralPattern(Literal {
            loc: Loc::new(&line, literal_start),
            text: buf,
        }));
    }
    Ok(())
}

// --- Template and extractor bodies -------------------------------------------

/// Tokenizes template-style contents: `%`, `@` and `$` are markers, doubling
/// escapes them, everything else is literal text. With `paren_depth > 0` the
/// scan is inside an extractor expression and stops at the balancing `)`.
/// `params` is present only inside parametric template bodies; it both allows
/// positional references and records their kinds.
#[allow(clippy::too_many_arguments)]
fn tokenize_body(
    line: &Arc<InputLine>,
    mut ix: usize,
    defs: &UncookedDefinitions,
    out: &mut Vec<Piece>,
    owner: &str,
    mut paren_depth: u32,
    desc: &str,
    mut params: Option<&mut ParamCollector>,
) -> Result<usize, DefinitionError> {
    let contents = line.contents();
    let end = contents.len();
    let mut buf = String::new();
    let mut literal_start = ix;

    while ix < end {
        let Some(c) = char_at(contents, ix) else { break };
        let c_end = ix + c.len_utf8();

        if c == '%' || c == '@' || c == '$' {
            if c_end >= end {
                return Err(line.error(c_end, format!("Orphan '{c}' at end of {desc}")));
            }
            let Some(d) = char_at(contents, c_end) else { break };
            if d == c {
                buf.push(c);
                ix = c_end + d.len_utf8();
                continue;
            }
            if !buf.is_empty() {
                out.push(Piece::LiteralText(Literal {
                    loc: Loc::new(line, literal_start),
                    text: std::mem::take(&mut buf),
                }));
            }
            ix = c_end;
            match c {
                '%' => {
                    if d == '{' {
                        ix += 1;
                        let (text, past) = parse_inline_pattern(line, contents, ix)?;
                        out.push(Piece::LiteralPattern(Literal { loc: Loc::new(line, ix), text }));
                        ix = past;
                    } else {
                        let (name, past) = parse_name("pattern", line, contents, ix, false)?;
                        out.push(Piece::PatternRef(NameRef { loc: Loc::new(line, ix), name }));
                        ix = past;
                    }
                }
                '@' => {
                    ix = tokenize_template_reference(line, ix, defs, owner, desc, params.as_deref_mut(), out)?;
                }
                _ => {
                    let name_start = ix;
                    let (name, past) = parse_name("extractor", line, contents, ix, params.is_some())?;
                    ix = past;
                    let extr = match params.as_deref_mut() {
                        Some(vars) if is_all_digits(&name) => {
                            let pos = parse_position(line, name_start, &name, "extractor name", desc)?;
                            vars.add(line, name_start, pos, ParamKind::Extractor)?;
                            ExtractorExpr::positional(Loc::new(line, name_start), pos)
                        }
                        _ => ExtractorExpr::named(Loc::new(line, name_start), name),
                    };
                    if char_at(contents, ix) != Some('(') {
                        return Err(line.error(
                            ix,
                            format!(
                                "Invalid declaration for extractor '{}': missing opening parenthesis",
                                extr.display_name()
                            ),
                        ));
                    }
                    ix += 1;
                    let inner_desc = format!("extractor '{}' expression", extr.display_name());
                    let mut parts = Vec::new();
                    ix = tokenize_body(line, ix, defs, &mut parts, owner, 1, &inner_desc, params.as_deref_mut())?;
                    out.push(Piece::Extractor(extr.with_parts(parts)));
                }
            }
            literal_start = ix;
            continue;
        }

        ix = c_end;
        if paren_depth > 0 {
            if c == '(' {
                paren_depth += 1;
            } else if c == ')' {
                paren_depth -= 1;
                if paren_depth == 0 {
                    break;
                }
            }
        }
        buf.push(c);
    }

    if !buf.is_empty() {
        out.push(Piece::LiteralText(Literal { loc: Loc::new(line, literal_start), text: buf }));
    }
    if paren_depth > 0 {
        return Err(line.error(ix, format!("Missing closing parenthesis at end of {desc}")));
    }
    Ok(ix)
}

/// `@` was consumed; parses either a positional reference (`@N`, parametric
/// bodies only) or a named template reference, with an argument list when the
/// target is parametric.
fn tokenize_template_reference(
    line: &Arc<InputLine>,
    ix: usize,
    defs: &UncookedDefinitions,
    owner: &str,
    desc: &str,
    mut params: Option<&mut ParamCollector>,
    out: &mut Vec<Piece>,
) -> Result<usize, DefinitionError> {
    let contents = line.contents();
    let name_start = ix;
    let (name, mut ix) = parse_name("template", line, contents, ix, params.is_some())?;

    if let Some(vars) = params.as_deref_mut() {
        if is_all_digits(&name) {
            let pos = parse_position(line, name_start, &name, "template", desc)?;
            vars.add(line, name_start, pos, ParamKind::Template)?;
            out.push(Piece::TemplateParam(ParamRef {
                loc: Loc::new(line, name_start),
                owner: owner.to_string(),
                position: pos,
            }));
            return Ok(ix);
        }
    }

    let Some(target) = defs.find_template(&name) else {
        return Err(line.error(name_start, format!("Referencing non-existing template '@{name}' from {desc}")));
    };
    let reference = TemplateRef { loc: Loc::new(line, name_start), name: name.clone(), args: None };
    if target.parametric {
        let (args, past) = tokenize_template_args(line, ix, defs, desc, params, &reference)?;
        out.push(Piece::TemplateRef(reference.with_args(args)));
        ix = past;
    } else {
        if char_at(contents, ix) == Some('(') {
            return Err(line.error(ix, format!("Template '@{name}' takes no parameters")));
        }
        out.push(Piece::TemplateRef(reference));
    }
    Ok(ix)
}

/// Parses `(arg,arg,...)` after a parametric template reference. Arguments are
/// `@`-things (template references or `@N`) or `$`-things (extractor names or
/// `$N`), with no whitespace around separators.
fn tokenize_template_args(
    line: &Arc<InputLine>,
    mut ix: usize,
    defs: &UncookedDefinitions,
    desc: &str,
    mut params: Option<&mut ParamCollector>,
    reference: &TemplateRef,
) -> Result<(Vec<Piece>, usize), DefinitionError> {
    let contents = line.contents();
    let end = contents.len();
    if char_at(contents, ix) != Some('(') {
        return Err(line.error(ix, format!("Missing parameter list for template reference '@{}'", reference.name)));
    }
    ix += 1;

    let mut args = Vec::new();
    let mut first = true;
    while ix < end {
        let Some(mut c) = char_at(contents, ix) else { break };
        ix += c.len_utf8();
        if c == ')' {
            return Ok((args, ix));
        }
        if !first {
            if c != ',' {
                return Err(line.error(
                    ix,
                    format!(
                        "Unexpected character {} in template parameter list for '@{}': expected either ',' or ')'",
                        char_desc(c),
                        reference.name
                    ),
                ));
            }
            let Some(next) = char_at(contents, ix) else { break };
            c = next;
            ix += c.len_utf8();
        }
        first = false;

        match c {
            '@' => {
                ix = tokenize_template_reference(line, ix, defs, &reference.name, desc, params.as_deref_mut(), &mut args)?;
            }
            '$' => {
                ix = tokenize_extractor_arg(line, ix, desc, params.as_deref_mut(), &reference.name, &mut args)?;
            }
            _ => {
                return Err(line.error(
                    ix,
                    format!(
                        "Unexpected character {} in template parameter list for '@{}': expected either type marker '@' or closing ')'",
                        char_desc(c),
                        reference.name
                    ),
                ));
            }
        }
    }
    Err(line.error(ix, format!("Unexpected end of line within parameter list for template '@{}'", reference.name)))
}

/// `$` was consumed inside an argument list: either `$N` (parametric bodies)
/// or a bare extractor name being passed by name.
fn tokenize_extractor_arg(
    line: &Arc<InputLine>,
    ix: usize,
    desc: &str,
    params: Option<&mut ParamCollector>,
    owner: &str,
    out: &mut Vec<Piece>,
) -> Result<usize, DefinitionError> {
    let contents = line.contents();
    let name_start = ix;
    let (name, ix) = parse_name("extractor", line, contents, ix, params.is_some())?;
    match params {
        Some(vars) if is_all_digits(&name) => {
            let pos = parse_position(line, name_start, &name, "extractor", desc)?;
            vars.add(line, name_start, pos, ParamKind::Extractor)?;
            out.push(Piece::ExtractorParam(ParamRef {
                loc: Loc::new(line, name_start),
                owner: owner.to_string(),
                position: pos,
            }));
        }
        _ => {
            out.push(Piece::Extractor(ExtractorExpr::named(Loc::new(line, name_start), name)));
        }
    }
    Ok(ix)
}

// --- Scanning helpers ---------------------------------------------------------

fn char_at(contents: &str, ix: usize) -> Option<char> {
    contents.get(ix..).and_then(|rest| rest.chars().next())
}

fn is_ws(c: char) -> bool {
    (c as u32) <= 0x20
}

fn trim_ws(s: &str) -> &str {
    s.trim_matches(is_ws)
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn skip_space(contents: &str, mut ix: usize) -> usize {
    while let Some(c) = char_at(contents, ix) {
        if !is_ws(c) {
            break;
        }
        ix += c.len_utf8();
    }
    ix
}

/// Looks for the expected marker character within the leading non-whitespace
/// run starting at `ix`.
fn find_type_marker(marker: char, contents: &str, mut ix: usize) -> Option<usize> {
    while let Some(c) = char_at(contents, ix) {
        if c == marker {
            return Some(ix);
        }
        if is_ws(c) {
            break;
        }
        ix += c.len_utf8();
    }
    None
}

/// Skips a literal `()` at `ix` (the parametric-template declaration form).
fn skip_empty_parens(contents: &str, ix: usize) -> Option<usize> {
    contents.get(ix..).filter(|rest| rest.starts_with("()")).map(|_| ix + 2)
}

/// True when the rest of the line is exactly `marker`, ignoring whitespace.
fn only_remaining(contents: &str, ix: usize, marker: char) -> bool {
    match contents.get(ix..) {
        Some(rest) => {
            let rest = trim_ws(rest);
            rest.len() == marker.len_utf8() && rest.starts_with(marker)
        }
        None => false,
    }
}

/// Parses a name starting exactly at `ix`: quoted (`'...'` or `"..."`),
/// an identifier, or (only with `allow_numbers`) a digit run that a caller
/// may then treat as a positional parameter.
fn parse_name(
    kind: &str,
    line: &Arc<InputLine>,
    contents: &str,
    ix: usize,
    allow_numbers: bool,
) -> Result<(String, usize), DefinitionError> {
    let end = contents.len();
    let Some(c) = char_at(contents, ix) else {
        return Err(line.error(end, format!("Missing {kind} name")));
    };

    if c == '"' || c == '\'' {
        let body_start = ix + 1;
        let Some(rel) = contents[body_start..].find(c) else {
            return Err(line.error(end, format!("Missing closing quote ('{c}') for {kind} name")));
        };
        return Ok((contents[body_start..body_start + rel].to_string(), body_start + rel + 1));
    }

    if c.is_ascii_digit() {
        if !allow_numbers {
            return Err(line.error(
                ix,
                format!(
                    "Invalid variable reference instead of {kind} name: can not use variable references here (missing parenthesis after template name?)"
                ),
            ));
        }
        let mut j = ix;
        while matches!(char_at(contents, j), Some(d) if d.is_ascii_digit()) {
            j += 1;
        }
        return Ok((contents[ix..j].to_string(), j));
    }

    if !is_name_start(c) {
        return Err(line.error(ix, format!("Invalid character {} where {kind} name expected", char_desc(c))));
    }
    let mut j = ix + c.len_utf8();
    while let Some(n) = char_at(contents, j) {
        if !is_name_char(n) {
            break;
        }
        j += n.len_utf8();
    }
    Ok((contents[ix..j].to_string(), j))
}

/// Like [`parse_name`], then requires (and skips) trailing whitespace unless
/// the name ends the line.
fn parse_name_and_skip_space(
    kind: &str,
    line: &Arc<InputLine>,
    contents: &str,
    ix: usize,
) -> Result<(String, usize), DefinitionError> {
    let (name, mut ix) = parse_name(kind, line, contents, ix, false)?;
    if let Some(c) = char_at(contents, ix) {
        if !is_ws(c) {
            return Err(line.error(ix, format!("Missing space character after {kind} name '{name}'")));
        }
        ix = skip_space(contents, ix);
    }
    Ok((name, ix))
}

/// Finds the closing `}` of an inline pattern, honoring backslash escapes and
/// nested brace pairs. Returns the raw contents and the offset past `}`.
fn parse_inline_pattern(
    line: &Arc<InputLine>,
    contents: &str,
    start: usize,
) -> Result<(String, usize), DefinitionError> {
    let mut nesting = 1u32;
    let mut i = start;
    while let Some(c) = char_at(contents, i) {
        i += c.len_utf8();
        match c {
            '\\' => {
                if let Some(esc) = char_at(contents, i) {
                    i += esc.len_utf8();
                }
            }
            '{' => nesting += 1,
            '}' => {
                nesting -= 1;
                if nesting == 0 {
                    return Ok((contents[start..i - 1].to_string(), i));
                }
            }
            _ => {}
        }
    }
    Err(line.error(start, "Missing closing '}' for inline pattern"))
}

/// Validates an all-digits positional parameter reference.
fn parse_position(
    line: &Arc<InputLine>,
    offset: usize,
    digits: &str,
    what: &str,
    desc: &str,
) -> Result<u32, DefinitionError> {
    match digits.parse::<u32>() {
        Ok(pos) if (1..=MAX_PARAM_POSITION).contains(&pos) => Ok(pos),
        _ => Err(line.error(offset, format!("Invalid {what} parameter {digits} in {desc}"))),
    }
}

fn char_desc(c: char) -> String {
    if (c as u32) < 0x20 || c.is_control() {
        format!("code {:#06x}", c as u32)
    } else {
        format!("'{c}' (code {:#06x})", c as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::render_pieces as rendered;

    fn uncooked(text: &str) -> UncookedDefinitions {
        read_uncooked(&mut LineReader::new("<test>", text)).unwrap()
    }

    fn uncooked_err(text: &str) -> String {
        read_uncooked(&mut LineReader::new("<test>", text)).unwrap_err().message().to_string()
    }

    #[test]
    fn pattern_bodies_tokenize_refs_and_escapes() {
        let defs = uncooked("pattern %a foo%%bar\npattern %b x%a!\n");
        let a = defs.find_pattern("a").unwrap();
        assert_eq!(rendered(&a.parts), "pat(foo%bar)");
        let b = defs.find_pattern("b").unwrap();
        assert_eq!(rendered(&b.parts), "pat(x) | %a | pat(!)");
    }

    #[test]
    fn pattern_names_may_be_quoted() {
        let defs = uncooked("pattern %'odd name' [a-z]+\npattern %use x%'odd name'y\n");
        assert!(defs.find_pattern("odd name").is_some());
        let user = defs.find_pattern("use").unwrap();
        assert_eq!(rendered(&user.parts), "pat(x) | %odd name | pat(y)");

        let defs = uncooked("pattern %\"with space\" [0-9]+\npattern %use a%\"with space\"b\n");
        assert!(defs.find_pattern("with space").is_some());
        let user = defs.find_pattern("use").unwrap();
        assert_eq!(rendered(&user.parts), "pat(a) | %with space | pat(b)");
    }

    #[test]
    fn template_bodies_mix_text_refs_and_extractors() {
        let defs = uncooked("pattern %w \\w+\ntemplate @t a $v(%w) b\n");
        let t = defs.find_template("t").unwrap();
        assert_eq!(rendered(&t.parts), "text(a ) | $v(%w) | text( b)");
    }

    #[test]
    fn doubled_markers_are_escapes() {
        let defs = uncooked("template @t 100%% @@ $$\n");
        let t = defs.find_template("t").unwrap();
        assert_eq!(rendered(&t.parts), "text(100% @ $)");
    }

    #[test]
    fn inline_patterns_nest_and_honor_escapes() {
        let defs = uncooked(r"template @t %{a{2}\}b}!");
        let t = defs.find_template("t").unwrap();
        assert_eq!(rendered(&t.parts), r"pat(a{2}\}b) | text(!)");
    }

    #[test]
    fn orphan_marker_at_end_is_an_error() {
        let msg = uncooked_err("template @t abc@\n");
        assert!(msg.contains("Orphan '@'"), "got: {msg}");
    }

    #[test]
    fn unterminated_extractor_is_an_error() {
        let msg = uncooked_err("template @t $v(abc\n");
        assert!(msg.contains("Missing closing parenthesis"), "got: {msg}");
    }

    #[test]
    fn extractor_requires_parenthesized_body() {
        let msg = uncooked_err("template @t $v next\n");
        assert!(msg.contains("missing opening parenthesis"), "got: {msg}");
    }

    #[test]
    fn unknown_template_reference_is_an_error() {
        let msg = uncooked_err("template @t @nope\n");
        assert!(msg.contains("Referencing non-existing template '@nope'"), "got: {msg}");
    }

    #[test]
    fn parametric_bodies_collect_positional_signature() {
        let defs = uncooked("pattern %w \\w+\ntemplate @pair() @1=$2(%w)\n");
        let t = defs.find_template("pair").unwrap();
        assert!(t.parametric);
        assert_eq!(rendered(&t.parts), "@#1 | text(=) | $$2(%w)");
        let sig = t.signature.as_ref().unwrap();
        assert_eq!(sig.len(), 2);
        assert_eq!(sig.kind(1), ParamKind::Template);
        assert_eq!(sig.kind(2), ParamKind::Extractor);
    }

    #[test]
    fn inconsistent_parameter_kinds_are_rejected() {
        let msg = uncooked_err("template @bad() @1 $1(x)\n");
        assert!(msg.contains("Inconsistent references to parameter 1"), "got: {msg}");
    }

    #[test]
    fn unreferenced_parameter_slot_is_rejected() {
        let msg = uncooked_err("template @bad() end=$2(x)\n");
        assert!(msg.contains("never referenced"), "got: {msg}");
    }

    #[test]
    fn positional_references_need_a_parametric_body() {
        let msg = uncooked_err("template @t @1\n");
        assert!(msg.contains("can not use variable references here"), "got: {msg}");
    }

    #[test]
    fn parametric_reference_arguments_tokenize() {
        let defs = uncooked(concat!(
            "pattern %w \\w+\n",
            "template @kv() @1=$2(%w)\n",
            "template @val V\n",
            "template @line @kv(@val,$first)\n",
        ));
        let line = defs.find_template("line").unwrap();
        assert_eq!(rendered(&line.parts), "@kv(@val,$first())");
    }

    #[test]
    fn argument_lists_reject_whitespace() {
        let msg = uncooked_err(concat!(
            "template @kv() @1.\n",
            "template @val V\n",
            "template @line @kv(@val, @val)\n",
        ));
        assert!(msg.contains("Unexpected character"), "got: {msg}");
    }

    #[test]
    fn non_parametric_reference_rejects_argument_list() {
        let msg = uncooked_err("template @x X\ntemplate @t @x(y)\n");
        assert!(msg.contains("takes no parameters"), "got: {msg}");
    }

    #[test]
    fn extraction_blocks_parse_template_and_append() {
        let defs = uncooked(concat!(
            "pattern %w \\w+\n",
            "template @t v=$v(%w)\n",
            "extract First {\n",
            "  template @t\n",
            "  append \"a\":1\n",
            "  append \"b\":2,\"a\":3\n",
            "}\n",
        ));
        assert_eq!(defs.extractions.len(), 1);
        let x = defs.extractions.get("First").unwrap();
        assert_eq!(rendered(&x.template.parts), "@t");
        let append = x.append.as_ref().unwrap();
        assert_eq!(append["a"], serde_json::json!(3));
        assert_eq!(append["b"], serde_json::json!(2));
        let keys: Vec<&str> = append.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn extraction_without_template_is_an_error() {
        let msg = uncooked_err("extract X {\n  append \"a\":1\n}\n");
        assert!(msg.contains("Missing 'template'"), "got: {msg}");
    }

    #[test]
    fn repeated_template_property_is_an_error() {
        let msg = uncooked_err(concat!(
            "template @t X\n",
            "extract X {\n",
            "  template @t\n",
            "  template @t\n",
            "}\n",
        ));
        assert!(msg.contains("More than one 'template'"), "got: {msg}");
    }

    #[test]
    fn unterminated_extraction_block_is_an_error() {
        let msg = uncooked_err("template @t X\nextract X {\n  template @t\n");
        assert!(msg.contains("Unexpected end-of-input in extraction"), "got: {msg}");
    }

    #[test]
    fn duplicate_pattern_names_are_rejected() {
        let msg = uncooked_err("pattern %a x\npattern %a y\n");
        assert!(msg.contains("Duplicate pattern definition"), "got: {msg}");
    }

    #[test]
    fn unrecognized_keyword_is_an_error() {
        let msg = uncooked_err("flubber %a x\n");
        assert!(msg.contains("Unrecognized keyword"), "got: {msg}");
    }

    #[test]
    fn line_without_keyword_is_an_error() {
        let msg = uncooked_err("%a x\n");
        assert!(msg.contains("No keyword found"), "got: {msg}");
    }
}
