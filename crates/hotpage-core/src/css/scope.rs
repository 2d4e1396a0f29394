//! Class-selector scoping scanner.
//!
//! Walks a stylesheet block by block. Class selectors are rewritten only in
//! rule preludes; declaration values, strings, comments and at-rule preludes
//! are copied verbatim. `@media`-like blocks are descended into, `@keyframes`
//! and friends are not. `:global(...)` keeps its contents unscoped and
//! `:local(...)` scopes them; both wrappers are removed.

use std::collections::BTreeMap;

/// At-rules whose block holds further style rules.
const NESTING_AT_RULES: &[&str] = &["media", "supports", "layer", "container", "document", "scope"];

/// A scanning failure with its 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeError {
    pub line: u32,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    /// Top level or inside `@media` and friends: preludes are selectors.
    Rules,
    /// Inside a style rule: declarations, plus nested rules.
    Declarations,
    /// Inside `@keyframes`, `@font-face`, ...: copied verbatim.
    Opaque,
}

/// Rewrite every local class selector in `css` through `rename`.
///
/// Returns the rewritten stylesheet and the original → scoped class map.
pub fn scope_classes(
    css: &str,
    mut rename: impl FnMut(&str) -> String,
) -> Result<(String, BTreeMap<String, String>), ScopeError> {
    let mut out = String::with_capacity(css.len() + css.len() / 4);
    let mut classes = BTreeMap::new();
    let mut stack: Vec<(Block, u32)> = Vec::new();
    let mut segment = String::new();
    let mut line: u32 = 1;

    let chars: Vec<char> = css.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        let c = chars[i];

        if c == '/' && i + 1 < len && chars[i + 1] == '*' {
            let start_line = line;
            let end = skip_comment(&chars, i, &mut line).ok_or_else(|| ScopeError {
                line: start_line,
                message: "unterminated comment".to_string(),
            })?;
            segment.extend(&chars[i..end]);
            i = end;
            continue;
        }

        if c == '"' || c == '\'' {
            let end = skip_string(&chars, i).ok_or_else(|| ScopeError {
                line,
                message: "unterminated string".to_string(),
            })?;
            segment.extend(&chars[i..end]);
            i = end;
            continue;
        }

        match c {
            '{' => {
                let context = stack.last().map_or(Block::Rules, |(b, _)| *b);
                let (prelude_is_selector, inner) = classify_prelude(&segment, context);
                if prelude_is_selector {
                    out.push_str(&rewrite_selector(&segment, &mut rename, &mut classes));
                } else {
                    out.push_str(&segment);
                }
                out.push('{');
                segment.clear();
                stack.push((inner, line));
            }
            '}' => {
                out.push_str(&segment);
                out.push('}');
                segment.clear();
                if stack.pop().is_none() {
                    return Err(ScopeError {
                        line,
                        message: "unexpected '}'".to_string(),
                    });
                }
            }
            ';' => {
                out.push_str(&segment);
                out.push(';');
                segment.clear();
            }
            _ => {
                if c == '\n' {
                    line += 1;
                }
                segment.push(c);
            }
        }
        i += 1;
    }

    if let Some((_, open_line)) = stack.last() {
        return Err(ScopeError {
            line: *open_line,
            message: "unclosed block".to_string(),
        });
    }
    out.push_str(&segment);
    Ok((out, classes))
}

/// Decide whether a prelude ending at `{` is a selector, and which block it opens.
fn classify_prelude(prelude: &str, context: Block) -> (bool, Block) {
    if context == Block::Opaque {
        return (false, Block::Opaque);
    }
    let trimmed = strip_comments(prelude);
    let trimmed = trimmed.trim_start();
    if let Some(at_rule) = trimmed.strip_prefix('@') {
        let name: String = at_rule
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect::<String>()
            .to_ascii_lowercase();
        if NESTING_AT_RULES.contains(&name.as_str()) {
            return (false, context);
        }
        return (false, Block::Opaque);
    }
    (true, Block::Declarations)
}

/// Rewrite class selectors in one prelude.
fn rewrite_selector(
    prelude: &str,
    rename: &mut impl FnMut(&str) -> String,
    classes: &mut BTreeMap<String, String>,
) -> String {
    let chars: Vec<char> = prelude.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(prelude.len() + 16);
    // Paren depths at which a :global( / :local( wrapper closes.
    let mut wrappers: Vec<(usize, bool)> = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    let mut dummy_line = 0;

    while i < len {
        let c = chars[i];

        if c == '/' && i + 1 < len && chars[i + 1] == '*' {
            let end = skip_comment(&chars, i, &mut dummy_line).unwrap_or(len);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }
        if c == '"' || c == '\'' {
            let end = skip_string(&chars, i).unwrap_or(len);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }

        if c == ':' {
            if let Some((global, consumed)) = scope_wrapper_at(&chars, i) {
                depth += 1;
                wrappers.push((depth, global));
                i += consumed;
                continue;
            }
        }

        match c {
            '(' => {
                depth += 1;
                out.push(c);
            }
            ')' => {
                if wrappers.last().is_some_and(|(d, _)| *d == depth) {
                    wrappers.pop();
                } else {
                    out.push(c);
                }
                depth = depth.saturating_sub(1);
            }
            '.' if i + 1 < len && is_ident_start(&chars, i + 1) => {
                let end = ident_end(&chars, i + 1);
                let name: String = chars[i + 1..end].iter().collect();
                let global = wrappers.last().is_some_and(|(_, g)| *g);
                out.push('.');
                if global {
                    out.push_str(&name);
                } else {
                    let scoped = classes
                        .entry(name.clone())
                        .or_insert_with(|| rename(&name))
                        .clone();
                    out.push_str(&scoped);
                }
                i = end;
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

/// Detect `:global(` or `:local(` at `pos`. Returns (is_global, chars consumed).
fn scope_wrapper_at(chars: &[char], pos: usize) -> Option<(bool, usize)> {
    for (word, global) in [(":global(", true), (":local(", false)] {
        let w: Vec<char> = word.chars().collect();
        if chars.len() >= pos + w.len() && chars[pos..pos + w.len()] == w[..] {
            return Some((global, w.len()));
        }
    }
    None
}

fn is_ident_start(chars: &[char], pos: usize) -> bool {
    let c = chars[pos];
    if c.is_ascii_alphabetic() || c == '_' || !c.is_ascii() || c == '\\' {
        return true;
    }
    if c == '-' {
        return chars
            .get(pos + 1)
            .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_' || *n == '-' || !n.is_ascii());
    }
    false
}

fn ident_end(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            i += 2;
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii() {
            i += 1;
        } else {
            break;
        }
    }
    i
}

/// Index just past the `*/` closing the comment that starts at `start`.
fn skip_comment(chars: &[char], start: usize, line: &mut u32) -> Option<usize> {
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return Some(i + 2);
        }
        if chars[i] == '\n' {
            *line += 1;
        }
        i += 1;
    }
    None
}

/// Index just past the closing quote of the string starting at `start`.
fn skip_string(chars: &[char], start: usize) -> Option<usize> {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' => return None,
            c if c == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}
