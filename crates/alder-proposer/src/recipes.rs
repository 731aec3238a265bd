//! Edit recipes: mechanical transformations from a classified error to a
//! candidate patch. The resilient supervisor applies the same recipes at
//! startup, so boot-time and runtime healing stay symmetric.

use crate::snapshot::content_hash;
use alder_types::{CandidatePatch, RecipeKind};
use regex::Regex;

/// The slice of an error record a recipe needs.
#[derive(Clone, Debug)]
pub struct ErrorContext {
    pub error_class: String,
    pub message: String,
    /// 1-based line the error points at, when known.
    pub line: u32,
}

/// Render a recipe against the current content of `target`. Returns `None`
/// when the recipe does not apply (nothing to edit, pattern absent).
pub fn apply_recipe(
    kind: RecipeKind,
    target: &str,
    content: &str,
    context: &ErrorContext,
) -> Option<CandidatePatch> {
    let new_content = match kind {
        RecipeKind::RemoveIncorrectAwait => remove_incorrect_await(content, context)?,
        RecipeKind::AddMissingMethodShim => add_missing_method_shim(content, context)?,
        RecipeKind::AddMissingImport => add_missing_import(content, context)?,
        RecipeKind::NormalizeSerialization => normalize_serialization(content, context)?,
        RecipeKind::ExtendTimeout => extend_timeout(content, context)?,
    };
    if new_content == content {
        return None;
    }
    Some(CandidatePatch::whole_file(
        target,
        content_hash(content),
        new_content,
        format!("{} at {}:{}", kind, target, context.line),
    ))
}

/// Drop an `await ` that precedes a non-awaitable call on the error line.
fn remove_incorrect_await(content: &str, context: &ErrorContext) -> Option<String> {
    edit_line(content, context.line, |line| {
        if line.contains("await ") {
            Some(line.replacen("await ", "", 1))
        } else {
            None
        }
    })
}

/// Append a shim for the attribute the traceback says is missing.
fn add_missing_method_shim(content: &str, context: &ErrorContext) -> Option<String> {
    let attribute = Regex::new(r"has no attribute '(\w+)'")
        .ok()?
        .captures(&context.message)?
        .get(1)?
        .as_str()
        .to_string();
    if content.contains(&format!("def {attribute}")) {
        return None;
    }
    let mut out = content.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!(
        "\n\ndef {attribute}(*args, **kwargs):\n    raise NotImplementedError(\"{attribute} shim\")\n"
    ));
    Some(out)
}

/// Insert an import for the name the error says is missing.
fn add_missing_import(content: &str, context: &ErrorContext) -> Option<String> {
    let module = Regex::new(r"[Nn]o module named '([\w\.]+)'")
        .ok()?
        .captures(&context.message)
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
        .or_else(|| {
            Regex::new(r"name '(\w+)' is not defined")
                .ok()?
                .captures(&context.message)
                .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
        })?;
    let import_line = format!("import {module}");
    if content.lines().any(|l| l.trim() == import_line) {
        return None;
    }
    Some(format!("{import_line}\n{content}"))
}

/// Add a stringifying fallback to the serialization call on the error line.
fn normalize_serialization(content: &str, context: &ErrorContext) -> Option<String> {
    edit_line(content, context.line, |line| {
        if !line.contains("json.dumps(") || line.contains("default=") {
            return None;
        }
        let close = line.rfind(')')?;
        let mut edited = line.to_string();
        edited.insert_str(close, ", default=str");
        Some(edited)
    })
}

/// Double the numeric timeout on the error line.
fn extend_timeout(content: &str, context: &ErrorContext) -> Option<String> {
    let regex = Regex::new(r"timeout\s*=\s*(\d+)").ok()?;
    edit_line(content, context.line, |line| {
        let captures = regex.captures(line)?;
        let value: u64 = captures.get(1)?.as_str().parse().ok()?;
        let doubled = regex
            .replace(line, format!("timeout={}", value.saturating_mul(2)))
            .into_owned();
        Some(doubled)
    })
}

/// Apply `edit` to the 1-based `line`; `None` when out of range or the
/// edit does not apply.
fn edit_line<F>(content: &str, line: u32, edit: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if line == 0 {
        return None;
    }
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let index = (line - 1) as usize;
    let target = lines.get(index)?;
    let edited = edit(target)?;
    lines[index] = edited;
    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    Some(out)
}
