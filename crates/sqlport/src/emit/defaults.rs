//! Column default expression rewriting.
//!
//! Source catalogs report defaults as raw expression text (`((0))`,
//! `(getdate())`, `'abc'::character varying`). Recognized shapes are
//! rewritten for the target; anything else is copied verbatim and flagged
//! for review when the dialects differ.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::traits::Dialect;
use crate::dialect::DbKind;

use super::TargetColumn;

/// Trailing PostgreSQL casts such as `::character varying(20)` or `::text[]`.
const CASTS: &str = r"(?:::[a-z_][a-z0-9_ ]*(?:\(\d+(?:,\s*\d+)?\))?(?:\[\])?)*";

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\(?([+-]?\d+(?:\.\d+)?)\)?{}$", CASTS)).expect("valid regex")
});

static STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^N?'((?:[^']|'')*)'{}$", CASTS)).expect("valid regex")
});

static BOOLEAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^(true|false){}$", CASTS)).expect("valid regex")
});

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:getdate|sysdatetime|current_timestamp|now|sysdate|systimestamp|localtimestamp)(?:\s*\(\s*\))?$",
    )
    .expect("valid regex")
});

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:newid|newsequentialid|gen_random_uuid|uuid_generate_v4)\s*\(\s*\)$")
        .expect("valid regex")
});

/// Rewrite a default expression from `source` for the target dialect.
pub fn rewrite(definition: &str, source: DbKind, dialect: &dyn Dialect, column: &TargetColumn) -> String {
    let expr = strip_parens(definition.trim());

    if let Some(caps) = NUMBER.captures(expr) {
        let number = &caps[1];
        if column.boolean {
            match number {
                "0" => return dialect.bool_literal(false),
                "1" => return dialect.bool_literal(true),
                _ => {}
            }
        }
        return number.to_string();
    }
    if let Some(caps) = BOOLEAN.captures(expr) {
        return dialect.bool_literal(caps[1].eq_ignore_ascii_case("true"));
    }
    if let Some(caps) = STRING.captures(expr) {
        let value = caps[1].replace("''", "'");
        return dialect.string_literal(&value, column.wide);
    }
    if TIMESTAMP.is_match(expr) {
        return dialect.current_timestamp().to_string();
    }
    if UUID.is_match(expr) {
        return dialect.new_uuid().to_string();
    }

    if source == dialect.kind() {
        expr.to_string()
    } else {
        format!(
            "{} /* REVIEW: default copied verbatim from {} */",
            expr, source
        )
    }
}

/// Remove parentheses wrapping the whole expression, however deeply nested.
fn strip_parens(mut expr: &str) -> &str {
    while expr.starts_with('(') && expr.ends_with(')') && wraps_whole(expr) {
        expr = expr[1..expr.len() - 1].trim();
    }
    expr
}

/// Whether the opening parenthesis at position 0 closes at the last byte.
fn wraps_whole(expr: &str) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, c) in expr.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == expr.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}
