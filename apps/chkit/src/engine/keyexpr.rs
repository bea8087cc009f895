//! Paren- and quote-aware splitting of key-clause expressions (§9).
//!
//! A declared `primaryKey`/`orderBy`/`uniqueKey` entry may itself be a
//! comma-delimited compound expression, e.g. `"a, b, (c, d)"` is one
//! expression containing a tuple, not three columns. Splitting naively on
//! `,` would misidentify `(c, d)`'s inner comma as a top-level separator.

/// Split `expr` on commas that are not nested inside parentheses or quoted
/// strings (`'`, `"`, `` ` ``), returning trimmed, non-empty pieces.
pub fn split_top_level_commas(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in expr.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Split a full key clause (list of entries, each possibly compound) into a
/// flat list of bare column names referenced by it.
pub fn flatten_key_columns(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|e| split_top_level_commas(e))
        .collect()
}
