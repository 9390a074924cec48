use std::sync::LazyLock;

use regex_lite::Regex;

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) (\w+)( (.+))?").expect("status line pattern"));

/// Find the first status line in `chunk`: `<code> <word>[ <context>]`.
///
/// The status word carries no information beyond matching the grammar. A code
/// that does not fit an `i32` is treated as no match.
pub fn status_line(chunk: &str) -> Option<(i32, Option<&str>)> {
    let captures = STATUS_LINE.captures(chunk)?;
    let code = captures.get(1)?.as_str().parse().ok()?;
    let context = captures.get(4).map(|m| m.as_str());
    Some((code, context))
}
