//! `${VAR}` expansion for configured path strings.
//!
//! Tool-home strings may reference node environment variables
//! (`${HOME}/tools`). Expansion substitutes what the lookup knows and
//! leaves unknown references in place; callers that require a fully
//! resolved string follow up with [`ensure_fully_expanded`].

use crate::{Error, Result};

/// Substitute `${NAME}` references using the given lookup.
///
/// Unknown names are left verbatim. `$NAME` without braces is not a
/// reference.
#[must_use]
pub fn expand_variables(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    if !input.contains("${") {
        return input.to_string();
    }
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => result.push_str(&value),
                    None => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated reference; keep the tail as-is.
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// Fail if a string still contains unresolved `${` references.
pub fn ensure_fully_expanded(field_name: &str, value: &str) -> Result<()> {
    if value.contains("${") {
        return Err(Error::configuration(format!(
            "can't resolve all variables in {field_name}, final state: {value}"
        )));
    }
    Ok(())
}
