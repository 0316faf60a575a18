//! `$var` / `${var}` placeholder substitution.

use std::collections::HashMap;

/// What to do with a placeholder that has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingVar {
    /// Fail, reporting the variable name.
    Error,
    /// Leave the placeholder text in the output.
    Preserve,
}

/// Substitute placeholders in `template` from `vars`.
///
/// Recognized forms: `$name` (name = ASCII alphanumerics and `_`,
/// starting with a letter or `_`) and `${name}`. `$$` yields a literal
/// `$`. A bare `$` followed by anything else passes through unchanged.
///
/// Returns the missing variable's name as the error in
/// [`MissingVar::Error`] mode.
pub fn substitute(
    template: &str,
    vars: &HashMap<String, String>,
    missing: MissingVar,
) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, nc) in chars.by_ref() {
                    if nc == '}' {
                        closed = true;
                        break;
                    }
                    name.push(nc);
                }
                if !closed {
                    // Unterminated brace: emit as-is.
                    out.push_str("${");
                    out.push_str(&name);
                    continue;
                }
                match vars.get(&name) {
                    Some(value) => out.push_str(value),
                    None => match missing {
                        MissingVar::Error => return Err(name),
                        MissingVar::Preserve => {
                            out.push_str("${");
                            out.push_str(&name);
                            out.push('}');
                        }
                    },
                }
            }
            Some((_, nc)) if nc.is_ascii_alphabetic() || *nc == '_' => {
                let mut name = String::new();
                while let Some((_, nc)) = chars.peek() {
                    if nc.is_ascii_alphanumeric() || *nc == '_' {
                        name.push(*nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match vars.get(&name) {
                    Some(value) => out.push_str(value),
                    None => match missing {
                        MissingVar::Error => return Err(name),
                        MissingVar::Preserve => {
                            out.push('$');
                            out.push_str(&name);
                        }
                    },
                }
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn bare_and_braced_forms() {
        let out = substitute(
            "$a and ${b}!",
            &vars(&[("a", "1"), ("b", "2")]),
            MissingVar::Error,
        )
        .unwrap();
        assert_eq!(out, "1 and 2!");
    }

    #[test]
    fn dollar_escape() {
        let out = substitute("costs $$5", &vars(&[]), MissingVar::Error).unwrap();
        assert_eq!(out, "costs $5");
    }

    #[test]
    fn bare_dollar_before_digit_passes_through() {
        let out = substitute("win $100", &vars(&[]), MissingVar::Error).unwrap();
        assert_eq!(out, "win $100");
    }

    #[test]
    fn name_stops_at_non_word_char() {
        let out = substitute("$who's stream", &vars(&[("who", "mika")]), MissingVar::Error)
            .unwrap();
        assert_eq!(out, "mika's stream");
    }

    #[test]
    fn missing_error_mode_names_the_variable() {
        let err = substitute("$gone", &vars(&[]), MissingVar::Error).unwrap_err();
        assert_eq!(err, "gone");
    }

    #[test]
    fn missing_preserve_mode_keeps_placeholder() {
        let out = substitute("$gone and ${also}", &vars(&[]), MissingVar::Preserve).unwrap();
        assert_eq!(out, "$gone and ${also}");
    }

    #[test]
    fn unterminated_brace_is_literal() {
        let out = substitute("${open", &vars(&[]), MissingVar::Preserve).unwrap();
        assert_eq!(out, "${open");
    }

    #[test]
    fn substitution_is_pure() {
        let v = vars(&[("a", "x")]);
        let first = substitute("$a$a", &v, MissingVar::Error).unwrap();
        let second = substitute("$a$a", &v, MissingVar::Error).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "xx");
    }
}
