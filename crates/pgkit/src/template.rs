//! `{name}` placeholder substitution for seed SQL files.
//!
//! Syntax:
//! - `{name}` is replaced by the value of `name`
//! - `{{` and `}}` produce literal braces
//! - anything else involving braces is malformed
//!
//! Rendering never leaves a placeholder behind: an unknown name fails with
//! [`Error::MissingTemplateVariable`].

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Placeholder name to value.
pub type TemplateVariables = BTreeMap<String, String>;

/// Render `template`, substituting every placeholder from `vars`.
pub fn render(template: &str, vars: &TemplateVariables) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, next)| next == '{').is_some() {
                    out.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(malformed(offset, "nested '{' inside placeholder"));
                        }
                        other => name.push(other),
                    }
                }

                if !closed {
                    return Err(malformed(offset, "unclosed '{'"));
                }
                if name.trim().is_empty() {
                    return Err(malformed(offset, "empty placeholder"));
                }

                let value = vars
                    .get(&name)
                    .ok_or_else(|| Error::MissingTemplateVariable { name: name.clone() })?;
                out.push_str(value);
            }
            '}' => {
                if chars.next_if(|&(_, next)| next == '}').is_some() {
                    out.push('}');
                } else {
                    return Err(malformed(offset, "single '}' encountered"));
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Names of all placeholders in `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    let mut collector = TemplateVariables::new();

    // Render against a growing map so escapes and errors follow one code path.
    loop {
        match render(template, &collector) {
            Ok(_) => return Ok(names),
            Err(Error::MissingTemplateVariable { name }) => {
                collector.insert(name.clone(), String::new());
                names.push(name);
            }
            Err(e) => return Err(e),
        }
    }
}

fn malformed(offset: usize, message: &str) -> Error {
    Error::MalformedTemplate {
        offset,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVariables {
        [
            ("schema_cadastro", "cadastro"),
            ("schema_planejamento", "planejamento"),
            ("user_importacao", "sigma_importacao"),
            ("group_importacao", "gimportacao_sigma"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_substitutes_placeholders() {
        let sql = "INSERT INTO {schema_cadastro}.pessoa VALUES (1);\n\
                   GRANT USAGE ON SCHEMA {schema_cadastro} TO {group_importacao};";
        let out = render(sql, &vars()).unwrap();
        assert_eq!(
            out,
            "INSERT INTO cadastro.pessoa VALUES (1);\n\
             GRANT USAGE ON SCHEMA cadastro TO gimportacao_sigma;"
        );
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let sql = "SELECT 1;\n-- comment with 'quotes' and $$dollars$$\n";
        assert_eq!(render(sql, &vars()).unwrap(), sql);
        assert_eq!(render("", &vars()).unwrap(), "");
    }

    #[test]
    fn test_escaped_braces() {
        let sql = "SELECT '{{\"a\": 1}}'::json, '{schema_planejamento}';";
        assert_eq!(
            render(sql, &vars()).unwrap(),
            "SELECT '{\"a\": 1}'::json, 'planejamento';"
        );
    }

    #[test]
    fn test_missing_variable_fails() {
        let err = render("SELECT * FROM {schema_financeiro}.conta;", &vars()).unwrap_err();
        assert!(matches!(err, Error::MissingTemplateVariable { name } if name == "schema_financeiro"));
    }

    #[test]
    fn test_missing_variable_fails_deterministically() {
        let sql = "{nope} {schema_cadastro}";
        for _ in 0..3 {
            assert!(matches!(
                render(sql, &vars()),
                Err(Error::MissingTemplateVariable { .. })
            ));
        }
    }

    #[test]
    fn test_malformed_templates() {
        for bad in ["SELECT '{", "a } b", "{}", "{ }", "{a{b}}"] {
            let err = render(bad, &vars()).unwrap_err();
            assert!(
                matches!(err, Error::MalformedTemplate { .. }),
                "expected malformed for {bad:?}, got {err}"
            );
        }
    }

    #[test]
    fn test_malformed_offset_points_at_brace() {
        match render("abc {def", &vars()) {
            Err(Error::MalformedTemplate { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_multibyte_text_preserved() {
        let sql = "-- Configuração {schema_cadastro} ✓";
        assert_eq!(render(sql, &vars()).unwrap(), "-- Configuração cadastro ✓");
    }

    #[test]
    fn test_placeholders_listing() {
        let names = placeholders("{b} {{x}} {a} {b}").unwrap();
        assert_eq!(names, vec!["b", "a"]);
        assert!(placeholders("{").is_err());
    }
}
