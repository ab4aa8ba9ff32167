/// Text templates with `{name}` placeholders, used for greetings and threat lines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Placeholder filled from the render variables: `{name}`.
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string.
    ///
    /// Syntax:
    /// - `{name}` → `Var`
    /// - `{{` / `}}` → literal brace
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }

                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => {
                                return Err(TemplateError::Parse(
                                    "nested braces are not allowed".to_string(),
                                ))
                            }
                            _ => name.push(c),
                        }
                    }

                    if !closed {
                        return Err(TemplateError::Parse("unclosed brace".to_string()));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TemplateError::Parse("empty braces".to_string()));
                    }
                    segments.push(Segment::Var(name.to_string()));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(TemplateError::Parse(
                        "unmatched closing brace".to_string(),
                    ))
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Template { segments })
    }

    /// Fill placeholders from `vars`. Unknown placeholders are written back
    /// in braces so a missing variable is visible rather than silent.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => {
                    match vars.iter().find(|(key, _)| *key == name.as_str()) {
                        Some((_, value)) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                }
            }
        }
        out
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Var(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

/// Parse and render in one step. Content is validated on load, so a parse
/// failure here only logs and falls back to the raw text.
pub fn render(input: &str, vars: &[(&str, &str)]) -> String {
    match Template::parse(input) {
        Ok(template) => template.render(vars),
        Err(e) => {
            tracing::warn!("unrenderable template {:?}: {}", input, e);
            input.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literal_only() {
        let t = Template::parse("Hello, world.").unwrap();
        assert_eq!(t.segments, vec![Segment::Literal("Hello, world.".to_string())]);
    }

    #[test]
    fn parse_variable() {
        let t = Template::parse("Welcome, {player}.").unwrap();
        assert_eq!(t.segments.len(), 3);
        assert_eq!(t.segments[1], Segment::Var("player".to_string()));
        assert_eq!(t.variables().collect::<Vec<_>>(), vec!["player"]);
    }

    #[test]
    fn parse_escaped_braces() {
        let t = Template::parse("Use {{braces}} here.").unwrap();
        assert_eq!(
            t.segments,
            vec![Segment::Literal("Use {braces} here.".to_string())]
        );
    }

    #[test]
    fn parse_errors() {
        assert!(Template::parse("Bad {} here").is_err());
        assert!(Template::parse("Bad {outer{inner}} here").is_err());
        assert!(Template::parse("Bad {unclosed here").is_err());
        assert!(Template::parse("Bad } here").is_err());
    }

    #[test]
    fn render_substitutes_known_variables() {
        let t = Template::parse("[{agent}]: Your doubt grows, {target}.").unwrap();
        assert_eq!(
            t.render(&[("agent", "JUDAS"), ("target", "MARIA")]),
            "[JUDAS]: Your doubt grows, MARIA."
        );
    }

    #[test]
    fn render_keeps_unknown_variables_visible() {
        let t = Template::parse("Hello {player}, {mood}.").unwrap();
        assert_eq!(t.render(&[("player", "ANA")]), "Hello ANA, {mood}.");
    }

    #[test]
    fn render_helper_falls_back_to_raw_text() {
        assert_eq!(render("Broken {", &[]), "Broken {");
        assert_eq!(render("Hi {p}", &[("p", "you")]), "Hi you");
    }
}
