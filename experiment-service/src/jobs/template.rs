// Command Templates
// Scans `{name}` placeholders in command text and renders them from a binding

use std::collections::BTreeSet;
use thiserror::Error;

/// Errors found while scanning template text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unterminated placeholder starting at position {position} in '{template}'")]
    Unterminated { template: String, position: usize },

    #[error("single '}}' at position {position} in '{template}' (use '}}}}' for a literal brace)")]
    StrayBrace { template: String, position: usize },

    #[error("empty placeholder at position {position} in '{template}'")]
    EmptyPlaceholder { template: String, position: usize },

    #[error(
        "unsupported placeholder '{{{placeholder}}}' at position {position}: \
         conversions and format specs are not allowed"
    )]
    Unsupported { placeholder: String, position: usize },
}

/// A piece of template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Literal text, with `{{`/`}}` already unescaped
    Text(String),
    /// A named placeholder
    Placeholder(String),
}

/// A parsed template string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Scan template text into literal and placeholder segments
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut pos = 0;

        while pos < len {
            match chars[pos] {
                '{' if pos + 1 < len && chars[pos + 1] == '{' => {
                    text.push('{');
                    pos += 2;
                }
                '}' if pos + 1 < len && chars[pos + 1] == '}' => {
                    text.push('}');
                    pos += 2;
                }
                '{' => {
                    let end = find_close(&chars, pos + 1).ok_or_else(|| {
                        TemplateError::Unterminated {
                            template: input.to_string(),
                            position: pos,
                        }
                    })?;

                    let name: String = chars[pos + 1..end].iter().collect();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder {
                            template: input.to_string(),
                            position: pos,
                        });
                    }
                    if name.contains([':', '!']) {
                        return Err(TemplateError::Unsupported {
                            placeholder: name,
                            position: pos,
                        });
                    }

                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Placeholder(name));
                    pos = end + 1;
                }
                '}' => {
                    return Err(TemplateError::StrayBrace {
                        template: input.to_string(),
                        position: pos,
                    })
                }
                c => {
                    text.push(c);
                    pos += 1;
                }
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self { segments })
    }

    #[cfg(test)]
    fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of all placeholders, sorted and unique
    pub fn variables(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Substitute placeholders; names the resolver does not know are left as written
    pub fn render<F>(&self, resolve: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Placeholder(name) => match resolve(name) {
                    Some(value) => output.push_str(&value),
                    None => {
                        output.push('{');
                        output.push_str(name);
                        output.push('}');
                    }
                },
            }
        }
        output
    }
}

/// Position of the `}` closing a placeholder, if the placeholder is well formed
fn find_close(chars: &[char], start: usize) -> Option<usize> {
    for (offset, c) in chars[start..].iter().enumerate() {
        match c {
            '}' => return Some(start + offset),
            '{' => return None,
            _ => {}
        }
    }
    None
}
