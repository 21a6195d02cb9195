use crate::core::models::work_item::WorkItemId;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unclosed placeholder starting at byte {position} in template '{template}'")]
    UnclosedPlaceholder { template: String, position: usize },
    #[error("Unmatched '}}' at byte {position} in template '{template}'")]
    UnmatchedClosingBrace { template: String, position: usize },
    #[error("Unknown placeholder '{{{name}}}' in template '{template}'")]
    UnknownPlaceholder { template: String, name: String },
    #[error("Invalid id width '{spec}' in template '{template}' (expected e.g. '{{id:014}}')")]
    InvalidWidth { template: String, spec: String },
    #[error("Template '{0}' has no '{{id}}' placeholder, so every run would share one path")]
    MissingIdPlaceholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Id { width: Option<usize> },
    Label,
}

/// A file-name template such as `sim_decay_{label}_{id:014}.log`.
///
/// Supported placeholders are `{id}`, `{id:0N}` (zero-padded to `N` characters)
/// and `{label}`. Literal braces are written as `{{` and `}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl NamingTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(TemplateError::UnclosedPlaceholder {
                            template: template.to_string(),
                            position: pos,
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Self::parse_placeholder(template, name.trim())?);
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(TemplateError::UnmatchedClosingBrace {
                            template: template.to_string(),
                            position: pos,
                        });
                    }
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.iter().any(|s| matches!(s, Segment::Id { .. })) {
            return Err(TemplateError::MissingIdPlaceholder(template.to_string()));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    fn parse_placeholder(template: &str, name: &str) -> Result<Segment, TemplateError> {
        match name.split_once(':') {
            None if name == "id" => Ok(Segment::Id { width: None }),
            None if name == "label" => Ok(Segment::Label),
            Some(("id", spec)) => {
                let digits = spec.strip_suffix('d').unwrap_or(spec);
                let width = digits
                    .strip_prefix('0')
                    .filter(|rest| !rest.is_empty())
                    .and_then(|rest| rest.parse::<usize>().ok())
                    .ok_or_else(|| TemplateError::InvalidWidth {
                        template: template.to_string(),
                        spec: spec.to_string(),
                    })?;
                Ok(Segment::Id { width: Some(width) })
            }
            _ => Err(TemplateError::UnknownPlaceholder {
                template: template.to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub fn render(&self, id: &WorkItemId, label: &str) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Id { width: None } => out.push_str(&id.to_string()),
                Segment::Id { width: Some(w) } => out.push_str(&id.zero_padded(*w)),
                Segment::Label => out.push_str(label),
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for NamingTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NamingTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Output and log templates plus the batch label and base directory they render into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    pub output: NamingTemplate,
    pub log: NamingTemplate,
    pub label: String,
    pub directory: Option<PathBuf>,
}

impl NamingScheme {
    pub fn output_path(&self, id: &WorkItemId) -> PathBuf {
        self.resolve(self.output.render(id, &self.label))
    }

    pub fn log_path(&self, id: &WorkItemId) -> PathBuf {
        self.resolve(self.log.render(id, &self.label))
    }

    fn resolve(&self, file_name: String) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}
