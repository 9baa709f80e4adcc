//! Path template parsing.
//!
//! A path template is a `/`-separated pattern such as `/orders/{id}` or
//! `/files/**`. Supported segment forms:
//!
//! | Form       | Meaning                                   |
//! |------------|-------------------------------------------|
//! | `orders`   | literal segment, compared exactly         |
//! | `{id}`     | named variable, exactly one segment       |
//! | `*`        | anonymous variable, exactly one segment   |
//! | `**`       | catch-all, zero or more trailing segments |
//! | `{*rest}`  | named catch-all                           |
//!
//! Empty segments are ignored, so `/orders/` and `/orders` are the same
//! template. A catch-all must be the last segment.
//!
//! [`PathTemplate::parse_relaxed`] accepts anything and widens what `parse`
//! rejects, for callers that must match a template they cannot refuse.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Errors produced when parsing a path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TemplateError {
    /// A catch-all segment was followed by more segments.
    #[error("catch-all must be the last segment in '{template}'")]
    CatchAllNotLast {
        /// The offending template.
        template: String,
    },

    /// A variable had no name (`{}`).
    #[error("empty variable name in '{template}'")]
    EmptyVariable {
        /// The offending template.
        template: String,
    },

    /// A segment mixed literal text with a variable or wildcard.
    #[error("segment '{segment}' mixes literal text with a variable or wildcard")]
    MixedSegment {
        /// The offending segment.
        segment: String,
    },

    /// A variable carried a constraint (`{id:\d+}`), which is not supported.
    #[error("variable constraints are not supported in segment '{segment}'")]
    UnsupportedConstraint {
        /// The offending segment.
        segment: String,
    },
}

/// A single parsed template segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Literal text.
    Literal(String),
    /// Single-segment variable. `None` for the anonymous `*` form.
    Variable(Option<String>),
    /// Zero or more trailing segments. `None` for the anonymous `**` form.
    CatchAll(Option<String>),
}

impl Segment {
    fn parse(raw: &str) -> Result<Self, SegmentError> {
        match raw {
            "*" => return Ok(Self::Variable(None)),
            "**" => return Ok(Self::CatchAll(None)),
            _ => {}
        }

        if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if inner.contains(['{', '}']) {
                return Err(SegmentError::Mixed);
            }
            if inner.contains(':') {
                return Err(SegmentError::Constraint);
            }
            if let Some(name) = inner.strip_prefix('*') {
                return if name.is_empty() {
                    Err(SegmentError::Empty)
                } else {
                    Ok(Self::CatchAll(Some(name.to_string())))
                };
            }
            return if inner.is_empty() {
                Err(SegmentError::Empty)
            } else {
                Ok(Self::Variable(Some(inner.to_string())))
            };
        }

        if raw.contains(['{', '}', '*']) {
            return Err(SegmentError::Mixed);
        }
        Ok(Self::Literal(raw.to_string()))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.write_str(s),
            Self::Variable(None) => f.write_str("*"),
            Self::Variable(Some(name)) => write!(f, "{{{name}}}"),
            Self::CatchAll(None) => f.write_str("**"),
            Self::CatchAll(Some(name)) => write!(f, "{{*{name}}}"),
        }
    }
}

/// Widens a `{name:constraint}` segment to the unconstrained variable.
fn drop_constraint(raw: &str) -> Segment {
    let inner = raw.strip_prefix('{').unwrap_or(raw);
    let name = inner.split(':').next().unwrap_or_default();
    match name.strip_prefix('*') {
        Some("") => Segment::CatchAll(None),
        Some(rest) => Segment::CatchAll(Some(rest.to_string())),
        None if name.is_empty() => Segment::Variable(None),
        None => Segment::Variable(Some(name.to_string())),
    }
}

enum SegmentError {
    Empty,
    Mixed,
    Constraint,
}

/// How specific a template is, used to pick one rule when several match.
///
/// Ordering is "more specific is greater":
///
/// 1. templates without a catch-all beat templates with one
/// 2. more literal segments beat fewer
/// 3. fewer variable segments beat more
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Specificity {
    /// Whether the template ends in a catch-all.
    pub catch_all: bool,
    /// Number of literal segments.
    pub literals: usize,
    /// Number of single-segment variables.
    pub variables: usize,
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .catch_all
            .cmp(&self.catch_all)
            .then(self.literals.cmp(&other.literals))
            .then(other.variables.cmp(&self.variables))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed, validated path template.
///
/// # Example
///
/// ```rust
/// use bastion_router::{PathTemplate, Segment};
///
/// let template = PathTemplate::parse("/orders/{id}/items/**").unwrap();
/// assert_eq!(template.segments().len(), 4);
/// assert!(matches!(template.segments()[3], Segment::CatchAll(None)));
/// assert_eq!(template.to_string(), "/orders/{id}/items/**");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template string.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let raw: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());

        for (i, part) in raw.iter().enumerate() {
            let segment = Segment::parse(part).map_err(|e| match e {
                SegmentError::Empty => TemplateError::EmptyVariable {
                    template: template.to_string(),
                },
                SegmentError::Mixed => TemplateError::MixedSegment {
                    segment: (*part).to_string(),
                },
                SegmentError::Constraint => TemplateError::UnsupportedConstraint {
                    segment: (*part).to_string(),
                },
            })?;

            if matches!(segment, Segment::CatchAll(_)) && i + 1 != raw.len() {
                return Err(TemplateError::CatchAllNotLast {
                    template: template.to_string(),
                });
            }
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// Parses a template, widening whatever [`parse`](Self::parse) rejects.
    ///
    /// A constrained variable `{id:\d+}` becomes `{id}`, any other malformed
    /// segment becomes `*`, and the first catch-all ends the template. The
    /// result matches every path the written template could have meant.
    ///
    /// ```rust
    /// use bastion_router::PathTemplate;
    ///
    /// let template = PathTemplate::parse_relaxed("/orders/{id:\\d+}/v{n}.json");
    /// assert_eq!(template.to_string(), "/orders/{id}/*");
    /// ```
    pub fn parse_relaxed(template: &str) -> Self {
        let mut segments = Vec::new();
        for part in template.split('/').filter(|s| !s.is_empty()) {
            let segment = match Segment::parse(part) {
                Ok(segment) => segment,
                Err(SegmentError::Constraint) => drop_constraint(part),
                Err(SegmentError::Empty | SegmentError::Mixed) => Segment::Variable(None),
            };
            let ends = matches!(segment, Segment::CatchAll(_));
            segments.push(segment);
            if ends {
                break;
            }
        }
        Self { segments }
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the specificity of this template.
    pub fn specificity(&self) -> Specificity {
        let mut spec = Specificity::default();
        for segment in &self.segments {
            match segment {
                Segment::Literal(_) => spec.literals += 1,
                Segment::Variable(_) => spec.variables += 1,
                Segment::CatchAll(_) => spec.catch_all = true,
            }
        }
        spec
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for PathTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
