//! Minimal placeholder templates.
//!
//! A template is static text with `{{name}}` placeholders. Each template
//! declares the exact set of names it may use; anything else is an error at
//! render time rather than an empty substitution.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("template '{template}' uses undeclared placeholder '{{{{{name}}}}}'")]
    UnknownPlaceholder { template: String, name: String },

    #[error("template '{template}' needs variable '{name}' but it was not supplied")]
    MissingVariable { template: String, name: String },

    #[error("template '{template}' has an unterminated placeholder at byte {offset}")]
    Unterminated { template: String, offset: usize },

    #[error("{artifact} for '{plugin}' references ${{{name}}}, which the plugin does not declare")]
    UndeclaredEnvVar {
        plugin: String,
        artifact: String,
        name: String,
    },
}

/// Variables supplied to a render call.
pub type Vars = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub name: &'static str,
    source: &'static str,
    variables: &'static [&'static str],
}

enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

impl Template {
    pub const fn new(
        name: &'static str,
        source: &'static str,
        variables: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            source,
            variables,
        }
    }

    pub fn variables(&self) -> &'static [&'static str] {
        self.variables
    }

    fn segments(&self) -> Result<Vec<Segment<'static>>, RenderError> {
        let src = self.source;
        let mut out = Vec::new();
        let mut rest = 0;
        while let Some(open) = src[rest..].find("{{") {
            let start = rest + open;
            if start > rest {
                out.push(Segment::Text(&src[rest..start]));
            }
            let close = src[start + 2..].find("}}").ok_or(RenderError::Unterminated {
                template: self.name.to_string(),
                offset: start,
            })?;
            let name = src[start + 2..start + 2 + close].trim();
            out.push(Segment::Placeholder(name));
            rest = start + 2 + close + 2;
        }
        if rest < src.len() {
            out.push(Segment::Text(&src[rest..]));
        }
        Ok(out)
    }

    /// Distinct placeholder names in order of first use.
    pub fn placeholders(&self) -> Result<Vec<&'static str>, RenderError> {
        let mut seen = BTreeSet::new();
        let mut names = Vec::new();
        for segment in self.segments()? {
            if let Segment::Placeholder(name) = segment
                && seen.insert(name)
            {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Check that every placeholder is declared.
    pub fn check(&self) -> Result<(), RenderError> {
        for name in self.placeholders()? {
            if !self.variables.contains(&name) {
                return Err(RenderError::UnknownPlaceholder {
                    template: self.name.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn render(&self, vars: &Vars) -> Result<String, RenderError> {
        self.check()?;
        if let Some(missing) = self.variables.iter().find(|v| !vars.contains_key(*v)) {
            return Err(RenderError::MissingVariable {
                template: self.name.to_string(),
                name: missing.to_string(),
            });
        }

        let mut out = String::with_capacity(self.source.len() + 256);
        for segment in self.segments()? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    if let Some(value) = vars.get(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Names referenced as `${NAME}` or `${NAME:-default}` in rendered output.
pub fn env_references(text: &str) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    let mut rest = text;
    while let Some(at) = rest.find("${") {
        let after = &rest[at + 2..];
        let end = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if end > 0 {
            refs.insert(after[..end].to_string());
        }
        rest = &after[end..];
    }
    refs
}
