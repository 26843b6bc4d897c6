//! Parsing of reference expressions.
//!
//! Supported forms, relative to the module the reference appears in:
//!
//! - `var.<name>`
//! - `module.<call>.<output>`
//! - `<type>.<name>` and `data.<type>.<name>`
//!
//! Each may be followed by attribute (`.id`) and index (`[0]`, `["a"]`) steps.

use crate::addrs::{ConfigResource, InstanceKey, ModulePath, ResourceMode, split_ident, split_key};
use crate::error::EvalError;

/// What a reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// An input variable of the current module.
    Variable(String),
    /// An output of a child module call.
    ModuleOutput {
        /// Child module path.
        module: ModulePath,
        /// Output name.
        name: String,
    },
    /// A resource in the current module.
    Resource(ConfigResource),
}

/// One traversal step after the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `.name`
    Attr(String),
    /// `[0]` or `["key"]`
    Index(InstanceKey),
}

/// A parsed reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The referenced object.
    pub subject: Subject,
    /// Steps applied to the object's value.
    pub steps: Vec<Step>,
    /// Original text.
    pub text: String,
}

impl Reference {
    /// Parses a reference appearing in `module`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a supported reference.
    pub fn parse(text: &str, module: &ModulePath) -> Result<Self, EvalError> {
        let invalid = |message: &str| EvalError::InvalidReference {
            reference: text.to_string(),
            message: message.to_string(),
        };

        let (head, rest) = split_ident(text.trim()).ok_or_else(|| invalid("expected a name"))?;
        let (subject, rest) = match head {
            "var" => {
                let (name, rest) = dotted_ident(rest).ok_or_else(|| invalid("expected a variable name"))?;
                (Subject::Variable(name.to_string()), rest)
            }
            "module" => {
                let (call, rest) = dotted_ident(rest).ok_or_else(|| invalid("expected a module name"))?;
                let (name, rest) = dotted_ident(rest).ok_or_else(|| invalid("expected an output name"))?;
                (
                    Subject::ModuleOutput {
                        module: module.child(call),
                        name: name.to_string(),
                    },
                    rest,
                )
            }
            "data" => {
                let (type_name, rest) = dotted_ident(rest).ok_or_else(|| invalid("expected a data source type"))?;
                let (name, rest) = dotted_ident(rest).ok_or_else(|| invalid("expected a data source name"))?;
                let resource = ConfigResource {
                    module: module.clone(),
                    mode: ResourceMode::Data,
                    type_name: type_name.to_string(),
                    name: name.to_string(),
                };
                (Subject::Resource(resource), rest)
            }
            type_name => {
                let (name, rest) = dotted_ident(rest).ok_or_else(|| invalid("expected a resource name"))?;
                let resource = ConfigResource::managed(module.clone(), type_name, name);
                (Subject::Resource(resource), rest)
            }
        };

        let steps = parse_steps(rest).ok_or_else(|| invalid("invalid traversal"))?;
        Ok(Self {
            subject,
            steps,
            text: text.to_string(),
        })
    }

    /// Returns the referenced resource, if any.
    #[must_use]
    pub const fn resource(&self) -> Option<&ConfigResource> {
        match &self.subject {
            Subject::Resource(resource) => Some(resource),
            Subject::Variable(_) | Subject::ModuleOutput { .. } => None,
        }
    }
}

fn dotted_ident(input: &str) -> Option<(&str, &str)> {
    split_ident(input.strip_prefix('.')?)
}

fn parse_steps(mut rest: &str) -> Option<Vec<Step>> {
    let mut steps = Vec::new();
    while !rest.is_empty() {
        if rest.starts_with('[') {
            let (key, tail) = split_key(rest)?;
            steps.push(Step::Index(key));
            rest = tail;
        } else {
            let (name, tail) = dotted_ident(rest)?;
            steps.push(Step::Attr(name.to_string()));
            rest = tail;
        }
    }
    Some(steps)
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attr(name) => write!(f, ".{name}"),
            Self::Index(key) => write!(f, "{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let root = ModulePath::root();
        let net = root.child("net");

        let var = Reference::parse("var.cidr", &net).expect("variable");
        assert_eq!(var.subject, Subject::Variable(String::from("cidr")));
        assert!(var.steps.is_empty());

        let out = Reference::parse("module.net.subnet_ids[0]", &root).expect("module output");
        assert_eq!(
            out.subject,
            Subject::ModuleOutput {
                module: net.clone(),
                name: String::from("subnet_ids"),
            }
        );
        assert_eq!(out.steps, [Step::Index(InstanceKey::Int(0))]);

        let res = Reference::parse("aws_subnet.private[\"a\"].id", &net).expect("resource");
        assert_eq!(res.resource().map(ToString::to_string).as_deref(), Some("module.net.aws_subnet.private"));
        assert_eq!(
            res.steps,
            [Step::Index(InstanceKey::Str(String::from("a"))), Step::Attr(String::from("id"))]
        );

        let data = Reference::parse("data.aws_ami.ubuntu.id", &root).expect("data source");
        assert_eq!(data.resource().map(|r| r.mode), Some(ResourceMode::Data));
    }

    #[test]
    fn test_parse_rejects_incomplete() {
        let root = ModulePath::root();
        assert!(Reference::parse("var", &root).is_err());
        assert!(Reference::parse("module.net", &root).is_err());
        assert!(Reference::parse("aws_instance", &root).is_err());
        assert!(Reference::parse("aws_instance.web[", &root).is_err());
        assert!(Reference::parse("aws_instance.web..id", &root).is_err());
    }
}
