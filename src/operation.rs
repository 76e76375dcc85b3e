//! Operation descriptors.
//!
//! An [`Operation`] names what a call site wants done: an action
//! ([`StandardOperation`]), the namespaces it applies to in priority order
//! ([`StandardNamespace`]) and an optional fixed member name.
//!
//! ```text
//! GET:PROPERTY|METHOD:color   get "color", as a property first, then as a method
//! SET:ELEMENT                 set an element; index and value come from the arguments
//! CALL                        call the callee passed as the first argument
//! NEW                         construct an instance of the class passed first
//! ```
//!
//! Operations are plain values. Every combinator returns a new operation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::LinkError;

/// The action an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardOperation {
    Get,
    Set,
    Remove,
    Call,
    New,
}

impl StandardOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Remove => "REMOVE",
            Self::Call => "CALL",
            Self::New => "NEW",
        }
    }
}

impl FromStr for StandardOperation {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Self::Get),
            "SET" => Ok(Self::Set),
            "REMOVE" => Ok(Self::Remove),
            "CALL" => Ok(Self::Call),
            "NEW" => Ok(Self::New),
            other => Err(LinkError::InvalidOperation(format!(
                "unknown action '{}'",
                other
            ))),
        }
    }
}

/// The member namespace an operation is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardNamespace {
    Property,
    Element,
    Method,
}

impl StandardNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Property => "PROPERTY",
            Self::Element => "ELEMENT",
            Self::Method => "METHOD",
        }
    }
}

impl FromStr for StandardNamespace {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROPERTY" => Ok(Self::Property),
            "ELEMENT" => Ok(Self::Element),
            "METHOD" => Ok(Self::Method),
            other => Err(LinkError::InvalidOperation(format!(
                "unknown namespace '{}'",
                other
            ))),
        }
    }
}

/// An immutable dynamic operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    action: StandardOperation,
    namespaces: SmallVec<[StandardNamespace; 3]>,
    name: Option<Arc<str>>,
}

impl Operation {
    pub fn new(action: StandardOperation) -> Self {
        Self {
            action,
            namespaces: SmallVec::new(),
            name: None,
        }
    }

    pub fn get() -> Self {
        Self::new(StandardOperation::Get)
    }

    pub fn set() -> Self {
        Self::new(StandardOperation::Set)
    }

    pub fn remove() -> Self {
        Self::new(StandardOperation::Remove)
    }

    pub fn call() -> Self {
        Self::new(StandardOperation::Call)
    }

    pub fn construct() -> Self {
        Self::new(StandardOperation::New)
    }

    /// Add a namespace after the existing ones; a namespace already present keeps its position
    pub fn with_namespace(&self, namespace: StandardNamespace) -> Self {
        self.with_namespaces(&[namespace])
    }

    pub fn with_namespaces(&self, namespaces: &[StandardNamespace]) -> Self {
        let mut next = self.clone();
        for ns in namespaces {
            if !next.namespaces.contains(ns) {
                next.namespaces.push(*ns);
            }
        }
        next
    }

    pub fn named(&self, name: impl Into<Arc<str>>) -> Self {
        Self {
            name: Some(name.into()),
            ..self.clone()
        }
    }

    pub fn unnamed(&self) -> Self {
        Self {
            name: None,
            ..self.clone()
        }
    }

    #[inline]
    pub fn action(&self) -> StandardOperation {
        self.action
    }

    #[inline]
    pub fn namespaces(&self) -> &[StandardNamespace] {
        &self.namespaces
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn contains_namespace(&self, namespace: StandardNamespace) -> bool {
        self.namespaces.contains(&namespace)
    }

    /// Parse the textual form `ACTION[:NS(|NS)*[:name]]`
    pub fn parse(text: &str) -> Result<Self, LinkError> {
        text.parse()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action.as_str())?;
        if !self.namespaces.is_empty() {
            f.write_str(":")?;
            for (i, ns) in self.namespaces.iter().enumerate() {
                if i > 0 {
                    f.write_str("|")?;
                }
                f.write_str(ns.as_str())?;
            }
        }
        if let Some(name) = &self.name {
            if self.namespaces.is_empty() {
                f.write_str(":")?;
            }
            write!(f, ":{}", name)?;
        }
        Ok(())
    }
}

impl FromStr for Operation {
    type Err = LinkError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.splitn(3, ':');
        let action = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LinkError::InvalidOperation("empty operation".to_string()))?
            .parse::<StandardOperation>()?;
        let mut op = Operation::new(action);

        if let Some(namespaces) = parts.next().filter(|s| !s.is_empty()) {
            for ns in namespaces.split('|') {
                op = op.with_namespace(ns.parse()?);
            }
        }

        match parts.next() {
            Some("") => Err(LinkError::InvalidOperation(format!(
                "empty name in '{}'",
                text
            ))),
            Some(name) => Ok(op.named(name)),
            None => Ok(op),
        }
    }
}
