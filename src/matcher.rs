//! Trigger signatures and exact shape matching.
//!
//! A rule trigger is a call signature such as
//! `javax.ws.rs.core.Response.ResponseBuilder entity(java.lang.Object, ..)`:
//! a qualified receiver type, a selector, and a positional parameter shape.
//! `_` matches any single argument; a trailing `..` matches any remaining
//! arguments (including none). Matching is exact: qualified names compare
//! by equality, parameters by arity and position. There is no fuzzy or
//! partial matching, and matching never mutates the tree.
//!
//! # Citations
//! - Matching with variables: Baader & Nipkow, "Term Rewriting and All That", Chapter 4 (1998)
//! - Strategy triggers: Visser, "A survey of strategies in rule-based program transformation systems" (2005)

use crate::arena::NodeId;
use crate::tree::{ExprData, QualifiedName, SourceTree};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One positional parameter constraint of a call signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamSpec {
    /// The argument's static type must equal this qualified name exactly.
    Exact(QualifiedName),
    /// Any single argument, of any (or unknown) static type.
    Any,
}

/// A call trigger signature: receiver type, selector, and parameter shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSignature {
    receiver: QualifiedName,
    selector: String,
    params: Vec<ParamSpec>,
    /// When set, arguments beyond `params` are accepted (trailing `..`).
    varargs_tail: bool,
}

/// Error type for signature parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// The text has no `<receiver> <selector>(..)` shape.
    MissingSelector,
    /// The selector part lacks a parenthesized parameter list.
    MissingParameterList,
    /// `..` appeared anywhere but the last position.
    MisplacedWildcardTail,
    /// An empty parameter entry (e.g. a doubled comma).
    EmptyParameter,
}

impl fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureParseError::MissingSelector => {
                write!(f, "expected `<receiver type> <selector>(..)`")
            }
            SignatureParseError::MissingParameterList => {
                write!(f, "selector is missing its parameter list")
            }
            SignatureParseError::MisplacedWildcardTail => {
                write!(f, "`..` is only allowed as the last parameter")
            }
            SignatureParseError::EmptyParameter => write!(f, "empty parameter entry"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

impl CallSignature {
    /// Parses a signature from its textual form, e.g.
    /// `javax.ws.rs.core.Response.ResponseBuilder tag(java.lang.String)`.
    pub fn parse(text: &str) -> Result<Self, SignatureParseError> {
        let text = text.trim();
        let (receiver, rest) = text
            .split_once(' ')
            .ok_or(SignatureParseError::MissingSelector)?;
        let rest = rest.trim();
        let open = rest
            .find('(')
            .ok_or(SignatureParseError::MissingParameterList)?;
        if !rest.ends_with(')') {
            return Err(SignatureParseError::MissingParameterList);
        }
        let selector = rest[..open].trim();
        if selector.is_empty() {
            return Err(SignatureParseError::MissingSelector);
        }
        let inner = rest[open + 1..rest.len() - 1].trim();

        let mut params = Vec::new();
        let mut varargs_tail = false;
        if !inner.is_empty() {
            let entries: Vec<&str> = inner.split(',').map(str::trim).collect();
            for (idx, entry) in entries.iter().enumerate() {
                match *entry {
                    "" => return Err(SignatureParseError::EmptyParameter),
                    ".." => {
                        if idx + 1 != entries.len() {
                            return Err(SignatureParseError::MisplacedWildcardTail);
                        }
                        varargs_tail = true;
                    }
                    "_" => params.push(ParamSpec::Any),
                    ty => params.push(ParamSpec::Exact(ty.to_owned())),
                }
            }
        }

        Ok(Self {
            receiver: receiver.to_owned(),
            selector: selector.to_owned(),
            params,
            varargs_tail,
        })
    }

    /// Returns the qualified receiver type this signature triggers on.
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Returns the selector this signature triggers on.
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Decides whether `call` matches this signature. Side-effect-free;
    /// a non-call node never matches.
    pub fn matches(&self, tree: &SourceTree, call: NodeId) -> bool {
        let Some(ExprData::Call {
            receiver: Some(recv),
            selector,
            args,
            ..
        }) = tree.expr(call)
        else {
            return false;
        };
        if selector != &self.selector {
            return false;
        }
        if tree.static_type(*recv) != Some(self.receiver.as_str()) {
            return false;
        }
        if self.varargs_tail {
            if args.len() < self.params.len() {
                return false;
            }
        } else if args.len() != self.params.len() {
            return false;
        }
        self.params.iter().zip(args).all(|(spec, &arg)| match spec {
            ParamSpec::Any => true,
            ParamSpec::Exact(ty) => tree.static_type(arg) == Some(ty.as_str()),
        })
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.receiver, self.selector)?;
        let mut first = true;
        for param in &self.params {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match param {
                ParamSpec::Exact(ty) => write!(f, "{}", ty)?,
                ParamSpec::Any => write!(f, "_")?,
            }
        }
        if self.varargs_tail {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "..")?;
        }
        write!(f, ")")
    }
}

/// Returns `true` if a qualified annotation name lives under a namespace
/// prefix, e.g. `in_namespace("javax.ws.rs.GET", "javax.ws.rs.")`.
pub fn in_namespace(name: &str, ns_prefix: &str) -> bool {
    name.starts_with(ns_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SourceTree;

    const BUILDER: &str = "javax.ws.rs.core.Response.ResponseBuilder";

    fn builder_call(tree: &mut SourceTree, selector: &str, args: Vec<NodeId>) -> NodeId {
        let recv = tree.identifier("b", Some(BUILDER));
        tree.call(Some(recv), selector, args, Some(BUILDER))
    }

    #[test]
    fn parse_roundtrip() {
        let sig = CallSignature::parse(
            "javax.ws.rs.core.Response.ResponseBuilder entity(java.lang.Object, ..)",
        )
        .unwrap();
        assert_eq!(sig.receiver(), BUILDER);
        assert_eq!(sig.selector(), "entity");
        assert_eq!(
            sig.to_string(),
            "javax.ws.rs.core.Response.ResponseBuilder entity(java.lang.Object, ..)"
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            CallSignature::parse("lonely-token"),
            Err(SignatureParseError::MissingSelector)
        );
        assert_eq!(
            CallSignature::parse("a.B sel"),
            Err(SignatureParseError::MissingParameterList)
        );
        assert_eq!(
            CallSignature::parse("a.B sel(.., int)"),
            Err(SignatureParseError::MisplacedWildcardTail)
        );
        assert_eq!(
            CallSignature::parse("a.B sel(int,,int)"),
            Err(SignatureParseError::EmptyParameter)
        );
    }

    #[test]
    fn exact_match_on_receiver_selector_and_arity() {
        let mut tree = SourceTree::new();
        let arg = tree.literal("\"tag\"", Some("java.lang.String"));
        let call = builder_call(&mut tree, "tag", vec![arg]);

        let sig = CallSignature::parse(&format!("{} tag(java.lang.String)", BUILDER)).unwrap();
        assert!(sig.matches(&tree, call));

        // Wrong selector.
        let other = CallSignature::parse(&format!("{} eTag(java.lang.String)", BUILDER)).unwrap();
        assert!(!other.matches(&tree, call));

        // Wrong arity.
        let zero = CallSignature::parse(&format!("{} tag()", BUILDER)).unwrap();
        assert!(!zero.matches(&tree, call));

        // Wrong argument type.
        let int_sig = CallSignature::parse(&format!("{} tag(int)", BUILDER)).unwrap();
        assert!(!int_sig.matches(&tree, call));

        // Wrong receiver type.
        let mut tree2 = SourceTree::new();
        let arg2 = tree2.literal("\"tag\"", Some("java.lang.String"));
        let recv2 = tree2.identifier("s", Some("java.util.stream.LongStream"));
        let call2 = tree2.call(Some(recv2), "tag", vec![arg2], None);
        assert!(!sig.matches(&tree2, call2));
    }

    #[test]
    fn wildcard_and_tail_semantics() {
        let mut tree = SourceTree::new();
        let payload = tree.identifier("body", Some("java.lang.String"));
        let extra = tree.identifier("anns", None);
        let one = builder_call(&mut tree, "entity", vec![payload]);
        let two = builder_call(&mut tree, "entity", vec![payload, extra]);
        let zero = builder_call(&mut tree, "entity", vec![]);

        let sig = CallSignature::parse(&format!("{} entity(_, ..)", BUILDER)).unwrap();
        assert!(sig.matches(&tree, one));
        assert!(sig.matches(&tree, two));
        assert!(!sig.matches(&tree, zero));
    }

    #[test]
    fn receiverless_calls_never_match() {
        let mut tree = SourceTree::new();
        let call = tree.call(None, "tag", vec![], None);
        let sig = CallSignature::parse(&format!("{} tag()", BUILDER)).unwrap();
        assert!(!sig.matches(&tree, call));
    }

    #[test]
    fn namespace_prefix() {
        assert!(in_namespace("javax.ws.rs.GET", "javax.ws.rs."));
        assert!(!in_namespace("org.springframework.web.bind.annotation.RequestBody", "javax.ws.rs."));
    }
}
