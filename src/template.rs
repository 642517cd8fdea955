//! Synthesis of replacement nodes from parameterized shapes.
//!
//! A `CallTemplate` describes the target shape of a rewritten call: the new
//! selector, how each argument slot is filled (an argument of the matched
//! call moved as-is, a well-known symbol reference, a string literal, or an
//! argument wrapped in an adapter call), the resulting static type, and the
//! external symbols the rewrite newly requires.
//!
//! Newly required symbols are reported through the rewrite outcome so the
//! collaborator hosting the engine can add imports. For symbols the target
//! project may not see yet, `well_known_stub` supplies a minimal source stub
//! keyed by qualified name.

use crate::arena::NodeId;
use crate::tree::{ExprData, QualifiedName, SourceTree};
use std::fmt;

/// One argument slot of a call template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateArg {
    /// The n-th argument of the matched call, relocated unchanged.
    Bound(usize),
    /// A reference to a well-known symbol, rendered `Simple.MEMBER` when a
    /// member is given and `Simple` otherwise. The qualified name is added
    /// to the template's required symbols.
    Symbol {
        qualified: QualifiedName,
        member: Option<String>,
    },
    /// A verbatim string literal.
    Text(String),
    /// The n-th argument of the matched call wrapped in a no-argument
    /// adapter call, e.g. `#{0}.toInstant()`.
    Wrapped { index: usize, selector: String },
}

/// Error type for template instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `Bound`/`Wrapped` slot referenced an argument the call lacks.
    MissingArgument(usize),
    /// The matched node is not a call expression.
    NotACall(NodeId),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::MissingArgument(idx) => {
                write!(f, "template references missing argument #{}", idx)
            }
            TemplateError::NotACall(id) => write!(f, "{} is not a call expression", id),
        }
    }
}

impl std::error::Error for TemplateError {}

/// The target shape of a one-for-one call rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTemplate {
    selector: String,
    /// `None` carries the matched call's arguments through unchanged.
    args: Option<Vec<TemplateArg>>,
    /// Replaces the receiver with a static symbol reference when set;
    /// otherwise the matched call's receiver is kept.
    static_receiver: Option<QualifiedName>,
    result_type: Option<QualifiedName>,
    requires: Vec<QualifiedName>,
}

impl CallTemplate {
    /// A selector rename keeping receiver and arguments.
    pub fn rename(selector: &str) -> Self {
        Self {
            selector: selector.to_owned(),
            args: None,
            static_receiver: None,
            result_type: None,
            requires: Vec::new(),
        }
    }

    /// A reshape with an explicit argument list.
    pub fn with_args(selector: &str, args: Vec<TemplateArg>) -> Self {
        let mut template = Self::rename(selector);
        template.args = Some(args);
        template
    }

    /// Replaces the receiver with a reference to a static symbol; the symbol
    /// is added to the required set.
    pub fn static_receiver(mut self, qualified: &str) -> Self {
        self.static_receiver = Some(qualified.to_owned());
        self.requires.push(qualified.to_owned());
        self
    }

    /// Records the static type of the synthesized call.
    pub fn result_type(mut self, ty: &str) -> Self {
        self.result_type = Some(ty.to_owned());
        self
    }

    /// Adds a required external symbol.
    pub fn requires(mut self, qualified: &str) -> Self {
        self.requires.push(qualified.to_owned());
        self
    }

    /// Returns the external symbols this template introduces.
    pub fn required_symbols(&self) -> &[QualifiedName] {
        &self.requires
    }

    /// Synthesizes the replacement call for `call`, allocating new nodes and
    /// adopting relocated ones. The original call is left untouched; the
    /// caller repoints its parent slot.
    pub fn instantiate(
        &self,
        tree: &mut SourceTree,
        call: NodeId,
    ) -> Result<NodeId, TemplateError> {
        let (orig_receiver, orig_args) = match tree.expr(call) {
            Some(ExprData::Call { receiver, args, .. }) => (*receiver, args.clone()),
            _ => return Err(TemplateError::NotACall(call)),
        };

        let receiver = match &self.static_receiver {
            Some(qualified) => Some(tree.identifier(simple_name(qualified), Some(qualified))),
            None => orig_receiver,
        };

        let args = match &self.args {
            None => orig_args.clone(),
            Some(specs) => {
                let mut out = Vec::with_capacity(specs.len());
                for spec in specs {
                    out.push(self.build_arg(tree, spec, &orig_args)?);
                }
                out
            }
        };

        Ok(tree.call(receiver, &self.selector, args, self.result_type.as_deref()))
    }

    fn build_arg(
        &self,
        tree: &mut SourceTree,
        spec: &TemplateArg,
        orig_args: &[NodeId],
    ) -> Result<NodeId, TemplateError> {
        match spec {
            TemplateArg::Bound(idx) => orig_args
                .get(*idx)
                .copied()
                .ok_or(TemplateError::MissingArgument(*idx)),
            TemplateArg::Symbol { qualified, member } => {
                let name = match member {
                    Some(member) => format!("{}.{}", simple_name(qualified), member),
                    None => simple_name(qualified).to_owned(),
                };
                Ok(tree.identifier(&name, None))
            }
            TemplateArg::Text(text) => Ok(tree.literal(&format!("\"{}\"", text), Some("java.lang.String"))),
            TemplateArg::Wrapped { index, selector } => {
                let inner = orig_args
                    .get(*index)
                    .copied()
                    .ok_or(TemplateError::MissingArgument(*index))?;
                Ok(tree.call(Some(inner), selector, vec![], None))
            }
        }
    }
}

/// Returns the simple (unqualified) name of a qualified symbol.
pub fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// Minimal source stubs for the well-known symbols the registered rule sets
/// introduce, keyed by qualified name. Collaborators compile these into the
/// target project when the real dependency is not yet on the classpath.
pub fn well_known_stub(qualified: &str) -> Option<&'static str> {
    match qualified {
        "org.springframework.web.bind.annotation.RequestMapping" => Some(
            "package org.springframework.web.bind.annotation;\n\
             @Target({ElementType.TYPE, ElementType.METHOD})\n\
             @Retention(RetentionPolicy.RUNTIME)\n\
             public @interface RequestMapping {\n\
                 String name() default \"\";\n\
                 String[] value() default {};\n\
                 String[] path() default {};\n\
                 RequestMethod[] method() default {};\n\
                 String[] consumes() default {};\n\
                 String[] produces() default {};\n\
             }\n",
        ),
        "org.springframework.web.bind.annotation.RequestMethod" => Some(
            "package org.springframework.web.bind.annotation;\n\
             public enum RequestMethod {\n\
                 GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS, TRACE;\n\
             }\n",
        ),
        "org.springframework.web.bind.annotation.RestController" => Some(
            "package org.springframework.web.bind.annotation;\n\
             @Target(ElementType.TYPE)\n\
             @Retention(RetentionPolicy.RUNTIME)\n\
             @Controller\n\
             @ResponseBody\n\
             public @interface RestController {\n\
                 String value() default \"\";\n\
             }\n",
        ),
        "org.springframework.web.bind.annotation.RequestBody" => Some(
            "package org.springframework.web.bind.annotation;\n\
             @Target(ElementType.PARAMETER)\n\
             @Retention(RetentionPolicy.RUNTIME)\n\
             public @interface RequestBody {\n\
                 boolean required() default true;\n\
             }\n",
        ),
        "org.springframework.http.HttpHeaders" => Some(
            "package org.springframework.http;\n\
             public class HttpHeaders {\n\
                 public static final String CONTENT_ENCODING = \"Content-Encoding\";\n\
                 public static final String CONTENT_LANGUAGE = \"Content-Language\";\n\
                 public static final String CONTENT_TYPE = \"Content-Type\";\n\
             }\n",
        ),
        "org.springframework.http.ResponseEntity" => Some(
            "package org.springframework.http;\n\
             public class ResponseEntity<T> {\n\
                 public static BodyBuilder status(int status) { return null; }\n\
                 public static BodyBuilder ok() { return null; }\n\
                 public interface BodyBuilder {\n\
                     <T> ResponseEntity<T> body(T body);\n\
                     ResponseEntity<Void> build();\n\
                 }\n\
             }\n",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SourceTree;

    const BUILDER: &str = "javax.ws.rs.core.Response.ResponseBuilder";

    #[test]
    fn rename_keeps_receiver_and_arguments() {
        let mut tree = SourceTree::new();
        let recv = tree.identifier("b", Some(BUILDER));
        let arg = tree.literal("\"v1\"", Some("java.lang.String"));
        let call = tree.call(Some(recv), "tag", vec![arg], Some(BUILDER));

        let template = CallTemplate::rename("eTag")
            .result_type("org.springframework.http.ResponseEntity.BodyBuilder");
        let replacement = template.instantiate(&mut tree, call).unwrap();
        assert_eq!(tree.render_expr(replacement), "b.eTag(\"v1\")");
        assert_eq!(
            tree.static_type(replacement),
            Some("org.springframework.http.ResponseEntity.BodyBuilder")
        );
        // The relocated argument is now owned by the replacement.
        assert_eq!(tree.parent(arg), Some(replacement));
    }

    #[test]
    fn symbol_argument_and_requires() {
        let mut tree = SourceTree::new();
        let recv = tree.identifier("b", Some(BUILDER));
        let arg = tree.identifier("enc", Some("java.lang.String"));
        let call = tree.call(Some(recv), "encoding", vec![arg], Some(BUILDER));

        let template = CallTemplate::with_args(
            "header",
            vec![
                TemplateArg::Symbol {
                    qualified: "org.springframework.http.HttpHeaders".to_owned(),
                    member: Some("CONTENT_ENCODING".to_owned()),
                },
                TemplateArg::Bound(0),
            ],
        )
        .requires("org.springframework.http.HttpHeaders");
        let replacement = template.instantiate(&mut tree, call).unwrap();
        assert_eq!(
            tree.render_expr(replacement),
            "b.header(HttpHeaders.CONTENT_ENCODING, enc)"
        );
        assert_eq!(
            template.required_symbols(),
            &["org.springframework.http.HttpHeaders".to_owned()]
        );
    }

    #[test]
    fn wrapped_argument_builds_adapter_call() {
        let mut tree = SourceTree::new();
        let recv = tree.identifier("b", Some(BUILDER));
        let arg = tree.identifier("date", Some("java.util.Date"));
        let call = tree.call(Some(recv), "lastModified", vec![arg], Some(BUILDER));

        let template = CallTemplate::with_args(
            "lastModified",
            vec![TemplateArg::Wrapped {
                index: 0,
                selector: "toInstant".to_owned(),
            }],
        );
        let replacement = template.instantiate(&mut tree, call).unwrap();
        assert_eq!(tree.render_expr(replacement), "b.lastModified(date.toInstant())");
    }

    #[test]
    fn static_receiver_substitution() {
        let mut tree = SourceTree::new();
        let recv = tree.identifier("Response", Some("javax.ws.rs.core.Response"));
        let code = tree.literal("200", Some("int"));
        let call = tree.call(Some(recv), "status", vec![code], Some(BUILDER));

        let template = CallTemplate::rename("status")
            .static_receiver("org.springframework.http.ResponseEntity")
            .result_type("org.springframework.http.ResponseEntity.BodyBuilder");
        let replacement = template.instantiate(&mut tree, call).unwrap();
        assert_eq!(tree.render_expr(replacement), "ResponseEntity.status(200)");
        assert_eq!(
            template.required_symbols(),
            &["org.springframework.http.ResponseEntity".to_owned()]
        );
    }

    #[test]
    fn missing_argument_is_an_error() {
        let mut tree = SourceTree::new();
        let recv = tree.identifier("b", Some(BUILDER));
        let call = tree.call(Some(recv), "tag", vec![], Some(BUILDER));
        let template = CallTemplate::with_args("eTag", vec![TemplateArg::Bound(0)]);
        assert_eq!(
            template.instantiate(&mut tree, call),
            Err(TemplateError::MissingArgument(0))
        );
    }

    #[test]
    fn stub_registry_covers_introduced_symbols() {
        for symbol in [
            "org.springframework.web.bind.annotation.RequestMapping",
            "org.springframework.web.bind.annotation.RequestMethod",
            "org.springframework.web.bind.annotation.RestController",
            "org.springframework.web.bind.annotation.RequestBody",
            "org.springframework.http.HttpHeaders",
            "org.springframework.http.ResponseEntity",
        ] {
            assert!(well_known_stub(symbol).is_some(), "missing stub for {symbol}");
        }
        assert!(well_known_stub("java.lang.String").is_none());
    }
}
