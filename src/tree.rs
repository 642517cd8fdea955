//! The structural model: an arena-backed tree of declarations, annotations,
//! and expressions.
//!
//! Node kinds form a closed enumeration dispatched through a single traversal
//! function; there is no open-ended visitor hierarchy. Parent links live in a
//! side map rather than inside node data, so the ownership graph stays
//! acyclic. Replacing an expression allocates nothing in place: the
//! replacement node is repointed into the parent's child slot and the old
//! node becomes garbage, reclaimed by `compact` after a run.
//!
//! Static types are plain qualified names attached by the collaborator that
//! built the tree. The engine queries them; it never infers them.

use crate::arena::NodeArena;
pub use crate::arena::NodeId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A fully qualified type or symbol name, e.g. `javax.ws.rs.core.Response`.
pub type QualifiedName = String;

/// Kind of a declaration node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    /// A type (class/interface) declaration owning methods.
    Type,
    /// A method declaration owning parameters and body statements.
    Method,
    /// A formal parameter of a method.
    Parameter,
    /// A local variable declaration; its initializer is its first child.
    Local,
}

/// Payload of a declaration node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclData {
    pub kind: DeclKind,
    pub name: String,
    /// Declared type: the return type for methods, the variable type for
    /// parameters and locals, absent for type declarations.
    pub ty: Option<QualifiedName>,
    /// Annotations in source order.
    pub annotations: Vec<NodeId>,
    /// Owned children in source order: members for types, parameters followed
    /// by body statements for methods, the initializer for locals.
    pub children: Vec<NodeId>,
}

/// Payload of an annotation node: a qualified name plus an insertion-ordered
/// attribute map. Attribute keys are unique within one annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationData {
    pub name: QualifiedName,
    pub args: IndexMap<String, NodeId>,
}

/// Payload of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprData {
    /// A literal, stored as its source text (`200`, `"/ping"`).
    Literal {
        text: String,
        ty: Option<QualifiedName>,
    },
    /// An identifier reference, possibly dotted (`Response`,
    /// `RequestMethod.GET`).
    Identifier {
        name: String,
        ty: Option<QualifiedName>,
    },
    /// A call with optional receiver, selector, and ordered arguments. A
    /// chain is simply a call whose receiver is itself a call. Evaluation
    /// order is receiver before arguments, arguments left to right.
    Call {
        receiver: Option<NodeId>,
        selector: String,
        args: Vec<NodeId>,
        ty: Option<QualifiedName>,
    },
}

/// Closed enumeration of node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// The compilation unit root: an ordered sequence of declarations.
    Unit { decls: Vec<NodeId> },
    Decl(DeclData),
    Annotation(AnnotationData),
    Expr(ExprData),
}

/// Error type for structural model operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The id does not refer to a live node.
    UnknownNode(NodeId),
    /// The node is not a declaration.
    NotADeclaration(NodeId),
    /// The node is not an expression.
    NotAnExpression(NodeId),
    /// The node has no parent, or the parent does not own it in a
    /// replaceable slot.
    NotAttached(NodeId),
    /// An annotation attribute key was supplied twice.
    DuplicateAttribute(String),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::UnknownNode(id) => write!(f, "unknown node {}", id),
            TreeError::NotADeclaration(id) => write!(f, "{} is not a declaration", id),
            TreeError::NotAnExpression(id) => write!(f, "{} is not an expression", id),
            TreeError::NotAttached(id) => write!(f, "{} is not attached to a parent slot", id),
            TreeError::DuplicateAttribute(key) => {
                write!(f, "duplicate annotation attribute `{}`", key)
            }
        }
    }
}

impl std::error::Error for TreeError {}

/// An arena-backed compilation unit tree.
///
/// # Invariants
/// - The ownership graph rooted at `root` is acyclic.
/// - `parents` maps every owned node to the node whose slot holds it.
/// - Annotation attribute keys are unique per annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTree {
    arena: NodeArena<NodeKind>,
    root: NodeId,
    parents: HashMap<NodeId, NodeId>,
}

impl SourceTree {
    /// Creates a tree holding an empty compilation unit.
    pub fn new() -> Self {
        let mut arena = NodeArena::new();
        let root = arena.allocate(NodeKind::Unit { decls: Vec::new() });
        Self {
            arena,
            root,
            parents: HashMap::new(),
        }
    }

    /// Returns the compilation unit root.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns `true` if `id` refers to a live node (attached or garbage).
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    /// Returns the kind payload of a node.
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.arena.get(id)
    }

    /// Returns the parent of a node, if it is owned by one.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Returns the number of live nodes.
    pub fn node_count(&self) -> usize {
        self.arena.live_count()
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Appends a type declaration to the compilation unit.
    pub fn push_type(&mut self, name: &str) -> NodeId {
        let id = self.arena.allocate(NodeKind::Decl(DeclData {
            kind: DeclKind::Type,
            name: name.to_owned(),
            ty: None,
            annotations: Vec::new(),
            children: Vec::new(),
        }));
        let root = self.root;
        if let Some(NodeKind::Unit { decls }) = self.arena.get_mut(root) {
            decls.push(id);
        }
        self.parents.insert(id, root);
        id
    }

    /// Appends a method declaration to a type.
    pub fn push_method(
        &mut self,
        ty: NodeId,
        name: &str,
        return_ty: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        self.push_decl(
            ty,
            DeclData {
                kind: DeclKind::Method,
                name: name.to_owned(),
                ty: return_ty.map(str::to_owned),
                annotations: Vec::new(),
                children: Vec::new(),
            },
        )
    }

    /// Appends a parameter declaration to a method.
    pub fn push_parameter(
        &mut self,
        method: NodeId,
        name: &str,
        ty: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        self.push_decl(
            method,
            DeclData {
                kind: DeclKind::Parameter,
                name: name.to_owned(),
                ty: ty.map(str::to_owned),
                annotations: Vec::new(),
                children: Vec::new(),
            },
        )
    }

    /// Appends a local variable declaration with an optional initializer to a
    /// method body.
    pub fn push_local(
        &mut self,
        method: NodeId,
        name: &str,
        ty: Option<&str>,
        init: Option<NodeId>,
    ) -> Result<NodeId, TreeError> {
        let id = self.push_decl(
            method,
            DeclData {
                kind: DeclKind::Local,
                name: name.to_owned(),
                ty: ty.map(str::to_owned),
                annotations: Vec::new(),
                children: Vec::new(),
            },
        )?;
        if let Some(init) = init {
            if let Some(NodeKind::Decl(decl)) = self.arena.get_mut(id) {
                decl.children.push(init);
            }
            self.parents.insert(init, id);
        }
        Ok(id)
    }

    fn push_decl(&mut self, parent: NodeId, data: DeclData) -> Result<NodeId, TreeError> {
        if !matches!(self.arena.get(parent), Some(NodeKind::Decl(_))) {
            return Err(TreeError::NotADeclaration(parent));
        }
        let id = self.arena.allocate(NodeKind::Decl(data));
        if let Some(NodeKind::Decl(decl)) = self.arena.get_mut(parent) {
            decl.children.push(id);
        }
        self.parents.insert(id, parent);
        Ok(id)
    }

    /// Appends an expression statement to a method body.
    pub fn push_statement(&mut self, method: NodeId, expr: NodeId) -> Result<(), TreeError> {
        match self.arena.get_mut(method) {
            Some(NodeKind::Decl(decl)) => {
                decl.children.push(expr);
                self.parents.insert(expr, method);
                Ok(())
            }
            Some(_) => Err(TreeError::NotADeclaration(method)),
            None => Err(TreeError::UnknownNode(method)),
        }
    }

    /// Allocates a literal expression.
    pub fn literal(&mut self, text: &str, ty: Option<&str>) -> NodeId {
        self.arena.allocate(NodeKind::Expr(ExprData::Literal {
            text: text.to_owned(),
            ty: ty.map(str::to_owned),
        }))
    }

    /// Allocates an identifier expression.
    pub fn identifier(&mut self, name: &str, ty: Option<&str>) -> NodeId {
        self.arena.allocate(NodeKind::Expr(ExprData::Identifier {
            name: name.to_owned(),
            ty: ty.map(str::to_owned),
        }))
    }

    /// Allocates a call expression, adopting the receiver and arguments.
    ///
    /// Adoption repoints the parent links of the receiver and arguments to
    /// the new call, so nodes lifted out of a replaced call stay reachable
    /// through their new owner.
    pub fn call(
        &mut self,
        receiver: Option<NodeId>,
        selector: &str,
        args: Vec<NodeId>,
        ty: Option<&str>,
    ) -> NodeId {
        let id = self.arena.allocate(NodeKind::Expr(ExprData::Call {
            receiver,
            selector: selector.to_owned(),
            args: args.clone(),
            ty: ty.map(str::to_owned),
        }));
        if let Some(recv) = receiver {
            self.parents.insert(recv, id);
        }
        for arg in args {
            self.parents.insert(arg, id);
        }
        id
    }

    // ------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------

    /// Attaches a marker annotation (no arguments) to a declaration.
    pub fn annotate(&mut self, decl: NodeId, name: &str) -> Result<NodeId, TreeError> {
        self.annotate_with(decl, name, Vec::new())
    }

    /// Attaches an annotation with `key = value` attributes in the given
    /// order to a declaration. Keys must be unique.
    pub fn annotate_with(
        &mut self,
        decl: NodeId,
        name: &str,
        args: Vec<(&str, NodeId)>,
    ) -> Result<NodeId, TreeError> {
        if !matches!(self.arena.get(decl), Some(NodeKind::Decl(_))) {
            return Err(match self.arena.get(decl) {
                Some(_) => TreeError::NotADeclaration(decl),
                None => TreeError::UnknownNode(decl),
            });
        }
        let mut map = IndexMap::with_capacity(args.len());
        for (key, value) in &args {
            if map.insert((*key).to_owned(), *value).is_some() {
                return Err(TreeError::DuplicateAttribute((*key).to_owned()));
            }
        }
        let id = self.arena.allocate(NodeKind::Annotation(AnnotationData {
            name: name.to_owned(),
            args: map,
        }));
        for (_, value) in args {
            self.parents.insert(value, id);
        }
        if let Some(NodeKind::Decl(data)) = self.arena.get_mut(decl) {
            data.annotations.push(id);
        }
        self.parents.insert(id, decl);
        Ok(id)
    }

    /// Returns a declaration's annotations in source order.
    pub fn annotations(&self, decl: NodeId) -> &[NodeId] {
        match self.arena.get(decl) {
            Some(NodeKind::Decl(data)) => &data.annotations,
            _ => &[],
        }
    }

    /// Returns an annotation's qualified name.
    pub fn annotation_name(&self, ann: NodeId) -> Option<&str> {
        match self.arena.get(ann) {
            Some(NodeKind::Annotation(data)) => Some(&data.name),
            _ => None,
        }
    }

    /// Returns the expression bound to an annotation attribute, if present.
    pub fn annotation_arg(&self, ann: NodeId, key: &str) -> Option<NodeId> {
        match self.arena.get(ann) {
            Some(NodeKind::Annotation(data)) => data.args.get(key).copied(),
            _ => None,
        }
    }

    /// Detaches an annotation from a declaration. The annotation node
    /// becomes garbage; its attribute expressions stay alive and may be
    /// rehomed into a replacement annotation.
    pub fn remove_annotation(&mut self, decl: NodeId, ann: NodeId) -> Result<(), TreeError> {
        match self.arena.get_mut(decl) {
            Some(NodeKind::Decl(data)) => {
                let before = data.annotations.len();
                data.annotations.retain(|&a| a != ann);
                if data.annotations.len() == before {
                    return Err(TreeError::NotAttached(ann));
                }
                self.parents.remove(&ann);
                Ok(())
            }
            Some(_) => Err(TreeError::NotADeclaration(decl)),
            None => Err(TreeError::UnknownNode(decl)),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Returns the expression payload of a node.
    pub fn expr(&self, id: NodeId) -> Option<&ExprData> {
        match self.arena.get(id) {
            Some(NodeKind::Expr(data)) => Some(data),
            _ => None,
        }
    }

    /// Returns the declaration payload of a node.
    pub fn decl(&self, id: NodeId) -> Option<&DeclData> {
        match self.arena.get(id) {
            Some(NodeKind::Decl(data)) => Some(data),
            _ => None,
        }
    }

    /// Static-type query: the declared static type of an expression, if the
    /// collaborator recorded one.
    pub fn static_type(&self, expr: NodeId) -> Option<&str> {
        match self.arena.get(expr) {
            Some(NodeKind::Expr(ExprData::Literal { ty, .. }))
            | Some(NodeKind::Expr(ExprData::Identifier { ty, .. }))
            | Some(NodeKind::Expr(ExprData::Call { ty, .. })) => ty.as_deref(),
            _ => None,
        }
    }

    /// Replaces the expression `old` with `new` by repointing the parent's
    /// child slot. `new` adopts `old`'s parent; `old` becomes garbage.
    ///
    /// Works for expressions held by a call (receiver or argument), an
    /// annotation attribute, or a declaration (statement or initializer).
    pub fn replace_expr(&mut self, old: NodeId, new: NodeId) -> Result<(), TreeError> {
        if old == new {
            return Ok(());
        }
        if !self.arena.contains(new) {
            return Err(TreeError::UnknownNode(new));
        }
        let parent = self.parent(old).ok_or(TreeError::NotAttached(old))?;
        let repointed = match self.arena.get_mut(parent) {
            Some(NodeKind::Expr(ExprData::Call { receiver, args, .. })) => {
                if *receiver == Some(old) {
                    *receiver = Some(new);
                    true
                } else if let Some(slot) = args.iter_mut().find(|a| **a == old) {
                    *slot = new;
                    true
                } else {
                    false
                }
            }
            Some(NodeKind::Annotation(data)) => {
                let mut found = false;
                for (_, value) in data.args.iter_mut() {
                    if *value == old {
                        *value = new;
                        found = true;
                        break;
                    }
                }
                found
            }
            Some(NodeKind::Decl(data)) => {
                if let Some(slot) = data.children.iter_mut().find(|c| **c == old) {
                    *slot = new;
                    true
                } else {
                    false
                }
            }
            _ => false,
        };
        if !repointed {
            return Err(TreeError::NotAttached(old));
        }
        self.parents.remove(&old);
        self.parents.insert(new, parent);
        Ok(())
    }

    /// Renders an expression back to compact source text, for diagnostics
    /// and tests.
    pub fn render_expr(&self, id: NodeId) -> String {
        match self.arena.get(id) {
            Some(NodeKind::Expr(ExprData::Literal { text, .. })) => text.clone(),
            Some(NodeKind::Expr(ExprData::Identifier { name, .. })) => name.clone(),
            Some(NodeKind::Expr(ExprData::Call {
                receiver,
                selector,
                args,
                ..
            })) => {
                let rendered_args = args
                    .iter()
                    .map(|&a| self.render_expr(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                match receiver {
                    Some(recv) => {
                        format!("{}.{}({})", self.render_expr(*recv), selector, rendered_args)
                    }
                    None => format!("{}({})", selector, rendered_args),
                }
            }
            _ => format!("<{}>", id),
        }
    }

    // ------------------------------------------------------------------
    // Enumeration and traversal
    // ------------------------------------------------------------------

    /// Enumerates every declaration reachable from the root, outermost first.
    pub fn declarations(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.arena.get(self.root) {
            Some(NodeKind::Unit { decls }) => decls.iter().rev().copied().collect(),
            _ => Vec::new(),
        };
        while let Some(id) = stack.pop() {
            if let Some(NodeKind::Decl(data)) = self.arena.get(id) {
                out.push(id);
                stack.extend(data.children.iter().rev().copied());
            }
        }
        out
    }

    /// Returns a bottom-up (post-order, depth-first) traversal of the unit:
    /// every node appears after all of its children. For calls the order is
    /// receiver, then arguments left to right, then the call itself.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.post_order_into(self.root, &mut seen, &mut out);
        out
    }

    fn post_order_into(&self, id: NodeId, seen: &mut HashSet<NodeId>, out: &mut Vec<NodeId>) {
        // The ownership graph is acyclic by construction; the seen set guards
        // against malformed collaborator input.
        let Some(kind) = self.arena.get(id) else {
            return;
        };
        if !seen.insert(id) {
            return;
        }
        match kind {
            NodeKind::Unit { decls } => {
                for &decl in decls {
                    self.post_order_into(decl, seen, out);
                }
            }
            NodeKind::Decl(data) => {
                for &ann in &data.annotations {
                    self.post_order_into(ann, seen, out);
                }
                for &child in &data.children {
                    self.post_order_into(child, seen, out);
                }
            }
            NodeKind::Annotation(data) => {
                for (_, &value) in &data.args {
                    self.post_order_into(value, seen, out);
                }
            }
            NodeKind::Expr(ExprData::Call { receiver, args, .. }) => {
                if let Some(recv) = receiver {
                    self.post_order_into(*recv, seen, out);
                }
                for &arg in args {
                    self.post_order_into(arg, seen, out);
                }
            }
            NodeKind::Expr(_) => {}
        }
        out.push(id);
    }

    // ------------------------------------------------------------------
    // Unit-wide rewrites and reclamation
    // ------------------------------------------------------------------

    /// Rewrites the declared type of every declaration whose type equals
    /// `from` to `to`. Returns the number of retyped declarations.
    pub fn retype_declarations(&mut self, from: &str, to: &str) -> usize {
        let mut count = 0;
        for (_, kind) in self.arena.iter_mut() {
            if let NodeKind::Decl(data) = kind {
                if data.ty.as_deref() == Some(from) {
                    data.ty = Some(to.to_owned());
                    count += 1;
                }
            }
        }
        count
    }

    /// Reclaims every node unreachable from the root. Returns the number of
    /// reclaimed nodes. Stale parent entries for reclaimed nodes are dropped.
    pub fn compact(&mut self) -> usize {
        // The traversal's seen set is exactly the set of reachable nodes.
        let mut live = HashSet::new();
        let mut order = Vec::new();
        self.post_order_into(self.root, &mut live, &mut order);
        let reclaimed = self.arena.retain_live(&live);
        self.parents.retain(|child, _| live.contains(child));
        reclaimed
    }
}

impl Default for SourceTree {
    fn default() -> Self {
        Self::new()
    }
}
