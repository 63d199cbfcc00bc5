//! Per-node compiler.
//!
//! Each raw node is classified, compiled into a [`NodeArtifact`], and the artifact
//! is assembled into the node's render closure. Assembly rules, evaluated on every
//! call:
//!
//! 1. No element (bare conditional): render `then` when the condition holds,
//!    otherwise `else` or nothing.
//! 2. Element present and the guard absent or truthy: a text node from the
//!    stringified children, or a backend node with fresh attributes and the
//!    flattened children list.
//! 3. Otherwise: the alternate, or nothing.
//!
//! A `for` descriptor wraps the assembled closure last.

use log::{debug, warn};
use serde_json::Value;
use std::rc::Rc;

use crate::attrs::AttrsFn;
use crate::backend::{ComponentOrigin, ComponentRef, NodeTarget, RenderBackend, Rendered};
use crate::compiler::{CompileEnv, RenderFn};
use crate::context::{EvalContext, EvalFn};
use crate::error::SchemaError;
use crate::expr::{display_string, truthy};
use crate::iteration::CompiledLoop;
use crate::schema::{Children, ComponentTarget, NodeParts, SchemaNode};
use crate::scope::ScopePath;

pub(crate) type TextFn = Rc<dyn Fn(&mut EvalContext) -> String>;

pub(crate) enum NodeElement {
    Text,
    Target(NodeTarget),
}

pub(crate) enum ChildrenFn {
    Text(TextFn),
    Nodes(RenderFn),
}

impl ChildrenFn {
    fn text(&self, ctx: &mut EvalContext) -> String {
        match self {
            ChildrenFn::Text(text) => text(ctx),
            ChildrenFn::Nodes(render) => render(ctx).text_content(),
        }
    }

    fn render(&self, ctx: &mut EvalContext, backend: &dyn RenderBackend) -> Rendered {
        match self {
            ChildrenFn::Text(text) => backend.make_text_node(text(ctx)),
            ChildrenFn::Nodes(render) => render(ctx),
        }
    }
}

/// Output of compiling one node, consumed by [`CompileEnv::assemble`].
pub(crate) struct NodeArtifact {
    pub(crate) condition: Option<EvalFn>,
    pub(crate) element: Option<NodeElement>,
    pub(crate) attrs: AttrsFn,
    pub(crate) children: Option<ChildrenFn>,
    pub(crate) alternate: Option<RenderFn>,
    pub(crate) scope: ScopePath,
    pub(crate) iterator: Option<CompiledLoop>,
}

impl NodeArtifact {
    fn empty(scope: ScopePath) -> Self {
        Self {
            condition: None,
            element: None,
            attrs: Rc::new(|_: &mut EvalContext| None),
            children: None,
            alternate: None,
            scope,
            iterator: None,
        }
    }
}

fn render_nothing() -> RenderFn {
    Rc::new(|_: &mut EvalContext| Rendered::Empty)
}

impl CompileEnv {
    pub(crate) fn compile_node(&self, raw: &Value, scope: ScopePath) -> Result<RenderFn, SchemaError> {
        let artifact = match SchemaNode::parse(raw) {
            SchemaNode::Element(element) => self.compile_markup(
                scope,
                NodeElement::Target(NodeTarget::Tag(element.tag)),
                &element.parts,
            )?,
            SchemaNode::Component(component) => {
                let target = NodeTarget::Component(self.resolve_component(component.target));
                self.compile_markup(scope, NodeElement::Target(target), &component.parts)?
            }
            SchemaNode::Conditional(node) => {
                let conditional = self.compile_conditional(&scope, &node)?;
                NodeArtifact {
                    condition: Some(conditional.condition),
                    children: Some(ChildrenFn::Nodes(conditional.then)),
                    alternate: conditional.otherwise,
                    ..NodeArtifact::empty(scope)
                }
            }
            SchemaNode::Text(text) => NodeArtifact {
                element: Some(NodeElement::Text),
                children: Some(self.compile_text(&scope, &text.value)?),
                ..NodeArtifact::empty(scope)
            },
            SchemaNode::Invalid(invalid) => {
                if self.options.warn_on_invalid {
                    warn!(
                        "[SchemaNative] skipping schema node ({}): {}",
                        invalid.reason, invalid.raw
                    );
                }
                return Ok(render_nothing());
            }
        };
        Ok(self.assemble(artifact))
    }

    fn compile_markup(
        &self,
        scope: ScopePath,
        element: NodeElement,
        parts: &NodeParts,
    ) -> Result<NodeArtifact, SchemaError> {
        // Bindings go in before anything beneath this node is compiled.
        if let Some(bindings) = &parts.bindings {
            self.resolver.store().merge(&scope, bindings);
        }
        let attrs = self.compile_attrs(&scope, parts.attrs.as_ref())?;
        let condition = parts
            .guard
            .as_ref()
            .map(|guard| self.compile_condition(&scope, guard))
            .transpose()?;
        let children = parts
            .children
            .as_ref()
            .map(|children| self.compile_children(&scope, children))
            .transpose()?;
        let alternate = parts
            .alternate
            .as_ref()
            .map(|alternate| self.compile_schema(alternate, &scope))
            .transpose()?;
        let iterator = parts
            .repeat
            .as_ref()
            .map(|descriptor| self.compile_loop(&scope, descriptor))
            .transpose()?;
        Ok(NodeArtifact {
            condition,
            element: Some(element),
            attrs,
            children,
            alternate,
            scope,
            iterator,
        })
    }

    fn compile_text(&self, scope: &ScopePath, text: &str) -> Result<ChildrenFn, SchemaError> {
        if self.options.is_dynamic(text) {
            let expr = self.compile_expression(scope, text)?;
            return Ok(ChildrenFn::Text(Rc::new(move |ctx: &mut EvalContext| {
                display_string(&expr(ctx))
            })));
        }
        let text = text.to_string();
        Ok(ChildrenFn::Text(Rc::new(move |_: &mut EvalContext| text.clone())))
    }

    fn compile_children(&self, scope: &ScopePath, children: &Children) -> Result<ChildrenFn, SchemaError> {
        match children {
            Children::Text(text) => self.compile_text(scope, text),
            Children::Nodes(nodes) => Ok(ChildrenFn::Nodes(self.compile_list(nodes, scope)?)),
            Children::Nested(node) => Ok(ChildrenFn::Nodes(self.compile_schema(node, scope)?)),
        }
    }

    fn resolve_component(&self, target: ComponentTarget) -> ComponentRef {
        match target {
            ComponentTarget::Named(name) => match self.library.resolve(&name) {
                Some(local) => local,
                None => {
                    debug!("[SchemaNative] component '{}' not in library, using global registry", name);
                    self.backend.resolve_global_component(&name)
                }
            },
            ComponentTarget::Embedded(definition) => ComponentRef {
                name: definition
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("anonymous")
                    .to_string(),
                origin: ComponentOrigin::Embedded,
                definition: Some(definition),
            },
        }
    }

    fn assemble(&self, artifact: NodeArtifact) -> RenderFn {
        let NodeArtifact {
            condition,
            element,
            attrs,
            children,
            alternate,
            scope,
            iterator,
        } = artifact;
        let backend = self.backend.clone();

        let render: RenderFn = match element {
            None => {
                let Some(condition) = condition else {
                    return render_nothing();
                };
                Rc::new(move |ctx: &mut EvalContext| {
                    if truthy(&condition(ctx)) {
                        match &children {
                            Some(children) => children.render(ctx, backend.as_ref()),
                            None => Rendered::Empty,
                        }
                    } else {
                        match &alternate {
                            Some(alternate) => alternate(ctx),
                            None => Rendered::Empty,
                        }
                    }
                })
            }
            Some(element) => Rc::new(move |ctx: &mut EvalContext| {
                let passes = match &condition {
                    Some(condition) => truthy(&condition(ctx)),
                    None => true,
                };
                if !passes {
                    return match &alternate {
                        Some(alternate) => alternate(ctx),
                        None => Rendered::Empty,
                    };
                }
                match &element {
                    NodeElement::Text => {
                        let text = children
                            .as_ref()
                            .map(|children| children.text(ctx))
                            .unwrap_or_default();
                        backend.make_text_node(text)
                    }
                    NodeElement::Target(target) => {
                        let attrs = attrs(ctx).unwrap_or_default();
                        let children = match &children {
                            Some(children) => children.render(ctx, backend.as_ref()).flatten(),
                            None => Vec::new(),
                        };
                        backend.make_node(target, attrs, children)
                    }
                }
            }),
        };

        match iterator {
            Some(iterator) => {
                debug!("[SchemaNative] wrapping node {:?} in a loop", scope.innermost());
                iterator.wrap(render)
            }
            None => render,
        }
    }
}
