use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub type AttrMap = Map<String, Value>;

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT REFERENCES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentOrigin {
    /// Found in the caller-supplied [`ComponentLibrary`].
    Local,
    /// Resolved by the backend's global registry.
    Global,
    /// Defined inline in the schema.
    Embedded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRef {
    pub name: String,
    pub origin: ComponentOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
}

impl ComponentRef {
    pub fn global(name: &str) -> Self {
        Self {
            name: name.to_string(),
            origin: ComponentOrigin::Global,
            definition: None,
        }
    }
}

/// Components the caller makes available by name, consulted before the global registry.
#[derive(Debug, Clone, Default)]
pub struct ComponentLibrary {
    entries: HashMap<String, Value>,
}

impl ComponentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, definition: Value) -> &mut Self {
        self.entries.insert(name.to_string(), definition);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<ComponentRef> {
        self.entries.get(name).map(|definition| ComponentRef {
            name: name.to_string(),
            origin: ComponentOrigin::Local,
            definition: Some(definition.clone()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERABLES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum NodeTarget {
    Tag(String),
    Component(ComponentRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedNode {
    pub target: NodeTarget,
    pub attrs: AttrMap,
    pub children: Vec<Rendered>,
}

/// Output of a render closure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Rendered {
    #[default]
    Empty,
    Text(String),
    Node(RenderedNode),
    List(Vec<Rendered>),
}

impl Rendered {
    /// Splice nested lists and drop empties, keeping order.
    pub fn flatten(self) -> Vec<Rendered> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<Rendered>) {
        match self {
            Rendered::Empty => {}
            Rendered::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            other => out.push(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Rendered::Empty => true,
            Rendered::List(items) => items.iter().all(Rendered::is_empty),
            _ => false,
        }
    }

    pub fn as_node(&self) -> Option<&RenderedNode> {
        match self {
            Rendered::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Rendered::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of this renderable and everything beneath it.
    pub fn text_content(&self) -> String {
        match self {
            Rendered::Empty => String::new(),
            Rendered::Text(text) => text.clone(),
            Rendered::Node(node) => node.children.iter().map(Rendered::text_content).collect(),
            Rendered::List(items) => items.iter().map(Rendered::text_content).collect(),
        }
    }
}

impl RenderedNode {
    pub fn tag(&self) -> Option<&str> {
        match &self.target {
            NodeTarget::Tag(tag) => Some(tag),
            NodeTarget::Component(_) => None,
        }
    }

    pub fn component(&self) -> Option<&ComponentRef> {
        match &self.target {
            NodeTarget::Component(component) => Some(component),
            NodeTarget::Tag(_) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

/// Turns compiled output into displayable nodes.
pub trait RenderBackend {
    /// `children` arrive flattened, in schema order.
    fn make_node(&self, target: &NodeTarget, attrs: AttrMap, children: Vec<Rendered>) -> Rendered;

    fn make_text_node(&self, text: String) -> Rendered;

    fn resolve_global_component(&self, name: &str) -> ComponentRef;
}

/// Backend producing a plain [`Rendered`] tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBackend;

impl RenderBackend for TreeBackend {
    fn make_node(&self, target: &NodeTarget, attrs: AttrMap, children: Vec<Rendered>) -> Rendered {
        Rendered::Node(RenderedNode {
            target: target.clone(),
            attrs,
            children,
        })
    }

    fn make_text_node(&self, text: String) -> Rendered {
        Rendered::Text(text)
    }

    fn resolve_global_component(&self, name: &str) -> ComponentRef {
        ComponentRef::global(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_splices_lists_and_drops_empty() {
        let rendered = Rendered::List(vec![
            Rendered::Text("a".to_string()),
            Rendered::Empty,
            Rendered::List(vec![
                Rendered::Text("b".to_string()),
                Rendered::List(vec![Rendered::Text("c".to_string())]),
            ]),
        ]);
        let flat = rendered.flatten();
        let texts: Vec<_> = flat.iter().filter_map(Rendered::as_text).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_library_resolution() {
        let mut library = ComponentLibrary::new();
        library.register("Card", json!({ "template": "card" }));
        let card = library.resolve("Card").unwrap();
        assert_eq!(card.origin, ComponentOrigin::Local);
        assert!(library.resolve("Missing").is_none());
    }

    #[test]
    fn test_rendered_serializes_tagged() {
        let node = TreeBackend.make_node(
            &NodeTarget::Tag("p".to_string()),
            AttrMap::new(),
            vec![TreeBackend.make_text_node("hi".to_string())],
        );
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "node");
        assert_eq!(json["value"]["target"], json!({ "kind": "tag", "value": "p" }));
        assert_eq!(json["value"]["children"][0], json!({ "type": "text", "value": "hi" }));
    }
}
