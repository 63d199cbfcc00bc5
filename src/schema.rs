//! Schema node grammar.
//!
//! Raw JSON nodes are classified once into [`SchemaNode`]. Anything that does not
//! fit the grammar becomes [`SchemaNode::Invalid`] and later compiles to nothing.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::expr::display_string;

lazy_static! {
    static ref BINDING_NAME_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

pub const KEY_ELEMENT: &str = "$el";
pub const KEY_COMPONENT: &str = "$cmp";
pub const KEY_IF: &str = "if";
pub const KEY_THEN: &str = "then";
pub const KEY_ELSE: &str = "else";
pub const KEY_ATTRS: &str = "attrs";
pub const KEY_PROPS: &str = "props";
pub const KEY_CHILDREN: &str = "children";
pub const KEY_FOR: &str = "for";
pub const KEY_LET: &str = "let";

// ═══════════════════════════════════════════════════════════════════════════════
// NODE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Element(ElementNode),
    Component(ComponentNode),
    Conditional(ConditionalNode),
    Text(TextNode),
    Invalid(InvalidNode),
}

/// Fields shared by element and component nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeParts {
    pub attrs: Option<Value>,
    pub children: Option<Children>,
    pub guard: Option<Value>,
    pub alternate: Option<Value>,
    pub bindings: Option<Map<String, Value>>,
    pub repeat: Option<LoopDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub parts: NodeParts,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentTarget {
    Named(String),
    Embedded(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentNode {
    pub target: ComponentTarget,
    pub parts: NodeParts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalNode {
    pub condition: Value,
    pub then: Value,
    pub otherwise: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidNode {
    pub raw: Value,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Children {
    Text(String),
    Nodes(Vec<Value>),
    Nested(Value),
}

/// `for: [value, collection]` or `for: [value, key, collection]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopDescriptor {
    pub value_name: String,
    pub key_name: Option<String>,
    pub values: Value,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

fn invalid(raw: &Value, reason: &'static str) -> SchemaNode {
    SchemaNode::Invalid(InvalidNode {
        raw: raw.clone(),
        reason,
    })
}

pub fn is_conditional_object(map: &Map<String, Value>) -> bool {
    map.contains_key(KEY_IF) && map.contains_key(KEY_THEN)
}

fn binding_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) if BINDING_NAME_RE.is_match(name) => Some(name.clone()),
        _ => None,
    }
}

impl LoopDescriptor {
    pub fn parse(raw: &Value) -> Option<Self> {
        let items = raw.as_array()?;
        match items.as_slice() {
            [value, values] => Some(Self {
                value_name: binding_name(value)?,
                key_name: None,
                values: values.clone(),
            }),
            [value, key, values] => Some(Self {
                value_name: binding_name(value)?,
                key_name: Some(binding_name(key)?),
                values: values.clone(),
            }),
            _ => None,
        }
    }
}

impl Children {
    fn parse(raw: &Value) -> Option<Self> {
        match raw {
            Value::Null => None,
            Value::String(text) => Some(Children::Text(text.clone())),
            Value::Array(items) => Some(Children::Nodes(items.clone())),
            Value::Object(_) => Some(Children::Nested(raw.clone())),
            Value::Bool(_) | Value::Number(_) => Some(Children::Text(display_string(raw))),
        }
    }
}

impl NodeParts {
    fn parse(map: &Map<String, Value>, attrs_key: &str, fallback_key: &str) -> Result<Self, &'static str> {
        let repeat = match map.get(KEY_FOR) {
            None => None,
            Some(raw) => Some(LoopDescriptor::parse(raw).ok_or("malformed `for` descriptor")?),
        };
        let bindings = match map.get(KEY_LET) {
            None | Some(Value::Null) => None,
            Some(Value::Object(bindings)) => Some(bindings.clone()),
            Some(_) => return Err("`let` must be an object"),
        };
        let attrs = map
            .get(attrs_key)
            .or_else(|| map.get(fallback_key))
            .filter(|value| !value.is_null())
            .cloned();
        Ok(Self {
            attrs,
            children: map.get(KEY_CHILDREN).and_then(Children::parse),
            guard: map.get(KEY_IF).cloned(),
            alternate: map.get(KEY_ELSE).cloned(),
            bindings,
            repeat,
        })
    }
}

impl SchemaNode {
    pub fn parse(raw: &Value) -> SchemaNode {
        let map = match raw {
            Value::String(text) => {
                return SchemaNode::Text(TextNode {
                    value: text.clone(),
                })
            }
            Value::Object(map) => map,
            Value::Null => return invalid(raw, "null node"),
            _ => return invalid(raw, "node must be a string or an object"),
        };

        if let Some(tag) = map.get(KEY_ELEMENT) {
            let Some(tag) = tag.as_str().filter(|tag| !tag.is_empty()) else {
                return invalid(raw, "`$el` must be a non-empty string");
            };
            return match NodeParts::parse(map, KEY_ATTRS, KEY_PROPS) {
                Ok(parts) => SchemaNode::Element(ElementNode {
                    tag: tag.to_string(),
                    parts,
                }),
                Err(reason) => invalid(raw, reason),
            };
        }

        if let Some(component) = map.get(KEY_COMPONENT) {
            let target = match component {
                Value::String(name) if !name.is_empty() => ComponentTarget::Named(name.clone()),
                Value::Object(_) => ComponentTarget::Embedded(component.clone()),
                _ => return invalid(raw, "`$cmp` must be a name or a component object"),
            };
            return match NodeParts::parse(map, KEY_PROPS, KEY_ATTRS) {
                Ok(parts) => SchemaNode::Component(ComponentNode { target, parts }),
                Err(reason) => invalid(raw, reason),
            };
        }

        if is_conditional_object(map) {
            return SchemaNode::Conditional(ConditionalNode {
                condition: map[KEY_IF].clone(),
                then: map[KEY_THEN].clone(),
                otherwise: map.get(KEY_ELSE).cloned(),
            });
        }

        if map.contains_key(KEY_IF) {
            return invalid(raw, "conditional node without `then`");
        }
        invalid(raw, "unrecognized node shape")
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, SchemaNode::Invalid(_))
    }
}
