//! End-to-end rendering: schema in, rendered tree out, re-rendered on data changes.

#[cfg(test)]
mod tests {
    use crate::backend::{
        AttrMap, ComponentLibrary, ComponentOrigin, ComponentRef, NodeTarget, RenderBackend,
        Rendered, RenderedNode, TreeBackend,
    };
    use crate::compiler::SchemaCompiler;
    use crate::context::EvalContext;
    use crate::expr::BasicExpressionCompiler;
    use crate::options::CompileOptions;
    use crate::reactive::Reactive;
    use crate::view::SchemaView;
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::rc::Rc;

    fn render(schema: Value, data: Value) -> Rendered {
        let compiler = SchemaCompiler::new(Reactive::new(data), ComponentLibrary::new());
        let render = compiler.compile(&schema).unwrap();
        render(&mut EvalContext::new())
    }

    fn node(rendered: &Rendered) -> &RenderedNode {
        rendered.as_node().expect("expected a node")
    }

    fn texts(nodes: &[Rendered]) -> Vec<String> {
        nodes.iter().map(Rendered::text_content).collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // ELEMENTS & TEXT
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_reactive_attribute_and_text() {
        let data = Reactive::new(json!({ "count": 2 }));
        let schema = json!({
            "$el": "div",
            "attrs": { "data-x": "$count" },
            "children": [{ "if": "$count > 1", "then": "many", "else": "few" }]
        });
        let mut view = SchemaView::new(&schema, data.clone(), ComponentLibrary::new()).unwrap();

        let div = node(view.output());
        assert_eq!(div.tag(), Some("div"));
        assert_eq!(div.attrs.get("data-x"), Some(&json!(2)));
        assert_eq!(div.children, vec![Rendered::Text("many".to_string())]);

        data.set("count", json!(1));
        let div = node(view.update().unwrap());
        assert_eq!(div.attrs.get("data-x"), Some(&json!(1)));
        assert_eq!(div.children, vec![Rendered::Text("few".to_string())]);
    }

    #[test]
    fn test_ternary_text_child() {
        let out = render(
            json!({ "$el": "p", "children": "$n > 1 ? 'many' : 'few'" }),
            json!({ "n": 1 }),
        );
        assert_eq!(out.text_content(), "few");
    }

    #[test]
    fn test_plain_and_dynamic_text_nodes() {
        let out = render(json!(["Total: ", "$total", "$"]), json!({ "total": 4.0 }));
        assert_eq!(texts(&out.flatten()), vec!["Total: ", "4", "$"]);
    }

    #[test]
    fn test_scalar_children_are_stringified() {
        let out = render(json!({ "$el": "span", "children": 42 }), json!({}));
        assert_eq!(node(&out).children, vec![Rendered::Text("42".to_string())]);
        let out = render(json!({ "$el": "span", "children": true }), json!({}));
        assert_eq!(out.text_content(), "true");
    }

    #[test]
    fn test_nested_object_child() {
        let out = render(
            json!({ "$el": "p", "children": { "$el": "b", "children": "bold" } }),
            json!({}),
        );
        let p = node(&out);
        assert_eq!(p.children.len(), 1);
        assert_eq!(node(&p.children[0]).tag(), Some("b"));
        assert_eq!(out.text_content(), "bold");
    }

    #[test]
    fn test_props_alias_on_elements() {
        let out = render(json!({ "$el": "img", "props": { "src": "$url" } }), json!({ "url": "/a.png" }));
        assert_eq!(node(&out).attrs.get("src"), Some(&json!("/a.png")));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // LOOPS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_object_loop_values_in_order() {
        let out = render(
            json!({ "$el": "ul", "children": [{ "$el": "li", "for": ["v", "k", "$items"], "children": "$v" }] }),
            json!({ "items": { "a": 1, "b": 2 } }),
        );
        assert_eq!(texts(&node(&out).children), vec!["1", "2"]);
    }

    #[test]
    fn test_object_loop_with_key() {
        let out = render(
            json!({
                "$el": "ul",
                "children": [{ "$el": "li", "for": ["v", "k", "$items"], "children": "$k + ': ' + $v" }]
            }),
            json!({ "items": { "a": 1, "b": 2 } }),
        );
        let ul = node(&out);
        assert_eq!(ul.children.len(), 2);
        assert!(ul.children.iter().all(|li| node(li).tag() == Some("li")));
        assert_eq!(texts(&ul.children), vec!["a: 1", "b: 2"]);
    }

    #[test]
    fn test_array_and_numeric_loops() {
        let out = render(
            json!({ "$el": "i", "for": ["item", "i", "$list"], "children": "$i + '=' + $item" }),
            json!({ "list": ["x", "y"] }),
        );
        assert_eq!(texts(&out.flatten()), vec!["0=x", "1=y"]);

        let out = render(json!({ "$el": "i", "for": ["n", 3], "children": "$n" }), json!({}));
        assert_eq!(texts(&out.flatten()), vec!["0", "1", "2"]);
    }

    #[test]
    fn test_nested_loops_see_outer_frame() {
        let out = render(
            json!({
                "$el": "table",
                "children": [{
                    "$el": "tr",
                    "for": ["row", "$rows"],
                    "children": [{
                        "$el": "td",
                        "for": ["cell", "$row.cells"],
                        "children": "$row.label + $cell"
                    }]
                }]
            }),
            json!({ "rows": [
                { "label": "a", "cells": [1, 2] },
                { "label": "b", "cells": [3] }
            ] }),
        );
        let rows = &node(&out).children;
        assert_eq!(rows.len(), 2);
        assert_eq!(texts(&node(&rows[0]).children), vec!["a1", "a2"]);
        assert_eq!(texts(&node(&rows[1]).children), vec!["b3"]);
    }

    #[test]
    fn test_loop_rerenders_when_collection_grows() {
        let data = Reactive::new(json!({ "items": ["a"] }));
        let schema = json!({ "$el": "ul", "children": [{ "$el": "li", "for": ["it", "$items"], "children": "$it" }] });
        let mut view = SchemaView::new(&schema, data.clone(), ComponentLibrary::new()).unwrap();
        assert_eq!(node(view.output()).children.len(), 1);

        data.set("items.1", json!("b"));
        let ul = node(view.update().unwrap());
        assert_eq!(texts(&ul.children), vec!["a", "b"]);
    }

    #[test]
    fn test_item_missing_field_does_not_inherit_previous_item() {
        let out = render(
            json!({ "$el": "li", "for": ["item", "$items"], "children": "$item.name" }),
            json!({ "items": [{ "name": "a" }, {}] }),
        );
        assert_eq!(texts(&out.flatten()), vec!["a", ""]);
    }

    #[test]
    fn test_length_rerenders_after_append() {
        let data = Reactive::new(json!({ "items": [1, 2] }));
        let mut view = SchemaView::new(
            &json!({ "$el": "p", "children": "$items.length" }),
            data.clone(),
            ComponentLibrary::new(),
        )
        .unwrap();
        assert_eq!(view.output().text_content(), "2");

        data.set("items.2", json!(3));
        assert_eq!(view.update().unwrap().text_content(), "3");
        data.remove("items.0");
        assert_eq!(view.update().unwrap().text_content(), "2");
    }

    #[test]
    fn test_loop_limit_option() {
        let options = CompileOptions {
            loop_limit: Some(2),
            ..CompileOptions::default()
        };
        let compiler =
            SchemaCompiler::with_options(Reactive::default(), ComponentLibrary::new(), options).unwrap();
        let render = compiler
            .compile(&json!({ "$el": "i", "for": ["n", 10], "children": "$n" }))
            .unwrap();
        assert_eq!(render(&mut EvalContext::new()).flatten().len(), 2);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SCOPES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_let_shadowing_is_restored_for_later_siblings() {
        let out = render(
            json!({
                "$el": "section",
                "let": { "title": "outer" },
                "children": [
                    { "$el": "h1", "children": "$title" },
                    { "$el": "div", "let": { "title": "inner" }, "children": "$title" },
                    { "$el": "p", "children": "$title" }
                ]
            }),
            json!({ "title": "data" }),
        );
        assert_eq!(texts(&node(&out).children), vec!["outer", "inner", "outer"]);
    }

    #[test]
    fn test_let_does_not_leak_to_siblings() {
        let out = render(
            json!([
                { "$el": "a", "let": { "x": "mine" }, "children": "$x" },
                { "$el": "b", "children": "$x" }
            ]),
            json!({ "x": "root" }),
        );
        assert_eq!(texts(&out.flatten()), vec!["mine", "root"]);
    }

    #[test]
    fn test_let_visible_to_own_attributes() {
        let out = render(
            json!({ "$el": "a", "let": { "href": "/home" }, "attrs": { "href": "$href" } }),
            json!({}),
        );
        assert_eq!(node(&out).attrs.get("href"), Some(&json!("/home")));
    }

    #[test]
    fn test_let_values_are_literal() {
        let out = render(
            json!({ "$el": "p", "let": { "x": "$y" }, "children": "$x" }),
            json!({ "y": "resolved" }),
        );
        assert_eq!(out.text_content(), "$y");
    }

    #[test]
    fn test_loop_frame_beats_let_binding() {
        let out = render(
            json!({
                "$el": "ul",
                "let": { "v": "scope" },
                "children": [{ "$el": "li", "for": ["v", [1, 2]], "children": "$v" }]
            }),
            json!({}),
        );
        assert_eq!(texts(&node(&out).children), vec!["1", "2"]);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CONDITIONALS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_conditional_node_branches() {
        let schema = json!({ "if": "$ok", "then": { "$el": "b", "children": "yes" }, "else": "no" });
        let data = Reactive::new(json!({ "ok": true }));
        let mut view = SchemaView::new(&schema, data.clone(), ComponentLibrary::new()).unwrap();
        assert_eq!(view.output().text_content(), "yes");

        data.set("ok", json!(false));
        assert_eq!(view.update().unwrap(), &Rendered::Text("no".to_string()));
    }

    #[test]
    fn test_conditional_without_else_renders_nothing() {
        let out = render(json!({ "if": "$ok", "then": "yes" }), json!({ "ok": 0 }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_element_guard_and_else() {
        let schema = json!({
            "$el": "p",
            "if": "$user",
            "children": "$user.name",
            "else": { "$el": "span", "children": "anonymous" }
        });
        let out = render(schema.clone(), json!({ "user": { "name": "Ada" } }));
        assert_eq!(node(&out).tag(), Some("p"));
        assert_eq!(out.text_content(), "Ada");

        let out = render(schema, json!({ "user": null }));
        assert_eq!(node(&out).tag(), Some("span"));
        assert_eq!(out.text_content(), "anonymous");
    }

    #[test]
    fn test_guard_inside_loop_filters_items() {
        let out = render(
            json!({ "$el": "i", "for": ["n", "$nums"], "if": "$n % 2 === 0", "children": "$n" }),
            json!({ "nums": [1, 2, 3, 4] }),
        );
        assert_eq!(texts(&out.flatten()), vec!["2", "4"]);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COMPONENTS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_library_component_with_props() {
        let mut library = ComponentLibrary::new();
        library.register("Card", json!({ "template": "card" }));
        let compiler = SchemaCompiler::new(Reactive::new(json!({ "t": "Hello" })), library);
        let render = compiler
            .compile(&json!({ "$cmp": "Card", "props": { "title": "$t" }, "children": "body" }))
            .unwrap();
        let out = render(&mut EvalContext::new());
        let card = node(&out);
        let component = card.component().unwrap();
        assert_eq!(component.name, "Card");
        assert_eq!(component.origin, ComponentOrigin::Local);
        assert_eq!(component.definition, Some(json!({ "template": "card" })));
        assert_eq!(card.attrs.get("title"), Some(&json!("Hello")));
        assert_eq!(card.children, vec![Rendered::Text("body".to_string())]);
    }

    #[test]
    fn test_unknown_component_falls_back_to_global() {
        let out = render(json!({ "$cmp": "Badge" }), json!({}));
        let component = node(&out).component().unwrap();
        assert_eq!(component.origin, ComponentOrigin::Global);
        assert_eq!(component.name, "Badge");
    }

    #[test]
    fn test_embedded_component() {
        let out = render(json!({ "$cmp": { "name": "Inline", "template": "<i/>" } }), json!({}));
        let component = node(&out).component().unwrap();
        assert_eq!(component.origin, ComponentOrigin::Embedded);
        assert_eq!(component.name, "Inline");

        let out = render(json!({ "$cmp": { "template": "<i/>" } }), json!({}));
        assert_eq!(node(&out).component().unwrap().name, "anonymous");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CUSTOM BACKEND
    // ═══════════════════════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct CountingBackend {
        nodes: Cell<usize>,
    }

    impl RenderBackend for CountingBackend {
        fn make_node(&self, target: &NodeTarget, attrs: AttrMap, children: Vec<Rendered>) -> Rendered {
            self.nodes.set(self.nodes.get() + 1);
            TreeBackend.make_node(target, attrs, children)
        }

        fn make_text_node(&self, text: String) -> Rendered {
            Rendered::Text(text.to_uppercase())
        }

        fn resolve_global_component(&self, name: &str) -> ComponentRef {
            ComponentRef::global(&format!("ui-{}", name.to_lowercase()))
        }
    }

    #[test]
    fn test_custom_backend_receives_every_node() {
        let backend = Rc::new(CountingBackend::default());
        let compiler = SchemaCompiler::with_parts(
            Reactive::new(json!({ "items": [1, 2, 3] })),
            ComponentLibrary::new(),
            CompileOptions::default(),
            backend.clone(),
            Rc::new(BasicExpressionCompiler::new()),
        )
        .unwrap();
        let render = compiler
            .compile(&json!({
                "$el": "ul",
                "children": [
                    { "$el": "li", "for": ["n", "$items"], "children": "item" },
                    { "$cmp": "Button" }
                ]
            }))
            .unwrap();
        let out = render(&mut EvalContext::new());
        assert_eq!(backend.nodes.get(), 5);
        let ul = node(&out);
        assert_eq!(ul.children[0].text_content(), "ITEM");
        assert_eq!(node(&ul.children[3]).component().unwrap().name, "ui-button");
    }
}
