//! Symbol extractor (spec §4.7).
//!
//! tree-sitter based, grounded on the teacher's `ast.rs` (language
//! resolution, node-kind classification, recursive walk) but with the
//! kind taxonomy and Unity specialization this system's payloads need
//! instead of the teacher's generic fn/struct/trait set.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: String,
    /// 1-based line.
    pub line: usize,
    pub column: usize,
}

impl Symbol {
    fn new(name: impl Into<String>, kind: impl Into<String>, line: usize, column: usize) -> Self {
        Symbol { name: name.into(), kind: kind.into(), line, column }
    }
}

const UNITY_LIFECYCLE_METHODS: &[&str] = &[
    "Awake", "Start", "Update", "FixedUpdate", "LateUpdate", "OnEnable", "OnDisable",
    "OnDestroy", "OnCollisionEnter", "OnCollisionExit", "OnCollisionStay", "OnTriggerEnter",
    "OnTriggerExit", "OnTriggerStay", "OnValidate", "Reset", "OnApplicationQuit",
    "OnApplicationPause", "OnApplicationFocus",
];

fn hook_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^use[A-Z0-9]").unwrap())
}

fn is_pascal_case(name: &str) -> bool {
    name.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
}

#[cfg(feature = "treesitter")]
fn ts_language(lang: &str) -> Option<tree_sitter::Language> {
    match lang {
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "csharp" => Some(tree_sitter_c_sharp::LANGUAGE.into()),
        _ => None,
    }
}

#[cfg(not(feature = "treesitter"))]
fn ts_language(_lang: &str) -> Option<()> {
    None
}

/// Extract symbols for `content` in `lang`. Returns `None` if the language
/// has no parser support at all (caller treats it as "no symbols").
pub fn extract_symbols(_path: &str, content: &str, lang: &str) -> Option<Vec<Symbol>> {
    #[cfg(feature = "treesitter")]
    {
        let language = ts_language(lang)?;
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&language).ok()?;
        let tree = parser.parse(content, None)?;
        let mut symbols = Vec::new();
        walk(tree.root_node(), content.as_bytes(), lang, None, &mut symbols);
        Some(symbols)
    }
    #[cfg(not(feature = "treesitter"))]
    {
        let _ = (content, lang);
        None
    }
}

#[cfg(feature = "treesitter")]
fn node_text<'a>(node: tree_sitter::Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

#[cfg(feature = "treesitter")]
fn field_name<'a>(node: tree_sitter::Node, field: &str, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, source))
}

#[cfg(feature = "treesitter")]
fn has_jsx_return(node: tree_sitter::Node) -> bool {
    let mut cursor = node.walk();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        let kind = n.kind();
        if kind == "jsx_element" || kind == "jsx_self_closing_element" || kind == "jsx_fragment" {
            return true;
        }
        for child in n.children(&mut cursor) {
            stack.push(child);
        }
    }
    false
}

#[cfg(feature = "treesitter")]
fn has_attribute(node: tree_sitter::Node, source: &[u8], name: &str) -> bool {
    let mut sibling = node.prev_sibling();
    while let Some(n) = sibling {
        if n.kind() == "attribute_list" {
            if node_text(n, source).contains(name) {
                return true;
            }
        } else if n.kind() != "attribute_list" && !n.is_extra() {
            break;
        }
        sibling = n.prev_sibling();
    }
    false
}

#[cfg(feature = "treesitter")]
fn walk(
    node: tree_sitter::Node,
    source: &[u8],
    lang: &str,
    current_class: Option<&str>,
    out: &mut Vec<Symbol>,
) {
    let kind = node.kind();
    let start = node.start_position();
    let line = start.row + 1;
    let column = start.column;

    let mut class_scope = current_class.map(str::to_string);

    match lang {
        "typescript" | "javascript" => match kind {
            "function_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    let is_hook = hook_pattern().is_match(name);
                    let is_component = is_pascal_case(name) && has_jsx_return(node);
                    let symbol_kind = if is_hook {
                        "hook"
                    } else if is_component {
                        "function_component"
                    } else {
                        "function"
                    };
                    out.push(Symbol::new(name, symbol_kind, line, column));
                }
            }
            "class_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "class", line, column));
                    class_scope = Some(name.to_string());
                }
            }
            "method_definition" => {
                if let Some(name) = field_name(node, "name", source) {
                    let qualified = match &class_scope {
                        Some(c) => format!("{c}.{name}"),
                        None => name.to_string(),
                    };
                    out.push(Symbol::new(qualified, "method", line, column));
                }
            }
            "public_field_definition" | "field_definition" => {
                if let Some(name) = field_name(node, "property", source).or_else(|| field_name(node, "name", source)) {
                    let text = node_text(node, source);
                    let kind = if text.starts_with('#') || name.starts_with('#') {
                        "private_field"
                    } else if text.contains("get ") || text.contains("set ") {
                        "accessor"
                    } else {
                        "property"
                    };
                    out.push(Symbol::new(name, kind, line, column));
                }
            }
            "interface_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "interface", line, column));
                }
            }
            "type_alias_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "type", line, column));
                }
            }
            "enum_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "enum", line, column));
                }
            }
            "internal_module" | "module" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "namespace", line, column));
                }
            }
            "lexical_declaration" => {
                if node_text(node, source).trim_start().starts_with("const") {
                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        if child.kind() == "variable_declarator" {
                            if let Some(name) = field_name(child, "name", source) {
                                let value = child.child_by_field_name("value");
                                let is_component = is_pascal_case(name)
                                    && value.map(|v| has_jsx_return(v)).unwrap_or(false);
                                out.push(Symbol::new(
                                    name,
                                    if is_component { "function_component" } else { "const" },
                                    line,
                                    column,
                                ));
                            }
                        }
                    }
                }
            }
            "export_statement" => {
                if node_text(node, source).contains("export default") {
                    out.push(Symbol::new("default", "default_export", line, column));
                }
            }
            "identifier" => {
                out.push(Symbol::new(node_text(node, source), "reference", line, column));
            }
            _ => {}
        },
        "python" => match kind {
            "function_definition" => {
                if let Some(name) = field_name(node, "name", source) {
                    let qualified = match &class_scope {
                        Some(c) => format!("{c}.{name}"),
                        None => name.to_string(),
                    };
                    out.push(Symbol::new(qualified, if class_scope.is_some() { "method" } else { "function" }, line, column));
                }
            }
            "class_definition" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "class", line, column));
                    class_scope = Some(name.to_string());
                }
            }
            "identifier" => {
                out.push(Symbol::new(node_text(node, source), "reference", line, column));
            }
            _ => {}
        },
        "csharp" => match kind {
            "class_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    let text = node_text(node, source);
                    let is_scriptable = text.contains("ScriptableObject") || has_attribute(node, source, "CreateAssetMenu");
                    out.push(Symbol::new(
                        name,
                        if is_scriptable { "scriptable_object" } else { "class" },
                        line,
                        column,
                    ));
                    class_scope = Some(name.to_string());
                }
            }
            "struct_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "struct", line, column));
                }
            }
            "interface_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "interface", line, column));
                }
            }
            "enum_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    out.push(Symbol::new(name, "enum", line, column));
                }
            }
            "method_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    let qualified = match &class_scope {
                        Some(c) => format!("{c}.{name}"),
                        None => name.to_string(),
                    };
                    let kind = if UNITY_LIFECYCLE_METHODS.contains(&name) { "unity_lifecycle" } else { "method" };
                    out.push(Symbol::new(qualified, kind, line, column));
                }
            }
            "property_declaration" => {
                if let Some(name) = field_name(node, "name", source) {
                    let kind = if has_attribute(node, source, "SerializeField") { "serialized_field" } else { "property" };
                    out.push(Symbol::new(name, kind, line, column));
                }
            }
            "field_declaration" => {
                let text = node_text(node, source);
                let serialized = has_attribute(node, source, "SerializeField")
                    || (text.contains("public ")
                        && !text.contains("static ")
                        && !has_attribute(node, source, "NonSerialized")
                        && !has_attribute(node, source, "HideInInspector"));
                if serialized {
                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        if child.kind() == "variable_declaration" {
                            let mut inner_cursor = child.walk();
                            for declarator in child.children(&mut inner_cursor) {
                                if declarator.kind() == "variable_declarator" {
                                    if let Some(name) = field_name(declarator, "name", source) {
                                        out.push(Symbol::new(name, "serialized_field", line, column));
                                    }
                                }
                            }
                        }
                    }
                }
            }
            "identifier" => {
                out.push(Symbol::new(node_text(node, source), "reference", line, column));
            }
            _ => {}
        },
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, lang, class_scope.as_deref(), out);
    }
}

/// Returns `false` only when the tree-sitter node at `(line-1, col)` is a
/// comment, string, or character literal. Fails open (`true`) for
/// unsupported languages or parse failures.
pub fn is_code_at_position(content: &str, lang: &str, line: usize, col: usize) -> bool {
    #[cfg(feature = "treesitter")]
    {
        let Some(language) = ts_language(lang) else { return true };
        let mut parser = tree_sitter::Parser::new();
        if parser.set_language(&language).is_err() {
            return true;
        }
        let Some(tree) = parser.parse(content, None) else { return true };
        let point = tree_sitter::Point { row: line.saturating_sub(1), column: col };
        let Some(node) = tree.root_node().descendant_for_point_range(point, point) else { return true };
        !matches!(
            node.kind(),
            "comment" | "string" | "string_fragment" | "character_literal" | "template_string"
        )
    }
    #[cfg(not(feature = "treesitter"))]
    {
        let _ = (content, lang, line, col);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_pattern_matches_use_prefixed_names() {
        assert!(hook_pattern().is_match("useState"));
        assert!(hook_pattern().is_match("use1Thing"));
        assert!(!hook_pattern().is_match("used"));
        assert!(!hook_pattern().is_match("useless_no_caps"));
    }

    #[test]
    fn pascal_case_detection() {
        assert!(is_pascal_case("MyComponent"));
        assert!(!is_pascal_case("myComponent"));
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn extract_symbols_finds_typescript_function_and_class() {
        let content = "export function add(a, b) { return a + b; }\nclass Foo { bar() {} }";
        let symbols = extract_symbols("a.ts", content, "typescript").unwrap();
        assert!(symbols.iter().any(|s| s.name == "add" && s.kind == "function"));
        assert!(symbols.iter().any(|s| s.name == "Foo" && s.kind == "class"));
        assert!(symbols.iter().any(|s| s.name == "Foo.bar" && s.kind == "method"));
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn extract_symbols_detects_react_hook() {
        let content = "function useCounter() { return 1; }";
        let symbols = extract_symbols("a.ts", content, "typescript").unwrap();
        assert!(symbols.iter().any(|s| s.name == "useCounter" && s.kind == "hook"));
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn extract_symbols_detects_unity_lifecycle_method() {
        let content = "class Player : MonoBehaviour { void Update() {} }";
        let symbols = extract_symbols("a.cs", content, "csharp").unwrap();
        assert!(symbols.iter().any(|s| s.kind == "unity_lifecycle" && s.name.ends_with("Update")));
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn is_code_at_position_is_false_inside_string() {
        let content = "let x = \"hello world\";";
        assert!(!is_code_at_position(content, "javascript", 1, 10));
    }

    #[test]
    fn is_code_at_position_fails_open_for_unsupported_language() {
        assert!(is_code_at_position("anything", "plaintext", 1, 0));
    }
}
