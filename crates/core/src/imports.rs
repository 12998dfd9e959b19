//! Import extractor and resolver (spec §4.8).

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    Default,
    Named,
    Namespace,
    Dynamic,
    Require,
}

#[derive(Debug, Clone)]
pub struct RawImport {
    pub source: String,
    pub import_type: ImportKind,
    pub names: Vec<String>,
    pub line: usize,
    pub is_type_only: bool,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub resolved: bool,
    pub target_path: Option<String>,
    pub is_external: bool,
    pub package_name: Option<String>,
}

const JS_EXT_SEARCH_ORDER: &[&str] = &["ts", "tsx", "js", "jsx", "d.ts"];

fn js_import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^\s*import\s+(type\s+)?(?:(\*\s+as\s+\w+)|(\{[^}]*\})|(\w+(?:\s*,\s*\{[^}]*\})?))?\s*(?:from\s+)?['"]([^'"]+)['"]|require\(\s*['"]([^'"]+)['"]\s*\)|import\(\s*['"]([^'"]+)['"]\s*\)"#,
        )
        .unwrap()
    })
}

/// Extract JS/TS import statements via a line-scanning regex approach.
pub fn extract_js_imports(content: &str) -> Vec<RawImport> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim_start();

        if let Some(caps) = js_import_regex().captures(trimmed) {
            if let Some(dynamic) = caps.get(6) {
                out.push(RawImport {
                    source: dynamic.as_str().to_string(),
                    import_type: ImportKind::Dynamic,
                    names: vec![],
                    line: line_no,
                    is_type_only: false,
                });
                continue;
            }
            if let Some(req) = caps.get(5) {
                out.push(RawImport {
                    source: req.as_str().to_string(),
                    import_type: ImportKind::Require,
                    names: vec![],
                    line: line_no,
                    is_type_only: false,
                });
                continue;
            }
            if let Some(source) = caps.get(4) {
                let is_type_only = caps.get(1).is_some();
                if let Some(namespace) = caps.get(2) {
                    let name = namespace
                        .as_str()
                        .rsplit_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string();
                    out.push(RawImport {
                        source: source.as_str().to_string(),
                        import_type: ImportKind::Namespace,
                        names: vec![name],
                        line: line_no,
                        is_type_only,
                    });
                } else if let Some(named) = caps.get(3) {
                    let names = named
                        .as_str()
                        .trim_matches(|c| c == '{' || c == '}')
                        .split(',')
                        .map(|s| s.split(" as ").next().unwrap_or(s).trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                    out.push(RawImport {
                        source: source.as_str().to_string(),
                        import_type: ImportKind::Named,
                        names,
                        line: line_no,
                        is_type_only,
                    });
                } else if let Some(default_spec) = caps.get(4).and(caps.get(4)) {
                    let _ = default_spec;
                    out.push(RawImport {
                        source: source.as_str().to_string(),
                        import_type: ImportKind::Default,
                        names: vec![],
                        line: line_no,
                        is_type_only,
                    });
                }
            }
        }
    }
    out
}

fn python_import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:from\s+(\.*)([\w.]*)\s+import\s+(.+)|import\s+([\w.]+))").unwrap()
    })
}

pub fn extract_python_imports(content: &str) -> Vec<RawImport> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(caps) = python_import_regex().captures(line) {
            if let Some(module) = caps.get(4) {
                out.push(RawImport {
                    source: module.as_str().to_string(),
                    import_type: ImportKind::Named,
                    names: vec![],
                    line: line_no,
                    is_type_only: false,
                });
            } else {
                let dots = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let module = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let source = format!("{dots}{module}");
                let names = caps
                    .get(3)
                    .map(|m| {
                        m.as_str()
                            .split(',')
                            .map(|s| s.split(" as ").next().unwrap_or(s).trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                out.push(RawImport {
                    source,
                    import_type: ImportKind::Named,
                    names,
                    line: line_no,
                    is_type_only: false,
                });
            }
        }
    }
    out
}

fn csharp_using_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*using\s+(?:static\s+)?([\w.]+)\s*;").unwrap())
}

pub fn extract_csharp_imports(content: &str) -> Vec<RawImport> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(caps) = csharp_using_regex().captures(line) {
            if let Some(ns) = caps.get(1) {
                out.push(RawImport {
                    source: ns.as_str().to_string(),
                    import_type: ImportKind::Named,
                    names: vec![],
                    line: line_no,
                    is_type_only: false,
                });
            }
        }
    }
    out
}

/// `tsconfig.json`/`package.json` cache keyed by project root, invalidated
/// the same way selection's whitelist cache is.
pub struct ImportResolver {
    tsconfig_cache: DashMap<PathBuf, Option<Value>>,
    package_json_cache: DashMap<PathBuf, Option<Value>>,
}

impl Default for ImportResolver {
    fn default() -> Self {
        ImportResolver { tsconfig_cache: DashMap::new(), package_json_cache: DashMap::new() }
    }
}

impl ImportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_cache(&self, project_root: &Path) {
        self.tsconfig_cache.remove(project_root);
        self.package_json_cache.remove(project_root);
    }

    fn tsconfig(&self, project_root: &Path) -> Option<Value> {
        if let Some(cached) = self.tsconfig_cache.get(project_root) {
            return cached.clone();
        }
        let path = project_root.join("tsconfig.json");
        let value = std::fs::read_to_string(&path).ok().and_then(|s| serde_json::from_str(&s).ok());
        self.tsconfig_cache.insert(project_root.to_path_buf(), value.clone());
        value
    }

    fn package_json(&self, project_root: &Path) -> Option<Value> {
        if let Some(cached) = self.package_json_cache.get(project_root) {
            return cached.clone();
        }
        let path = project_root.join("package.json");
        let value = std::fs::read_to_string(&path).ok().and_then(|s| serde_json::from_str(&s).ok());
        self.package_json_cache.insert(project_root.to_path_buf(), value.clone());
        value
    }

    pub fn resolve_js(&self, project_root: &Path, source_file: &str, specifier: &str) -> Resolution {
        if specifier.starts_with('.') {
            let source_dir = Path::new(source_file).parent().unwrap_or_else(|| Path::new(""));
            let candidate_base = source_dir.join(specifier);
            if let Some(found) = try_js_extensions(project_root, &candidate_base) {
                return resolved(found);
            }
            if specifier.ends_with(".js") || specifier.ends_with(".jsx") {
                let stripped = specifier.trim_end_matches(".jsx").trim_end_matches(".js");
                let stripped_base = source_dir.join(stripped);
                if let Some(found) = try_js_extensions(project_root, &stripped_base) {
                    return resolved(found);
                }
            }
            return unresolved_internal();
        }

        if let Some(tsconfig) = self.tsconfig(project_root) {
            if let Some(target) = resolve_tsconfig_paths(&tsconfig, specifier) {
                if let Some(found) = try_js_extensions(project_root, Path::new(&target)) {
                    return resolved(found);
                }
            }
        }

        if specifier.starts_with('#') {
            if let Some(pkg) = self.package_json(project_root) {
                if let Some(imports) = pkg.get("imports").and_then(|v| v.as_object()) {
                    if let Some(target) = imports.get(specifier).and_then(|v| v.as_str()) {
                        if let Some(found) = try_js_extensions(project_root, Path::new(target)) {
                            return resolved(found);
                        }
                    }
                }
            }
        }

        external_package_name(specifier)
    }

    pub fn resolve_python(&self, project_root: &Path, source_file: &str, specifier: &str, level: usize) -> Resolution {
        let base_dir = if level > 0 {
            let mut dir = Path::new(source_file).parent().unwrap_or_else(|| Path::new("")).to_path_buf();
            for _ in 1..level {
                dir = dir.parent().unwrap_or(&dir).to_path_buf();
            }
            project_root.join(dir)
        } else {
            project_root.to_path_buf()
        };

        let module_path = specifier.replace('.', "/");
        let candidates = [
            base_dir.join(format!("{module_path}.py")),
            base_dir.join(&module_path).join("__init__.py"),
        ];
        for candidate in &candidates {
            if candidate.exists() {
                let rel = candidate.strip_prefix(project_root).unwrap_or(candidate);
                return resolved(rel.to_string_lossy().replace('\\', "/"));
            }
        }

        if level == 0 {
            let package_name = specifier.split('.').next().unwrap_or(specifier).to_string();
            return Resolution { resolved: false, target_path: None, is_external: true, package_name: Some(package_name) };
        }
        unresolved_internal()
    }

    pub fn resolve_csharp(&self, project_root: &Path, namespace: &str) -> Resolution {
        let path = project_root.join(format!("{}.cs", namespace.replace('.', "/")));
        if path.exists() {
            let rel = path.strip_prefix(project_root).unwrap_or(&path);
            return resolved(rel.to_string_lossy().replace('\\', "/"));
        }
        Resolution {
            resolved: false,
            target_path: None,
            is_external: true,
            package_name: Some(namespace.split('.').next().unwrap_or(namespace).to_string()),
        }
    }
}

fn resolved(target_path: String) -> Resolution {
    Resolution { resolved: true, target_path: Some(target_path), is_external: false, package_name: None }
}

fn unresolved_internal() -> Resolution {
    Resolution { resolved: false, target_path: None, is_external: false, package_name: None }
}

fn external_package_name(specifier: &str) -> Resolution {
    let package_name = if specifier.starts_with('@') {
        specifier.splitn(3, '/').take(2).collect::<Vec<_>>().join("/")
    } else {
        specifier.split('/').next().unwrap_or(specifier).to_string()
    };
    Resolution { resolved: false, target_path: None, is_external: true, package_name: Some(package_name) }
}

fn try_js_extensions(project_root: &Path, base: &Path) -> Option<String> {
    let abs_base = project_root.join(base);
    if abs_base.is_file() {
        return Some(rel_str(project_root, &abs_base));
    }
    for ext in JS_EXT_SEARCH_ORDER {
        let candidate = abs_base.with_extension(ext);
        if candidate.is_file() {
            return Some(rel_str(project_root, &candidate));
        }
        let index_candidate = abs_base.join(format!("index.{ext}"));
        if index_candidate.is_file() {
            return Some(rel_str(project_root, &index_candidate));
        }
    }
    None
}

fn rel_str(project_root: &Path, path: &Path) -> String {
    path.strip_prefix(project_root).unwrap_or(path).to_string_lossy().replace('\\', "/")
}

/// Longest-concrete-match `compilerOptions.paths` alias resolution with `*`
/// capture.
fn resolve_tsconfig_paths(tsconfig: &Value, specifier: &str) -> Option<String> {
    let paths = tsconfig.get("compilerOptions")?.get("paths")?.as_object()?;
    let mut best: Option<(usize, String)> = None;
    for (pattern, targets) in paths {
        let prefix = pattern.trim_end_matches('*');
        if pattern.ends_with('*') {
            if specifier.starts_with(prefix) && prefix.len() > best.as_ref().map(|(l, _)| *l).unwrap_or(0) {
                let capture = &specifier[prefix.len()..];
                if let Some(target) = targets.as_array().and_then(|a| a.first()).and_then(|v| v.as_str()) {
                    let resolved = target.replace('*', capture);
                    best = Some((prefix.len(), resolved));
                }
            }
        } else if pattern == specifier {
            if let Some(target) = targets.as_array().and_then(|a| a.first()).and_then(|v| v.as_str()) {
                return Some(target.to_string());
            }
        }
    }
    best.map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extract_named_import() {
        let content = "import { A, B as C } from './a';\n";
        let imports = extract_js_imports(content);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].import_type, ImportKind::Named);
        assert_eq!(imports[0].names, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(imports[0].source, "./a");
    }

    #[test]
    fn extract_require_call() {
        let content = "const fs = require('fs');\n";
        let imports = extract_js_imports(content);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].import_type, ImportKind::Require);
        assert_eq!(imports[0].source, "fs");
    }

    #[test]
    fn extract_python_relative_import() {
        let content = "from .a import A\n";
        let imports = extract_python_imports(content);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].source, ".a");
        assert_eq!(imports[0].names, vec!["A".to_string()]);
    }

    #[test]
    fn resolve_relative_js_import() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const A = 1;").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/b.ts"), "import {A} from '../a';").unwrap();

        let resolver = ImportResolver::new();
        let resolution = resolver.resolve_js(dir.path(), "src/b.ts", "../a");
        assert!(resolution.resolved);
        assert_eq!(resolution.target_path.as_deref(), Some("a.ts"));
    }

    #[test]
    fn resolve_external_js_package_keeps_scope() {
        let resolver = ImportResolver::new();
        let resolution = resolver.resolve_js(Path::new("/proj"), "src/a.ts", "@scope/pkg/sub");
        assert!(resolution.is_external);
        assert_eq!(resolution.package_name.as_deref(), Some("@scope/pkg"));
    }

    #[test]
    fn resolve_python_package_import() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/mod.py"), "A = 1").unwrap();
        let resolver = ImportResolver::new();
        let resolution = resolver.resolve_python(dir.path(), "main.py", "pkg.mod", 0);
        assert!(resolution.resolved);
        assert_eq!(resolution.target_path.as_deref(), Some("pkg/mod.py"));
    }
}
