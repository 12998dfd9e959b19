//! File-selection policy (spec §4.5).
//!
//! Combines a project-local whitelist (`.indexer/to-index`) with gitignore
//! semantics, the way the teacher's `scan.rs` drives `ignore::WalkBuilder`
//! but layered with an extra whitelist stage the teacher does not have.

use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

const DEFAULT_EXCLUDES: &[&str] = &[
    ".git/**",
    "node_modules/**",
    "target/**",
    "dist/**",
    "build/**",
    "out/**",
    ".next/**",
    "vendor/**",
    "*.min.js",
    "*.min.css",
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.ico",
    "*.svg",
    "*.webp",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.eot",
    "*.mp4",
    "*.mov",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.pdf",
    "*.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
];

const FIXED_EXCLUDED_EXTENSIONS: &[&str] = &["lock"];

#[derive(Debug, Clone, Default)]
struct Whitelist {
    dir_globs: Vec<String>,
    exts: Vec<String>,
    present: bool,
}

fn parse_whitelist(content: &str) -> Whitelist {
    let mut dir_globs = Vec::new();
    let mut exts = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("dir:") {
            let rest = rest.trim();
            if rest.contains('*') {
                dir_globs.push(rest.to_string());
            } else {
                let trimmed = rest.trim_end_matches('/');
                dir_globs.push(format!("{trimmed}/**/*"));
            }
        } else if let Some(rest) = line.strip_prefix("ext:") {
            let rest = rest.trim();
            let rest = rest.strip_prefix('.').unwrap_or(rest);
            exts.push(rest.to_lowercase());
        }
    }
    Whitelist { dir_globs, exts, present: true }
}

struct CachedPolicy {
    dir_glob_set: Option<GlobSet>,
    exts: HashSet<String>,
    whitelist_present: bool,
    whitelist_empty: bool,
    exclude_set: GlobSet,
}

static CACHE: OnceLock<Mutex<std::collections::HashMap<PathBuf, std::sync::Arc<CachedPolicy>>>> =
    OnceLock::new();

fn cache() -> &'static Mutex<std::collections::HashMap<PathBuf, std::sync::Arc<CachedPolicy>>> {
    CACHE.get_or_init(|| Mutex::new(std::collections::HashMap::new()))
}

/// Invalidate the cached policy for `project_root`.
pub fn reset_config_cache(project_root: &Path) {
    cache().lock().unwrap().remove(project_root);
}

fn build_exclude_set() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().expect("default exclude globs compile")
}

fn load_policy(project_root: &Path) -> std::sync::Arc<CachedPolicy> {
    if let Some(hit) = cache().lock().unwrap().get(project_root) {
        return hit.clone();
    }

    let whitelist_path = project_root.join(".indexer").join("to-index");
    let whitelist = std::fs::read_to_string(&whitelist_path)
        .ok()
        .map(|content| parse_whitelist(&content))
        .unwrap_or_default();

    let dir_glob_set = if whitelist.dir_globs.is_empty() {
        None
    } else {
        let mut builder = GlobSetBuilder::new();
        for pattern in &whitelist.dir_globs {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        builder.build().ok()
    };

    let policy = std::sync::Arc::new(CachedPolicy {
        dir_glob_set,
        exts: whitelist.exts.iter().cloned().collect(),
        whitelist_present: whitelist.present,
        whitelist_empty: whitelist.present && whitelist.dir_globs.is_empty() && whitelist.exts.is_empty(),
        exclude_set: build_exclude_set(),
    });

    cache().lock().unwrap().insert(project_root.to_path_buf(), policy.clone());
    policy
}

fn is_indexable(project_root: &Path, rel_path: &Path, policy: &CachedPolicy) -> bool {
    if policy.whitelist_present && policy.whitelist_empty {
        return false;
    }
    if let Some(set) = &policy.dir_glob_set {
        if !set.is_match(rel_path) {
            return false;
        }
    }
    if !policy.exts.is_empty() {
        let ext = rel_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !policy.exts.contains(&ext) {
            return false;
        }
    }
    if policy.exclude_set.is_match(rel_path) {
        return false;
    }
    let ext = rel_path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if FIXED_EXCLUDED_EXTENSIONS.contains(&ext) {
        return false;
    }
    let _ = project_root;
    true
}

/// Enumerate files under `project_root` passing the whitelist, gitignore,
/// and fixed-exclusion rules.
pub fn select_files(project_root: &Path) -> Result<Vec<PathBuf>> {
    let policy = load_policy(project_root);
    let mut out = Vec::new();

    let walker = WalkBuilder::new(project_root)
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let rel = match path.strip_prefix(project_root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if is_indexable(project_root, rel, &policy) {
            out.push(path.to_path_buf());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn missing_whitelist_includes_everything() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const A = 1");
        write(dir.path(), "README.md", "# hi");
        let files = select_files(dir.path()).unwrap();
        assert!(files.iter().any(|p| p.ends_with("a.ts")));
    }

    #[test]
    fn empty_whitelist_excludes_everything() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const A = 1");
        write(dir.path(), ".indexer/to-index", "");
        reset_config_cache(dir.path());
        let files = select_files(dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn whitelist_dir_directive_scopes_selection() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const A = 1");
        write(dir.path(), "docs/readme.md", "hi");
        write(dir.path(), ".indexer/to-index", "dir: src\n");
        reset_config_cache(dir.path());
        let files = select_files(dir.path()).unwrap();
        assert!(files.iter().any(|p| p.ends_with("a.ts")));
        assert!(!files.iter().any(|p| p.ends_with("readme.md")));
    }

    #[test]
    fn whitelist_ext_directive_filters_by_extension() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const A = 1");
        write(dir.path(), "src/b.py", "x = 1");
        write(dir.path(), ".indexer/to-index", "ext: .ts\n");
        reset_config_cache(dir.path());
        let files = select_files(dir.path()).unwrap();
        assert!(files.iter().any(|p| p.ends_with("a.ts")));
        assert!(!files.iter().any(|p| p.ends_with("b.py")));
    }

    #[test]
    fn lock_files_are_always_excluded() {
        let dir = tempdir().unwrap();
        write(dir.path(), "Cargo.lock", "lockdata");
        write(dir.path(), "src/a.rs", "fn main() {}");
        reset_config_cache(dir.path());
        let files = select_files(dir.path()).unwrap();
        assert!(!files.iter().any(|p| p.ends_with("Cargo.lock")));
    }

    #[test]
    fn gitignored_files_are_excluded() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".gitignore", "ignored_dir/\n");
        write(dir.path(), "ignored_dir/secret.rs", "fn x() {}");
        write(dir.path(), "src/a.rs", "fn main() {}");
        reset_config_cache(dir.path());
        let files = select_files(dir.path()).unwrap();
        assert!(!files.iter().any(|p| p.to_string_lossy().contains("ignored_dir")));
        assert!(files.iter().any(|p| p.ends_with("a.rs")));
    }
}
