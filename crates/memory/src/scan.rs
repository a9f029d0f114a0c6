//! One-time startup scan of well-known project files.
//!
//! Seeds the project store with tech-stack, command and convention facts.
//! Only new or changed facts are written, so dates of unchanged facts keep
//! aging toward eviction.

use keel_core::{Category, KnowledgeFact};
use std::path::Path;
use tracing::{debug, info};

use crate::auto_memory::KnowledgeStore;

/// Scan `root` and record what was found in `store`.
/// Returns the number of facts written.
pub async fn scan_project(root: &Path, store: &KnowledgeStore) -> usize {
    let mut found: Vec<(Category, &'static str, String)> = Vec::new();
    scan_rust(root, &mut found);
    scan_node(root, &mut found);
    scan_typescript(root, &mut found);
    scan_python(root, &mut found);
    scan_go(root, &mut found);

    let mut latest: Vec<(Category, &'static str, String)> = Vec::new();
    for item in found {
        match latest.iter_mut().find(|(c, k, _)| *c == item.0 && *k == item.1) {
            Some(slot) => *slot = item,
            None => latest.push(item),
        }
    }

    let mut written = 0;
    for (category, key, fact) in latest {
        let unchanged = store
            .find(key, Some(category))
            .await
            .is_some_and(|existing| existing.fact == fact);
        if unchanged {
            continue;
        }
        store.add(KnowledgeFact::new(category, key, fact)).await;
        written += 1;
    }

    if written > 0 {
        info!(root = %root.display(), written, "Project scan recorded new facts");
    } else {
        debug!(root = %root.display(), "Project scan found nothing new");
    }
    written
}

fn read_toml(path: &Path) -> Option<toml::Table> {
    let raw = std::fs::read_to_string(path).ok()?;
    raw.parse::<toml::Table>().ok()
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn scan_rust(root: &Path, found: &mut Vec<(Category, &'static str, String)>) {
    let Some(manifest) = read_toml(&root.join("Cargo.toml")) else {
        return;
    };

    let package = manifest.get("package").and_then(|p| p.as_table());
    let workspace = manifest.get("workspace").and_then(|w| w.as_table());

    let edition = package
        .and_then(|p| p.get("edition"))
        .and_then(|e| e.as_str())
        .or_else(|| {
            workspace
                .and_then(|w| w.get("package"))
                .and_then(|p| p.get("edition"))
                .and_then(|e| e.as_str())
        });
    found.push((
        Category::TechStack,
        "language",
        match edition {
            Some(edition) => format!("Rust (edition {edition})"),
            None => "Rust".into(),
        },
    ));

    if let Some(name) = package.and_then(|p| p.get("name")).and_then(|n| n.as_str()) {
        found.push((Category::TechStack, "crate-name", name.to_string()));
    }
    if let Some(members) = workspace
        .and_then(|w| w.get("members"))
        .and_then(|m| m.as_array())
    {
        found.push((
            Category::TechStack,
            "workspace",
            format!("Cargo workspace with {} members", members.len()),
        ));
    }

    found.push((Category::TechStack, "package-manager", "cargo".into()));
    found.push((Category::Commands, "build-command", "cargo build".into()));
    found.push((Category::Commands, "test-command", "cargo test".into()));
    found.push((Category::Commands, "lint-command", "cargo clippy".into()));
}

fn scan_node(root: &Path, found: &mut Vec<(Category, &'static str, String)>) {
    let manager = [
        ("pnpm-lock.yaml", "pnpm"),
        ("yarn.lock", "yarn"),
        ("package-lock.json", "npm"),
    ]
    .into_iter()
    .find(|(lockfile, _)| root.join(lockfile).exists())
    .map(|(_, manager)| manager);
    if let Some(manager) = manager {
        found.push((Category::TechStack, "package-manager", manager.into()));
    }

    let Some(pkg) = read_json(&root.join("package.json")) else {
        return;
    };

    for (script, key) in [
        ("test", "test-command"),
        ("build", "build-command"),
        ("lint", "lint-command"),
    ] {
        if let Some(command) = pkg["scripts"][script].as_str() {
            found.push((Category::Commands, key, command.to_string()));
        }
    }

    let dep_version = |name: &str| {
        pkg["devDependencies"][name]
            .as_str()
            .or_else(|| pkg["dependencies"][name].as_str())
            .map(str::to_string)
    };
    if let Some(v) = dep_version("react") {
        found.push((Category::TechStack, "ui-framework", format!("React {v}")));
    }
    if dep_version("vitest").is_some() {
        found.push((Category::TechStack, "test-framework", "Vitest".into()));
    }
    if let Some(v) = dep_version("typescript") {
        found.push((Category::TechStack, "language", format!("TypeScript {v}")));
    }
    if let Some(v) = dep_version("ink") {
        found.push((Category::TechStack, "tui-framework", format!("Ink {v}")));
    }
}

fn scan_typescript(root: &Path, found: &mut Vec<(Category, &'static str, String)>) {
    let Some(tsconfig) = read_json(&root.join("tsconfig.json")) else {
        return;
    };
    let options = &tsconfig["compilerOptions"];
    if options["strict"].as_bool() == Some(true) {
        found.push((Category::Conventions, "ts-strict-mode", "enabled".into()));
    }
    if options["module"]
        .as_str()
        .is_some_and(|m| m.to_lowercase().contains("nodenext"))
    {
        found.push((Category::Conventions, "module-system", "ESM (NodeNext)".into()));
    }
}

fn scan_python(root: &Path, found: &mut Vec<(Category, &'static str, String)>) {
    let Some(pyproject) = read_toml(&root.join("pyproject.toml")) else {
        return;
    };
    let requires = pyproject
        .get("project")
        .and_then(|p| p.get("requires-python"))
        .and_then(|r| r.as_str());
    found.push((
        Category::TechStack,
        "language",
        match requires {
            Some(r) => format!("Python {r}"),
            None => "Python".into(),
        },
    ));

    let tool = pyproject.get("tool").and_then(|t| t.as_table());
    if tool.is_some_and(|t| t.contains_key("pytest")) {
        found.push((Category::Commands, "test-command", "pytest".into()));
    }
    if tool.is_some_and(|t| t.contains_key("ruff")) {
        found.push((Category::Commands, "lint-command", "ruff check .".into()));
    }
}

fn scan_go(root: &Path, found: &mut Vec<(Category, &'static str, String)>) {
    let Ok(gomod) = std::fs::read_to_string(root.join("go.mod")) else {
        return;
    };
    let version = gomod
        .lines()
        .find_map(|line| line.strip_prefix("go "))
        .map(str::trim);
    found.push((
        Category::TechStack,
        "language",
        match version {
            Some(v) => format!("Go {v}"),
            None => "Go".into(),
        },
    ));
    if let Some(module) = gomod.lines().find_map(|line| line.strip_prefix("module ")) {
        found.push((Category::TechStack, "module", module.trim().to_string()));
    }
    found.push((Category::Commands, "build-command", "go build ./...".into()));
    found.push((Category::Commands, "test-command", "go test ./...".into()));
}
