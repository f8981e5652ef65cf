//! Static access-discipline check.
//!
//! The monolith provider and the CLI factory that constructs it are the
//! only source files permitted to reference the question monolith. This
//! test walks the source tree and counts violations; the expected count
//! is zero.

use std::path::{Path, PathBuf};

/// Files allowed to load or construct the monolith provider.
const ALLOWED: [&str; 3] = [
    "src/signal/monolith.rs",
    "src/signal/registry.rs",
    "src/cli/commands.rs",
];

/// Call patterns that constitute reading the monolith.
const FORBIDDEN_PATTERNS: [&str; 2] = ["MonolithProvider::load", "MonolithProvider::from_monolith"];

fn source_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            source_files(&path, out);
        } else if path.extension().is_some_and(|e| e == "rs") {
            out.push(path);
        }
    }
}

/// Strips `#[cfg(test)]` modules: in-file tests may build inline
/// monoliths freely, the discipline governs production code.
fn production_code(content: &str) -> String {
    match content.find("#[cfg(test)]") {
        Some(index) => content[..index].to_string(),
        None => content.to_string(),
    }
}

#[test]
fn no_monolith_access_outside_signal_loader_and_factory() {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    source_files(&root.join("src"), &mut files);
    assert!(!files.is_empty(), "no source files found");

    let mut violations = Vec::new();
    for file in &files {
        let relative = file
            .strip_prefix(&root)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");
        if ALLOWED.contains(&relative.as_str()) {
            continue;
        }
        let content = std::fs::read_to_string(file).unwrap_or_default();
        let production = production_code(&content);
        for pattern in FORBIDDEN_PATTERNS {
            if production.contains(pattern) {
                violations.push(format!("{relative}: {pattern}"));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "monolith access outside the signal loader/factory: {violations:?}"
    );
}

#[test]
fn monolith_file_reads_only_in_provider() {
    // The raw-file read itself must live in the provider alone.
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    source_files(&root.join("src"), &mut files);

    let mut readers = Vec::new();
    for file in &files {
        let relative = file
            .strip_prefix(&root)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");
        let content = std::fs::read_to_string(file).unwrap_or_default();
        let production = production_code(&content);
        if production.contains("MonolithUnreadable") && production.contains("read_to_string") {
            readers.push(relative);
        }
    }
    assert_eq!(readers, vec!["src/signal/monolith.rs".to_string()]);
}
