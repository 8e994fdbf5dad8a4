//! Root-relative resource paths.
//!
//! Files are written `/dir/file`, directories `/dir/`, the root `/`.

/// Normalize a user supplied path against the root. Resolves `.` and `..`,
/// collapses repeated separators and returns the components. `None` when the
/// path climbs above the root.
pub fn components(path: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts)
}

/// Join components into a file path (`/a/b`).
pub fn file_path(parts: &[&str]) -> String {
    format!("/{}", parts.join("/"))
}

/// Join components into a directory path (`/a/b/`, or `/` for none).
pub fn dir_path(parts: &[&str]) -> String {
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", parts.join("/"))
    }
}

/// Path of a child entry of directory `dir`.
pub fn child_path(dir: &str, name: &str, is_dir: bool) -> String {
    let base = if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    };
    if is_dir {
        format!("{base}{name}/")
    } else {
        format!("{base}{name}")
    }
}

/// Make a diff path root-relative: strip the working-copy root if the tool
/// printed an absolute path and ensure a single leading `/`.
pub fn relativize(path: &str, root: &str) -> String {
    let root = root.trim_end_matches('/');
    let rest = if root.is_empty() {
        path
    } else {
        path.strip_prefix(root)
            .filter(|r| r.is_empty() || r.starts_with('/'))
            .unwrap_or(path)
    };
    if rest == "/dev/null" {
        return rest.to_string();
    }
    let rest = rest.trim_start_matches("./").trim_start_matches('/');
    format!("/{rest}")
}
