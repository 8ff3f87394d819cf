//! Slash-separated path algebra for database locations. The root is `""`.

/// Collapses empty and `.` segments and resolves `..` against the preceding
/// segment. `..` at the root stays at the root.
pub(crate) fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

pub(crate) fn join(base: &str, child: &str) -> String {
    normalize(&format!("{}/{}", base, child))
}

pub(crate) fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(head, _)| head))
}

pub(crate) fn key(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    path.rsplit('/').next()
}
