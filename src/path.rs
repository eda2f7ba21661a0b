//! Path normalization against a process cwd and the build-tree root

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.`, fold `..`, squash separators.
///
/// `..` above the root of an absolute path stays at the root. Leading `..`
/// of a relative path are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Join `path` onto `cwd` (unless absolute) and normalize
pub fn join_normalized(cwd: &Path, path: &str) -> PathBuf {
    normalize(&cwd.join(path))
}

/// Result of resolving a traced path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Build-tree-relative path
    InTree(String),
    OutOfTree,
}

/// Resolves traced paths into build-tree-relative form
#[derive(Debug, Clone)]
pub struct PathResolver {
    build_root: PathBuf,
}

impl PathResolver {
    /// `build_root` must be absolute; it is normalized here
    pub fn new(build_root: &Path) -> Self {
        Self {
            build_root: normalize(build_root),
        }
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// Resolve `raw` relative to `base` (the cwd or a directory fd)
    pub fn resolve(&self, base: &Path, raw: &str) -> Resolved {
        let absolute = join_normalized(base, raw);
        self.relativize(&absolute)
    }

    /// Strip the build root from an already normalized path
    pub fn relativize(&self, path: &Path) -> Resolved {
        match path.strip_prefix(&self.build_root) {
            Ok(rel) if rel.as_os_str().is_empty() => Resolved::OutOfTree,
            Ok(rel) => Resolved::InTree(rel.to_string_lossy().into_owned()),
            Err(_) if path.is_relative() && !path.starts_with("..") && path != Path::new(".") => {
                // Only reachable when the cwd itself was relative
                Resolved::InTree(path.to_string_lossy().into_owned())
            }
            Err(_) => Resolved::OutOfTree,
        }
    }
}

/// Base directory named by the dirfd argument of an `*at` syscall
///
/// `AT_FDCWD` means the process cwd; strace `-y` annotates descriptors as
/// `3</abs/dir>`. Any other descriptor is unknown.
pub fn dirfd_base<'a>(token: &'a str, cwd: &'a Path) -> Option<&'a Path> {
    let token = token.trim();
    // `-y` annotates AT_FDCWD with the cwd it stands for
    if token == "AT_FDCWD" || token.starts_with("AT_FDCWD<") {
        return Some(cwd);
    }
    let open = token.find('<')?;
    let inner = token[open + 1..].strip_suffix('>')?;
    if token[..open].chars().all(|c| c.is_ascii_digit()) && inner.starts_with('/') {
        Some(Path::new(inner))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/a//b///c/")), PathBuf::from("/a/b/c"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize(Path::new("../x/../y")), PathBuf::from("../y"));
        assert_eq!(normalize(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn test_join_relative_and_absolute() {
        let cwd = Path::new("/src/build");
        assert_eq!(join_normalized(cwd, "../a.c"), PathBuf::from("/src/a.c"));
        assert_eq!(join_normalized(cwd, "/usr/include/stdio.h"), PathBuf::from("/usr/include/stdio.h"));
    }

    #[test]
    fn test_resolve_inside_build_tree() {
        let resolver = PathResolver::new(Path::new("/src"));
        assert_eq!(
            resolver.resolve(Path::new("/src/build"), "obj/a.o"),
            Resolved::InTree("build/obj/a.o".to_string())
        );
        assert_eq!(
            resolver.resolve(Path::new("/src/build"), "../lib/./x.h"),
            Resolved::InTree("lib/x.h".to_string())
        );
    }

    #[test]
    fn test_resolve_outside_build_tree() {
        let resolver = PathResolver::new(Path::new("/src"));
        assert_eq!(
            resolver.resolve(Path::new("/src"), "/usr/include/stdio.h"),
            Resolved::OutOfTree
        );
        assert_eq!(resolver.resolve(Path::new("/src"), "../etc/passwd"), Resolved::OutOfTree);
    }

    #[test]
    fn test_prefix_match_is_per_component() {
        let resolver = PathResolver::new(Path::new("/src"));
        assert_eq!(resolver.resolve(Path::new("/"), "/src2/a.c"), Resolved::OutOfTree);
    }

    #[test]
    fn test_build_root_itself_is_out_of_scope() {
        let resolver = PathResolver::new(Path::new("/src/"));
        assert_eq!(resolver.resolve(Path::new("/src/build"), ".."), Resolved::OutOfTree);
    }

    #[test]
    fn test_dirfd_base() {
        let cwd = Path::new("/src");
        assert_eq!(dirfd_base("AT_FDCWD", cwd), Some(cwd));
        assert_eq!(dirfd_base("AT_FDCWD</src>", cwd), Some(cwd));
        assert_eq!(dirfd_base("3</src/build>", cwd), Some(Path::new("/src/build")));
        assert_eq!(dirfd_base("3", cwd), None);
        assert_eq!(dirfd_base("x</a>", cwd), None);
    }
}
