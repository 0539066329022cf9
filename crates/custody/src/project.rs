//! Project registry: which project owns a discovered file
//!
//! Projects are sub-trees of the sync root. A file belongs to the project
//! with the longest root that contains it; nested projects therefore win
//! over their parents.

use crate::filter::allows_extension;
use custody_db::{CustodyDb, ProjectRecord};
use std::path::{Component, Path, PathBuf};

/// A project resolved against the sync root.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectScope {
    pub record: ProjectRecord,
    /// Absolute-or-sync-root-joined, lexically normalized root
    pub root: PathBuf,
    /// Normalized project path as declared, used in metadata
    pub normalized_path: String,
}

impl ProjectScope {
    pub fn new(sync_root: &Path, record: ProjectRecord) -> Self {
        let declared = Path::new(&record.project_path);
        let root = if declared.is_absolute() {
            normalize_path(declared)
        } else {
            normalize_path(&sync_root.join(declared))
        };
        let normalized_path = path_string(&normalize_path(declared));
        Self {
            record,
            root,
            normalized_path,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.project_id
    }

    /// Does the project's own extension allow-list admit this file?
    pub fn allows(&self, path: &Path) -> bool {
        match &self.record.file_extensions {
            Some(allowed) => allows_extension(allowed, path),
            None => true,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        normalize_path(path).starts_with(&self.root)
    }
}

/// All projects known for one sync root.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    sync_root: PathBuf,
    /// Deepest root first
    scopes: Vec<ProjectScope>,
}

impl ProjectRegistry {
    pub fn new(sync_root: impl AsRef<Path>, records: Vec<ProjectRecord>) -> Self {
        let sync_root = normalize_path(sync_root.as_ref());
        let mut scopes: Vec<ProjectScope> = records
            .into_iter()
            .map(|record| ProjectScope::new(&sync_root, record))
            .collect();
        scopes.sort_by(|a, b| {
            b.root
                .components()
                .count()
                .cmp(&a.root.components().count())
                .then_with(|| a.record.project_id.cmp(&b.record.project_id))
        });
        Self { sync_root, scopes }
    }

    /// Build the registry from the projects table.
    pub async fn load(db: &CustodyDb, sync_root: impl AsRef<Path>) -> custody_db::Result<Self> {
        let records = db.list_projects().await?;
        Ok(Self::new(sync_root, records))
    }

    pub fn sync_root(&self) -> &Path {
        &self.sync_root
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn scopes(&self) -> &[ProjectScope] {
        &self.scopes
    }

    /// The project owning `path`, by longest matching root.
    pub fn resolve(&self, path: &Path) -> Option<&ProjectScope> {
        self.scopes.iter().find(|scope| scope.contains(path))
    }

    /// Directory trees to scan: every project root, or the whole sync root
    /// when no project is configured.
    pub fn scan_roots(&self) -> Vec<PathBuf> {
        if self.scopes.is_empty() {
            return vec![self.sync_root.clone()];
        }
        // Shallowest first so a parent's walk precedes its nested projects
        let mut roots: Vec<PathBuf> = self.scopes.iter().map(|s| s.root.clone()).collect();
        roots.reverse();
        roots.dedup();
        roots
    }
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Forward-slash string form of a path.
pub fn path_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replacen("//", "/", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_db::Author;

    fn record(id: &str, path: &str, exts: Option<&[&str]>) -> ProjectRecord {
        ProjectRecord {
            project_id: id.to_string(),
            project_path: path.to_string(),
            author: Author::default(),
            file_extensions: exts.map(|e| e.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/data/./a/../b/")), PathBuf::from("/data/b"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_path_string() {
        assert_eq!(path_string(Path::new("/data/a/b")), "/data/a/b");
        assert_eq!(path_string(Path::new("a/b")), "a/b");
    }

    #[test]
    fn test_longest_root_wins() {
        let registry = ProjectRegistry::new(
            "/data",
            vec![
                record("outer", "field", None),
                record("inner", "field/2024/", None),
            ],
        );

        let inner = registry.resolve(Path::new("/data/field/2024/a.jpg")).unwrap();
        assert_eq!(inner.id(), "inner");
        assert_eq!(inner.normalized_path, "field/2024");

        let outer = registry.resolve(Path::new("/data/field/2023/a.jpg")).unwrap();
        assert_eq!(outer.id(), "outer");

        // Component-wise prefix, not string prefix
        assert!(registry.resolve(Path::new("/data/fieldwork/a.jpg")).is_none());
    }

    #[test]
    fn test_absolute_project_path() {
        let registry = ProjectRegistry::new("/data", vec![record("abs", "/mnt/cards", None)]);
        assert_eq!(registry.scopes()[0].root, PathBuf::from("/mnt/cards"));
        assert!(registry.resolve(Path::new("/mnt/cards/x.jpg")).is_some());
    }

    #[test]
    fn test_scan_roots() {
        let empty = ProjectRegistry::new("/data/", vec![]);
        assert_eq!(empty.scan_roots(), vec![PathBuf::from("/data")]);

        let registry = ProjectRegistry::new(
            "/data",
            vec![record("inner", "a/b", None), record("outer", "a", None)],
        );
        assert_eq!(
            registry.scan_roots(),
            vec![PathBuf::from("/data/a"), PathBuf::from("/data/a/b")]
        );
    }

    #[test]
    fn test_extension_override() {
        let scope = ProjectScope::new(Path::new("/data"), record("p", "p", Some(&[".jpg"])));
        assert!(scope.allows(Path::new("/data/p/x.JPG")));
        assert!(!scope.allows(Path::new("/data/p/x.txt")));

        let open = ProjectScope::new(Path::new("/data"), record("q", "q", None));
        assert!(open.allows(Path::new("/data/q/x.txt")));
    }

    #[test]
    fn test_contains_is_component_wise() {
        let scope = ProjectScope::new(Path::new("/data"), record("p", "field", None));
        assert!(scope.contains(Path::new("/data/field/a.jpg")));
        assert!(scope.contains(Path::new("/data/other/../field/a.jpg")));
        assert!(!scope.contains(Path::new("/data/fieldwork/a.jpg")));
        assert!(!scope.contains(Path::new("/data/a.jpg")));
    }
}
