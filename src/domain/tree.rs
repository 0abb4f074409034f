//! Tree aggregation: count leaves whose name matches a predicate
//!
//! Containers (directories) are split into their children; non-containers
//! are leaves contributing 1 when their name matches and 0 otherwise. An
//! empty container contributes 0.

use crate::error::{EngineError, Result};
use crate::parallel::{Aggregation, Outcome, Scheduler};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::borrow::Cow;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Something that can list the children of a node
///
/// Implementations must be deterministic and side-effect free for the
/// duration of one run.
pub trait TreeSource: Send + Sync + 'static {
    type Node: Send + Sync + Debug + 'static;

    /// Children of a container, in any order
    fn children(&self, node: &Self::Node) -> Result<Vec<Self::Node>>;

    fn is_container(&self, node: &Self::Node) -> bool;

    /// Name the match predicate is applied to
    fn name<'a>(&'a self, node: &'a Self::Node) -> Cow<'a, str>;

    /// Reject an unusable root (missing, not a container, ...)
    fn validate_root(&self, root: &Self::Node) -> Result<()> {
        if self.is_container(root) {
            Ok(())
        } else {
            Err(EngineError::InvalidInput(format!("{root:?} is not a container")))
        }
    }
}

/// Predicate applied to leaf names
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Name ends with the given text, e.g. `.pdf`
    Suffix(String),
    /// Name matches any of a set of glob patterns, e.g. `*.{pdf,PDF}`
    Glob(GlobSet),
}

impl Matcher {
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Matcher::Suffix(suffix.into())
    }

    pub fn glob<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern.as_ref()).map_err(|e| {
                EngineError::InvalidInput(format!("invalid glob '{}': {}", pattern.as_ref(), e))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| EngineError::InvalidInput(format!("invalid glob set: {e}")))?;
        Ok(Matcher::Glob(set))
    }

    pub fn is_match(&self, name: &str) -> bool {
        match self {
            Matcher::Suffix(suffix) => name.ends_with(suffix.as_str()),
            Matcher::Glob(set) => set.is_match(name),
        }
    }
}

/// [`Aggregation`] counting matching leaves of a [`TreeSource`]
pub struct TreeCount<S: TreeSource> {
    source: S,
    matcher: Matcher,
}

impl<S: TreeSource> TreeCount<S> {
    pub fn new(source: S, matcher: Matcher) -> Self {
        Self { source, matcher }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: TreeSource> Aggregation for TreeCount<S> {
    type Item = S::Node;
    type Output = u64;

    fn split(&self, node: &S::Node) -> Result<Vec<S::Node>> {
        if self.source.is_container(node) {
            self.source.children(node)
        } else {
            Ok(Vec::new())
        }
    }

    fn evaluate(&self, node: &S::Node) -> Result<u64> {
        if self.source.is_container(node) {
            return Ok(0);
        }
        Ok(u64::from(self.matcher.is_match(&self.source.name(node))))
    }

    fn combine(&self, a: u64, b: u64) -> u64 {
        a + b
    }

    fn is_leaf(&self, node: &S::Node) -> bool {
        !self.source.is_container(node)
    }

    fn validate_root(&self, root: &S::Node) -> Result<()> {
        self.source.validate_root(root)
    }
}

/// Count the leaves under `root` whose name satisfies `matcher`
pub fn count_matching<Sch, S>(
    scheduler: &Sch,
    source: S,
    root: S::Node,
    matcher: Matcher,
) -> Result<Outcome<u64>>
where
    Sch: Scheduler,
    S: TreeSource,
{
    scheduler.run(Arc::new(TreeCount::new(source, matcher)), root)
}

/// An entry on disk
#[derive(Clone, PartialEq, Eq)]
pub struct FsNode {
    path: PathBuf,
    is_dir: bool,
    /// Canonical paths of the directories from the root down to this one,
    /// only tracked while following links
    ancestors: Arc<Vec<PathBuf>>,
}

impl FsNode {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }
}

impl Debug for FsNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Filesystem-backed [`TreeSource`]
///
/// Symbolic links are leaves unless `follow_symlinks` is set. A followed link
/// that resolves to one of its own ancestor directories is a leaf as well, so
/// link cycles terminate. Other links to directories are descended even when
/// that reaches the same directory twice.
#[derive(Debug, Clone, Default)]
pub struct FsTree {
    follow_symlinks: bool,
}

impl FsTree {
    pub fn new(follow_symlinks: bool) -> Self {
        Self { follow_symlinks }
    }

    /// Resolve the root node; it must exist and be a directory
    pub fn root(&self, path: impl AsRef<Path>) -> Result<FsNode> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|e| {
            EngineError::InvalidInput(format!("Invalid directory path {}: {}", path.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(EngineError::InvalidInput(format!(
                "Invalid directory path {}: not a directory",
                path.display()
            )));
        }
        let ancestors = if self.follow_symlinks {
            vec![fs::canonicalize(path).map_err(|e| {
                EngineError::InvalidInput(format!("Invalid directory path {}: {}", path.display(), e))
            })?]
        } else {
            Vec::new()
        };

        Ok(FsNode {
            path: path.to_path_buf(),
            is_dir: true,
            ancestors: Arc::new(ancestors),
        })
    }

    fn child_node(&self, parent: &FsNode, entry: &fs::DirEntry) -> std::io::Result<FsNode> {
        let path = entry.path();
        let file_type = entry.file_type()?;
        let leaf = |path: PathBuf| FsNode {
            path,
            is_dir: false,
            ancestors: Arc::default(),
        };

        if !self.follow_symlinks {
            // Links are leaves whatever they point to
            return Ok(FsNode {
                is_dir: file_type.is_dir(),
                path,
                ancestors: Arc::default(),
            });
        }

        let canonical = if file_type.is_symlink() {
            // A dangling link is simply a leaf
            if !fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false) {
                return Ok(leaf(path));
            }
            fs::canonicalize(&path)?
        } else if file_type.is_dir() {
            match parent.ancestors.last() {
                Some(dir) => dir.join(entry.file_name()),
                None => fs::canonicalize(&path)?,
            }
        } else {
            return Ok(leaf(path));
        };

        if parent.ancestors.contains(&canonical) {
            tracing::debug!("Not following {}: link back to an ancestor", path.display());
            return Ok(leaf(path));
        }

        let mut ancestors = Vec::with_capacity(parent.ancestors.len() + 1);
        ancestors.extend(parent.ancestors.iter().cloned());
        ancestors.push(canonical);
        Ok(FsNode {
            path,
            is_dir: true,
            ancestors: Arc::new(ancestors),
        })
    }
}

impl TreeSource for FsTree {
    type Node = FsNode;

    fn children(&self, node: &FsNode) -> Result<Vec<FsNode>> {
        let read_dir = fs::read_dir(&node.path).map_err(|e| EngineError::evaluation(node, e))?;

        let mut children = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| EngineError::evaluation(node, e))?;
            let child = self
                .child_node(node, &entry)
                .map_err(|e| EngineError::evaluation(node, e))?;
            children.push(child);
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    fn is_container(&self, node: &FsNode) -> bool {
        node.is_dir
    }

    fn name<'a>(&'a self, node: &'a FsNode) -> Cow<'a, str> {
        node.path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or(Cow::Borrowed(""))
    }
}

/// Index of a node inside a [`MemoryTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct MemoryNode {
    name: String,
    container: bool,
    children: Vec<NodeId>,
}

/// In-memory [`TreeSource`] built from code
///
/// ```rust
/// use splitfold::domain::tree::MemoryTree;
///
/// let tree = MemoryTree::from_paths("root", &["a.txt", "b.pdf", "sub/c.pdf", "empty/"]);
/// assert_eq!(tree.len(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryTree {
    nodes: Vec<MemoryNode>,
}

impl MemoryTree {
    /// A tree holding only an empty root container
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![MemoryNode {
                name: root_name.into(),
                container: true,
                children: Vec::new(),
            }],
        }
    }

    /// Build a tree from slash-separated relative paths
    ///
    /// Intermediate segments become containers; a trailing `/` makes the
    /// last segment an (empty) container too.
    pub fn from_paths<P: AsRef<str>>(root_name: impl Into<String>, paths: &[P]) -> Self {
        let mut tree = Self::new(root_name);
        for path in paths {
            let path = path.as_ref();
            let is_dir = path.ends_with('/');
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

            let mut parent = tree.root();
            for (index, segment) in segments.iter().enumerate() {
                let last = index + 1 == segments.len();
                parent = match tree.child_named(parent, segment) {
                    Some(existing) => existing,
                    None if last && !is_dir => tree.add_leaf(parent, *segment),
                    None => tree.add_container(parent, *segment),
                };
            }
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_container(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        self.push(parent, name.into(), true)
    }

    pub fn add_leaf(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        self.push(parent, name.into(), false)
    }

    /// Look a node up by its slash-separated path below the root
    pub fn find(&self, path: &str) -> Option<NodeId> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self.root(), |node, segment| self.child_named(node, segment))
    }

    pub fn name_of(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|child| self.nodes[child.0].name == name)
    }

    fn push(&mut self, parent: NodeId, name: String, container: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(MemoryNode {
            name,
            container,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }
}

impl TreeSource for MemoryTree {
    type Node = NodeId;

    fn children(&self, node: &NodeId) -> Result<Vec<NodeId>> {
        self.nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .ok_or_else(|| EngineError::evaluation(node, "unknown node"))
    }

    fn is_container(&self, node: &NodeId) -> bool {
        self.nodes.get(node.0).is_some_and(|n| n.container)
    }

    fn name<'a>(&'a self, node: &'a NodeId) -> Cow<'a, str> {
        self.nodes
            .get(node.0)
            .map(|n| Cow::Borrowed(n.name.as_str()))
            .unwrap_or(Cow::Borrowed(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{BatchDispatchScheduler, ForkJoinScheduler, batch::DEFAULT_TASK_TIMEOUT};
    use tempfile::TempDir;

    #[test]
    fn test_suffix_matcher() {
        let matcher = Matcher::suffix(".pdf");
        assert!(matcher.is_match("report.pdf"));
        assert!(!matcher.is_match("report.pdf.txt"));
        assert!(!matcher.is_match("report.PDF"));
    }

    #[test]
    fn test_glob_matcher() {
        let matcher = Matcher::glob(&["*.pdf", "*.PDF"]).unwrap();
        assert!(matcher.is_match("a.pdf"));
        assert!(matcher.is_match("B.PDF"));
        assert!(!matcher.is_match("c.txt"));

        assert!(matches!(
            Matcher::glob(&["a[b"]),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_memory_tree_paths() {
        let tree = MemoryTree::from_paths("root", &["a.txt", "sub/c.pdf", "sub/d.pdf", "empty/"]);
        let sub = tree.find("sub").unwrap();
        let empty = tree.find("empty").unwrap();

        assert!(tree.is_container(&sub));
        assert!(tree.is_container(&empty));
        assert!(!tree.is_container(&tree.find("a.txt").unwrap()));
        assert_eq!(tree.children(&sub).unwrap().len(), 2);
        assert!(tree.children(&empty).unwrap().is_empty());
        assert_eq!(tree.name_of(sub), "sub");
        assert_eq!(tree.find("missing/x"), None);
    }

    #[test]
    fn test_tree_count_evaluation() {
        let tree = MemoryTree::from_paths("root", &["x.pdf/", "y.pdf"]);
        let dir = tree.find("x.pdf").unwrap();
        let file = tree.find("y.pdf").unwrap();
        let count = TreeCount::new(tree, Matcher::suffix(".pdf"));

        // Containers never count, even with a matching name
        assert_eq!(count.evaluate(&dir).unwrap(), 0);
        assert_eq!(count.evaluate(&file).unwrap(), 1);
        assert!(count.is_leaf(&file));
        assert!(!count.is_leaf(&dir));
        assert!(count.split(&file).unwrap().is_empty());
    }

    #[test]
    fn test_leaf_root_rejected() {
        let tree = MemoryTree::from_paths("root", &["a.pdf"]);
        let leaf = tree.find("a.pdf").unwrap();
        let scheduler = ForkJoinScheduler::new(1).unwrap();
        let err = count_matching(&scheduler, tree, leaf, Matcher::suffix(".pdf")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_fs_tree_counts_both_ways() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.pdf"), "b").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.pdf"), "c").unwrap();

        let source = FsTree::default();
        let fork_join = ForkJoinScheduler::new(2).unwrap();
        let batch = BatchDispatchScheduler::new(2, DEFAULT_TASK_TIMEOUT).unwrap();

        let root = source.root(dir.path()).unwrap();
        let a = count_matching(&fork_join, source.clone(), root.clone(), Matcher::suffix(".pdf")).unwrap();
        let b = count_matching(&batch, source, root, Matcher::suffix(".pdf")).unwrap();
        assert_eq!(a.value, 2);
        assert_eq!(b.value, 2);
    }

    #[test]
    fn test_fs_root_must_be_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let source = FsTree::default();
        assert!(matches!(source.root(&file), Err(EngineError::InvalidInput(_))));
        assert!(matches!(
            source.root(dir.path().join("missing")),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_leaves_by_default() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real").join("x.pdf"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let scheduler = ForkJoinScheduler::new(2).unwrap();

        let plain = FsTree::new(false);
        let root = plain.root(dir.path()).unwrap();
        let outcome = count_matching(&scheduler, plain, root, Matcher::suffix(".pdf")).unwrap();
        assert_eq!(outcome.value, 1);

        let following = FsTree::new(true);
        let root = following.root(dir.path()).unwrap();
        let outcome = count_matching(&scheduler, following, root, Matcher::suffix(".pdf")).unwrap();
        assert_eq!(outcome.value, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_link_cycle_terminates_when_following() {
        let dir = TempDir::new().unwrap();
        let inner = dir.path().join("a").join("b");
        fs::create_dir_all(&inner).unwrap();
        fs::write(dir.path().join("a").join("x.pdf"), "x").unwrap();
        fs::write(inner.join("y.pdf"), "y").unwrap();
        // b/up -> a and b/top -> the root both lead back to an ancestor
        std::os::unix::fs::symlink("..", inner.join("up")).unwrap();
        std::os::unix::fs::symlink(dir.path(), inner.join("top")).unwrap();

        let following = FsTree::new(true);
        let fork_join = ForkJoinScheduler::new(2).unwrap();
        let batch = BatchDispatchScheduler::new(2, DEFAULT_TASK_TIMEOUT).unwrap();

        let root = following.root(dir.path()).unwrap();
        let a = count_matching(&fork_join, following.clone(), root.clone(), Matcher::suffix(".pdf"))
            .unwrap();
        let b = count_matching(&batch, following, root, Matcher::suffix(".pdf")).unwrap();
        assert_eq!(a.value, 2);
        assert_eq!(b.value, 2);
        assert!(b.is_complete());
    }
}
