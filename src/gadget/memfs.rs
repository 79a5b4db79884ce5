//! In-memory emulation of the usb_gadget ConfigFS tree
//!
//! Mirrors the kernel rules the gadget code depends on:
//! - `mkdir` needs an existing parent and fails on an existing path
//! - creating a gadget, config or UVC function item auto-creates its default
//!   groups, which cannot be removed on their own
//! - `rmdir` removes attributes and default groups with the item, but fails
//!   while user-created children or links remain inside it
//! - an item that is the target of a link cannot be removed

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::configfs::ConfigFs;

/// A node in the emulated tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Directory; `default_group` marks kernel-created groups
    Dir { default_group: bool },
    Attr(String),
    Link(PathBuf),
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<PathBuf, Node>,
    mutations: u64,
}

/// In-memory ConfigFS rooted at a usb_gadget base directory
#[derive(Debug)]
pub struct MemoryConfigFs {
    base: PathBuf,
    inner: Mutex<Inner>,
}

/// Default groups the kernel creates under a newly made item
fn default_groups(rel: &[String]) -> &'static [&'static str] {
    match rel {
        [_gadget] => &["functions", "configs", "strings", "os_desc"],
        [_, kind, _] if kind == "configs" => &["strings"],
        [_, kind, name] if kind == "functions" && name.starts_with("uvc.") => &[
            "control",
            "control/header",
            "control/class",
            "control/class/fs",
            "control/class/ss",
            "streaming",
            "streaming/header",
            "streaming/uncompressed",
            "streaming/mjpeg",
            "streaming/class",
            "streaming/class/fs",
            "streaming/class/hs",
            "streaming/class/ss",
        ],
        _ => &[],
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

impl MemoryConfigFs {
    /// Create an emulated tree whose usb_gadget directory is `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let mut nodes = BTreeMap::new();
        for ancestor in base.ancestors() {
            nodes.insert(
                ancestor.to_path_buf(),
                Node::Dir {
                    default_group: true,
                },
            );
        }
        Self {
            base,
            inner: Mutex::new(Inner {
                nodes,
                mutations: 0,
            }),
        }
    }

    /// Copy of the whole tree, for before/after comparisons
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Node> {
        self.inner.lock().nodes.clone()
    }

    /// Number of successful mutations so far
    pub fn mutation_count(&self) -> u64 {
        self.inner.lock().mutations
    }

    /// Look up a single node
    pub fn node(&self, path: &Path) -> Option<Node> {
        self.inner.lock().nodes.get(path).cloned()
    }

    /// Simulate an actor outside this process rewriting an attribute
    pub fn external_write(&self, path: &Path, value: &str) {
        self.inner
            .lock()
            .nodes
            .insert(path.to_path_buf(), Node::Attr(value.to_string()));
    }

    fn relative_components(&self, path: &Path) -> Option<Vec<String>> {
        let rel = path.strip_prefix(&self.base).ok()?;
        Some(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect(),
        )
    }
}

impl Inner {
    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes.get(path), Some(Node::Dir { .. }))
    }

    fn require_parent_dir(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if self.is_dir(parent) => Ok(()),
            Some(parent) => Err(not_found(parent)),
            None => Err(not_found(path)),
        }
    }

    fn descendants<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = (&'a PathBuf, &'a Node)> {
        self.nodes
            .range(path.to_path_buf()..)
            .skip(1)
            .take_while(move |(p, _)| p.starts_with(path))
    }
}

impl ConfigFs for MemoryConfigFs {
    fn exists(&self, path: &Path) -> bool {
        self.inner.lock().nodes.contains_key(path)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        if inner.nodes.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }
        inner.require_parent_dir(path)?;

        inner.nodes.insert(
            path.to_path_buf(),
            Node::Dir {
                default_group: false,
            },
        );
        if let Some(rel) = self.relative_components(path) {
            for group in default_groups(&rel) {
                inner.nodes.insert(
                    path.join(group),
                    Node::Dir {
                        default_group: true,
                    },
                );
            }
        }
        inner.mutations += 1;
        Ok(())
    }

    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.require_parent_dir(path)?;
        if let Some(Node::Dir { .. } | Node::Link(_)) = inner.nodes.get(path) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not an attribute", path.display()),
            ));
        }
        inner.nodes.insert(
            path.to_path_buf(),
            Node::Attr(value.trim_end_matches('\n').to_string()),
        );
        inner.mutations += 1;
        Ok(())
    }

    fn read_attr(&self, path: &Path) -> io::Result<String> {
        match self.inner.lock().nodes.get(path) {
            Some(Node::Attr(value)) => Ok(value.trim().to_string()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not an attribute", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        if !inner.is_dir(target) {
            return Err(not_found(target));
        }
        inner.require_parent_dir(link)?;
        if inner.nodes.contains_key(link) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", link.display()),
            ));
        }
        inner
            .nodes
            .insert(link.to_path_buf(), Node::Link(target.to_path_buf()));
        inner.mutations += 1;
        Ok(())
    }

    fn remove_link(&self, link: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        match inner.nodes.get(link) {
            Some(Node::Link(_)) => {
                inner.nodes.remove(link);
                inner.mutations += 1;
                Ok(())
            }
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a link", link.display()),
            )),
            None => Err(not_found(link)),
        }
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock();
        match inner.nodes.get(path) {
            Some(Node::Dir {
                default_group: false,
            }) => {}
            Some(Node::Dir {
                default_group: true,
            }) => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("{} is a default group", path.display()),
                ))
            }
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is not a directory", path.display()),
                ))
            }
            None => return Err(not_found(path)),
        }

        let occupied = inner.descendants(path).any(|(_, node)| {
            matches!(
                node,
                Node::Link(_)
                    | Node::Dir {
                        default_group: false
                    }
            )
        });
        if occupied {
            return Err(io::Error::other(format!(
                "{} is not empty",
                path.display()
            )));
        }

        let busy = inner.nodes.iter().any(|(p, node)| match node {
            Node::Link(target) => target.starts_with(path) && !p.starts_with(path),
            _ => false,
        });
        if busy {
            return Err(io::Error::other(format!(
                "{} is the target of a link",
                path.display()
            )));
        }

        let doomed: Vec<PathBuf> = inner.descendants(path).map(|(p, _)| p.clone()).collect();
        for p in doomed {
            inner.nodes.remove(&p);
        }
        inner.nodes.remove(path);
        inner.mutations += 1;
        Ok(())
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>> {
        let inner = self.inner.lock();
        if !inner.is_dir(path) {
            return Err(not_found(path));
        }
        Ok(inner
            .descendants(path)
            .filter(|(p, node)| matches!(node, Node::Dir { .. }) && p.parent() == Some(path))
            .filter_map(|(p, _)| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "/sys/kernel/config/usb_gadget";

    #[test]
    fn test_gadget_default_groups() {
        let fs = MemoryConfigFs::new(BASE);
        let gadget = Path::new(BASE).join("g1");

        fs.create_dir(&gadget).unwrap();
        assert!(fs.exists(&gadget.join("strings")));
        assert!(fs.exists(&gadget.join("os_desc")));
        assert_eq!(
            fs.list_dirs(&gadget).unwrap(),
            vec!["configs", "functions", "os_desc", "strings"]
        );

        let uvc = gadget.join("functions/uvc.usb0");
        fs.create_dir(&uvc).unwrap();
        assert!(fs.exists(&uvc.join("streaming/class/hs")));
        assert!(fs.exists(&uvc.join("control/class/ss")));

        // Default groups go away only with their item
        assert_eq!(
            fs.remove_dir(&uvc.join("streaming")).unwrap_err().kind(),
            io::ErrorKind::PermissionDenied
        );
        fs.remove_dir(&uvc).unwrap();
        assert!(!fs.exists(&uvc.join("streaming")));
    }

    #[test]
    fn test_mkdir_rules() {
        let fs = MemoryConfigFs::new(BASE);
        let orphan = Path::new(BASE).join("g1/functions/uvc.usb0");

        assert_eq!(
            fs.create_dir(&orphan).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );

        let gadget = Path::new(BASE).join("g1");
        fs.create_dir(&gadget).unwrap();
        assert_eq!(
            fs.create_dir(&gadget).unwrap_err().kind(),
            io::ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn test_rmdir_refuses_occupied_or_linked_items() {
        let fs = MemoryConfigFs::new(BASE);
        let gadget = Path::new(BASE).join("g1");
        let config = gadget.join("configs/c.1");
        let func = gadget.join("functions/uvc.usb0");
        fs.create_dir(&gadget).unwrap();
        fs.create_dir(&config).unwrap();
        fs.create_dir(&func).unwrap();
        fs.write_attr(&gadget.join("idVendor"), "0x1d6b\n").unwrap();
        fs.symlink(&func, &config.join("uvc.usb0")).unwrap();

        // Gadget still holds user-created items
        assert!(fs.remove_dir(&gadget).is_err());
        // Function is the target of the config link
        assert!(fs.remove_dir(&func).is_err());

        fs.remove_link(&config.join("uvc.usb0")).unwrap();
        fs.remove_dir(&func).unwrap();
        fs.remove_dir(&config).unwrap();
        fs.remove_dir(&gadget).unwrap();
        assert!(!fs.exists(&gadget.join("idVendor")));
    }

    #[test]
    fn test_attrs_and_links() {
        let fs = MemoryConfigFs::new(BASE);
        let gadget = Path::new(BASE).join("g1");
        fs.create_dir(&gadget).unwrap();

        fs.write_attr(&gadget.join("UDC"), "fe980000.usb\n").unwrap();
        assert_eq!(fs.read_attr(&gadget.join("UDC")).unwrap(), "fe980000.usb");
        assert_eq!(
            fs.read_attr(&gadget.join("nope")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );

        let link = gadget.join("os_desc/c.1");
        assert!(fs.symlink(&gadget.join("configs/c.1"), &link).is_err());
        fs.create_dir(&gadget.join("configs/c.1")).unwrap();
        fs.symlink(&gadget.join("configs/c.1"), &link).unwrap();
        assert_eq!(
            fs.symlink(&gadget.join("configs/c.1"), &link)
                .unwrap_err()
                .kind(),
            io::ErrorKind::AlreadyExists
        );
        // Links are not listed as directories
        assert_eq!(fs.list_dirs(&gadget.join("os_desc")).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_mutation_counter() {
        let fs = MemoryConfigFs::new(BASE);
        let before = fs.mutation_count();
        let _ = fs.read_attr(&Path::new(BASE).join("g1/UDC"));
        let _ = fs.exists(Path::new(BASE));
        assert_eq!(fs.mutation_count(), before);

        fs.create_dir(&Path::new(BASE).join("g1")).unwrap();
        assert_eq!(fs.mutation_count(), before + 1);
    }
}
