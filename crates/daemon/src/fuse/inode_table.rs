//! Bidirectional inode ↔ path mapping for the FUSE adapter
//!
//! The kernel names nodes by 64-bit inode; the channel filesystem names them
//! by path. Inodes are handed out on first lookup and stay stable until the
//! path is removed.

use std::collections::HashMap;

/// Bidirectional mapping between inodes and paths
#[derive(Debug)]
pub struct InodeTable {
    path_to_inode: HashMap<String, u64>,
    inode_to_path: HashMap<u64, String>,
    /// Next available inode number (1 is the root)
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Root inode number (always 1 in FUSE)
    pub const ROOT_INODE: u64 = 1;

    /// Create a new inode table with root pre-registered
    pub fn new() -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            inode_to_path: HashMap::new(),
            next_inode: Self::ROOT_INODE + 1,
        };

        table
            .path_to_inode
            .insert("/".to_string(), Self::ROOT_INODE);
        table
            .inode_to_path
            .insert(Self::ROOT_INODE, "/".to_string());

        table
    }

    /// Get or create an inode for a path
    pub fn get_or_create(&mut self, path: &str) -> u64 {
        let normalized = Self::normalize_path(path);

        if let Some(&inode) = self.path_to_inode.get(&normalized) {
            return inode;
        }

        let inode = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(normalized.clone(), inode);
        self.inode_to_path.insert(inode, normalized);
        inode
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(&Self::normalize_path(path)).copied()
    }

    pub fn get_path(&self, inode: u64) -> Option<&str> {
        self.inode_to_path.get(&inode).map(String::as_str)
    }

    /// Remove a path and everything below it, returning how many mappings
    /// were dropped. The root is never removed.
    pub fn remove_tree(&mut self, path: &str) -> usize {
        let normalized = Self::normalize_path(path);
        if normalized == "/" {
            return 0;
        }

        let prefix = format!("{}/", normalized);
        let doomed: Vec<u64> = self
            .path_to_inode
            .iter()
            .filter(|(p, _)| **p == normalized || p.starts_with(&prefix))
            .map(|(_, &inode)| inode)
            .collect();

        for inode in &doomed {
            if let Some(path) = self.inode_to_path.remove(inode) {
                self.path_to_inode.remove(&path);
            }
        }
        doomed.len()
    }

    /// Path of `name` inside the directory with inode `parent`
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        let parent_path = self.get_path(parent)?;
        Some(Self::join(parent_path, name))
    }

    /// Inode of the parent directory of `inode` (root is its own parent)
    pub fn parent_inode(&self, inode: u64) -> Option<u64> {
        let path = self.get_path(inode)?;
        self.get_inode(&Self::parent_path(path))
    }

    pub fn len(&self) -> usize {
        self.inode_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inode_to_path.is_empty()
    }

    fn join(parent: &str, name: &str) -> String {
        if parent == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent, name)
        }
    }

    /// Normalize a path to a consistent format
    fn normalize_path(path: &str) -> String {
        let path = path.trim();

        if path.is_empty() || path == "/" {
            return "/".to_string();
        }

        // Ensure leading slash, no trailing slash
        let mut normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        if normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }

        normalized
    }

    /// Get the parent path of a given path
    pub fn parent_path(path: &str) -> String {
        let normalized = Self::normalize_path(path);
        if normalized == "/" {
            return "/".to_string();
        }

        match normalized.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(pos) => normalized[..pos].to_string(),
        }
    }
}
