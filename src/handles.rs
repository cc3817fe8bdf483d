use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::capability::FileHandle;

pub type SharedHandles = Rc<RefCell<HandleDirectory>>;

/// Live file capabilities keyed by file name. These can't be serialized, so
/// they are kept apart from the [`Registry`](crate::registry::Registry) and
/// only joined to it through the file name.
#[derive(Debug, Default)]
pub struct HandleDirectory {
    handles: HashMap<String, Rc<dyn FileHandle>>,
}

impl HandleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedHandles {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Stores the handle, replacing any previous one for the same name.
    pub fn insert<S: AsRef<str>>(&mut self, name: S, handle: Rc<dyn FileHandle>) {
        self.handles.insert(name.as_ref().to_string(), handle);
    }

    /// Returns a clone of the handle so callers never keep the directory
    /// borrowed across an await.
    pub fn get(&self, name: &str) -> Option<Rc<dyn FileHandle>> {
        self.handles.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<dyn FileHandle>> {
        self.handles.remove(name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::HandleDirectory;
    use crate::capability::MemoryFs;

    #[test]
    fn latest_handle_wins() {
        let fs = MemoryFs::new();
        let mut handles = HandleDirectory::new();
        handles.insert("a.txt", fs.handle("first/a.txt"));
        handles.insert("a.txt", fs.handle("second/a.txt"));

        assert_eq!(1, handles.len());
        let handle = handles.get("a.txt").unwrap();
        assert!(format!("{:?}", handle).contains("second/a.txt"));
    }

    #[test]
    fn remove_and_clear() {
        let fs = MemoryFs::new();
        let mut handles = HandleDirectory::new();
        handles.insert("a.txt", fs.handle("a.txt"));
        handles.insert("b.txt", fs.handle("b.txt"));

        assert!(handles.remove("a.txt").is_some());
        assert!(!handles.contains("a.txt"));
        assert!(handles.contains("b.txt"));

        handles.clear();
        assert!(handles.is_empty());
        assert!(handles.get("b.txt").is_none());
    }
}
