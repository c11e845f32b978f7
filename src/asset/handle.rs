use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed index into an [`AssetCache`](super::AssetCache).
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

// Manual impls so that handles stay Copy/Eq/Hash regardless of T.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct NotCopy;

    #[test]
    fn handle_is_copy_without_bounds_on_t() {
        let h1: Handle<NotCopy> = Handle::new(5);
        let h2 = h1;
        assert_eq!(h1, h2);
        assert_eq!(h1.index(), 5);
    }

    #[test]
    fn handles_hash_by_index() {
        let mut set = HashSet::new();
        set.insert(Handle::<NotCopy>::new(1));
        set.insert(Handle::<NotCopy>::new(1));
        set.insert(Handle::<NotCopy>::new(2));
        assert_eq!(set.len(), 2);
    }
}
