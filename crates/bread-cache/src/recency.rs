//! Recency ordering for LRU eviction.
//!
//! A doubly-linked list stored in an arena. Nodes are addressed by
//! [`Handle`] indices instead of pointers; freed slots are reused through
//! a free list. Front is most recently used, back is least recently used.

/// Position of a key in the recency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Handle(usize);

#[derive(Debug)]
struct Node {
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
enum Slot {
    Occupied(Node),
    Vacant { next_free: Option<usize> },
}

/// Arena-backed LRU ordering of keys.
#[derive(Debug, Default)]
pub(crate) struct Recency {
    slots: Vec<Slot>,
    free: Option<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl Recency {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Insert a key as the most recently used.
    pub(crate) fn push_front(&mut self, key: String) -> Handle {
        let node = Node {
            key,
            prev: None,
            next: self.head,
        };

        let idx = match self.free {
            Some(idx) => {
                if let Slot::Vacant { next_free } = self.slots[idx] {
                    self.free = next_free;
                }
                self.slots[idx] = Slot::Occupied(node);
                idx
            }
            None => {
                self.slots.push(Slot::Occupied(node));
                self.slots.len() - 1
            }
        };

        match self.head {
            Some(old_head) => self.node_mut(old_head).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.len += 1;

        Handle(idx)
    }

    /// Move a key to the front.
    pub(crate) fn promote(&mut self, handle: Handle) {
        if self.head == Some(handle.0) {
            return;
        }
        self.unlink(handle.0);

        let old_head = self.head;
        {
            let node = self.node_mut(handle.0);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.node_mut(h).prev = Some(handle.0),
            None => self.tail = Some(handle.0),
        }
        self.head = Some(handle.0);
    }

    /// Remove a key, returning it. The handle must not be used afterwards.
    pub(crate) fn remove(&mut self, handle: Handle) -> String {
        self.unlink(handle.0);
        let slot = std::mem::replace(
            &mut self.slots[handle.0],
            Slot::Vacant {
                next_free: self.free,
            },
        );
        self.free = Some(handle.0);
        self.len -= 1;

        match slot {
            Slot::Occupied(node) => node.key,
            Slot::Vacant { .. } => unreachable!("recency handle points at a vacant slot"),
        }
    }

    /// The least recently used key.
    pub(crate) fn back(&self) -> Option<Handle> {
        self.tail.map(Handle)
    }

    /// The next more recently used key.
    pub(crate) fn prev(&self, handle: Handle) -> Option<Handle> {
        self.node(handle.0).prev.map(Handle)
    }

    pub(crate) fn key(&self, handle: Handle) -> &str {
        &self.node(handle.0).key
    }

    /// Keys from most to least recently used.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::successors(self.head, |&idx| self.node(idx).next)
            .map(|idx| self.node(idx).key.as_str())
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    fn node(&self, idx: usize) -> &Node {
        match &self.slots[idx] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("recency handle points at a vacant slot"),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        match &mut self.slots[idx] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("recency handle points at a vacant slot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(r: &Recency) -> Vec<&str> {
        r.iter().collect()
    }

    #[test]
    fn test_push_front_orders_newest_first() {
        let mut r = Recency::new();
        r.push_front("a".into());
        r.push_front("b".into());
        r.push_front("c".into());

        assert_eq!(keys(&r), vec!["c", "b", "a"]);
        assert_eq!(r.len(), 3);
        assert_eq!(r.back().map(|h| r.key(h)), Some("a"));
    }

    #[test]
    fn test_promote_moves_to_front() {
        let mut r = Recency::new();
        let a = r.push_front("a".into());
        let b = r.push_front("b".into());
        r.push_front("c".into());

        r.promote(a);
        assert_eq!(keys(&r), vec!["a", "c", "b"]);
        assert_eq!(r.back(), Some(b));

        // Promoting the head is a no-op
        r.promote(a);
        assert_eq!(keys(&r), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_remove_and_reuse_slot() {
        let mut r = Recency::new();
        let a = r.push_front("a".into());
        let b = r.push_front("b".into());
        let c = r.push_front("c".into());

        assert_eq!(r.remove(b), "b");
        assert_eq!(keys(&r), vec!["c", "a"]);
        assert_eq!(r.prev(a), Some(c));

        // The freed slot is reused
        let d = r.push_front("d".into());
        assert_eq!(d, b);
        assert_eq!(keys(&r), vec!["d", "c", "a"]);

        assert_eq!(r.remove(a), "a");
        assert_eq!(r.remove(d), "d");
        assert_eq!(r.remove(c), "c");
        assert_eq!(r.len(), 0);
        assert_eq!(r.back(), None);
        assert!(keys(&r).is_empty());
    }

    #[test]
    fn test_walk_from_back() {
        let mut r = Recency::new();
        for k in ["a", "b", "c", "d"] {
            r.push_front(k.into());
        }

        let walked: Vec<&str> = std::iter::successors(r.back(), |&h| r.prev(h))
            .map(|h| r.key(h))
            .collect();
        assert_eq!(walked, vec!["a", "b", "c", "d"]);
    }
}
