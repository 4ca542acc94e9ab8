//! Set of client contexts, one bit per client index.

use crate::CLIENT_CONTEXTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientSet(u32);

impl ClientSet {
    pub const EMPTY: ClientSet = ClientSet(0);

    pub const fn single(index: usize) -> Self {
        if index < CLIENT_CONTEXTS {
            ClientSet(1 << index)
        } else {
            ClientSet(0)
        }
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, index: usize) -> bool {
        index < CLIENT_CONTEXTS && self.0 & (1 << index) != 0
    }

    pub fn insert(&mut self, index: usize) {
        self.0 |= Self::single(index).0;
    }

    /// Returns true if the client was a member.
    pub fn remove(&mut self, index: usize) -> bool {
        let was = self.contains(index);
        self.0 &= !Self::single(index).0;
        was
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    pub const fn union(self, other: ClientSet) -> ClientSet {
        ClientSet(self.0 | other.0)
    }

    /// Member indices in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..CLIENT_CONTEXTS).filter(move |&i| self.contains(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let mut set = ClientSet::EMPTY;
        set.insert(3);
        set.insert(15);
        set.insert(16);

        assert!(set.contains(3));
        assert!(!set.contains(16));
        assert_eq!(set.len(), 2);
        assert!(set.remove(3));
        assert!(!set.remove(3));
        assert_eq!(set.iter().next(), Some(15));
        assert_eq!(set.union(ClientSet::single(0)).bits(), 0x8001);
    }
}
