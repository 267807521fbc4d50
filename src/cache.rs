//! The bounded cache of names that have been found in the hosts file.

use std::net::Ipv4Addr;
use std::num::NonZeroUsize;

use log::*;
use lru::LruCache;


/// A **name cache** maps names to the addresses they were found with,
/// keeping the most recently looked-up names and forgetting the rest.
///
/// The index and the recency order live in the one `LruCache`, so there is
/// no way for an entry to be in one and not the other.
#[derive(Debug)]
pub struct NameCache {
    entries: LruCache<String, Vec<Ipv4Addr>>,
    max_addresses: usize,
}

impl NameCache {

    /// Creates an empty cache that holds at most `max_entries` names, each
    /// with at most `max_addresses` addresses.
    pub fn new(max_entries: NonZeroUsize, max_addresses: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(max_entries),
            max_addresses: max_addresses.get(),
        }
    }

    /// Looks up the addresses for a name, marking it as the most recently
    /// used if it’s there.
    pub fn lookup(&mut self, name: &str) -> Option<&[Ipv4Addr]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Records that the name has the given address, returning every address
    /// now known for it.
    ///
    /// A name that is already cached gets the address appended (unless it
    /// already has as many as it’s allowed) but keeps its place in the
    /// recency order, so loading many names from the hosts file in a row
    /// doesn’t shuffle everything. A new name goes in as the most recently
    /// used, pushing out the least recently used name if the cache is full.
    pub fn insert(&mut self, name: &str, address: Ipv4Addr) -> &[Ipv4Addr] {
        if let Some(addresses) = self.entries.peek_mut(name) {
            if addresses.len() < self.max_addresses {
                addresses.push(address);
            }
            else {
                trace!("Name {:?} already has {} addresses, ignoring {}", name, addresses.len(), address);
            }
        }
        else if let Some((evicted, _)) = self.entries.push(name.to_owned(), vec![ address ]) {
            debug!("Removing {:?} from cache", evicted);
        }

        self.entries.peek(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether the cache has as many names as it can hold.
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.entries.cap().get()
    }

    /// The number of names in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no names at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently used name, if there is one.
    pub fn most_recent(&self) -> Option<&str> {
        self.entries.iter().next().map(|(name, _)| name.as_str())
    }

    /// The least recently used name, which is the next to go.
    pub fn least_recent(&self) -> Option<&str> {
        self.entries.peek_lru().map(|(name, _)| name.as_str())
    }
}
