//! Resolving names against the hosts file, through the cache.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::path::Path;

use log::*;

use crate::cache::NameCache;


/// Anything the resolver can scan for names: in practice, the hosts file.
/// It gets rewound and read from the start on every cache miss.
pub trait Directory: BufRead + Seek + Send {}

impl<T: BufRead + Seek + Send> Directory for T {}


/// A **resolver** answers which addresses a name has, first by asking its
/// cache, then by reading through the hosts file.
///
/// Nothing in here is synchronised. The directory has one read position and
/// the cache has one recency order, so anything sharing a resolver between
/// threads has to hold a lock for the whole of each `resolve` call.
pub struct Resolver {
    directory: Box<dyn Directory>,
    cache: NameCache,
    max_aliases: usize,
    scans: u64,
}

impl Resolver {

    /// Opens the hosts file at the given path, and returns a resolver that
    /// reads it.
    pub fn open(path: &Path, cache: NameCache, max_aliases: NonZeroUsize) -> Result<Self, ResolutionError> {
        debug!("Opening hosts file {:?}", path);
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), cache, max_aliases))
    }

    /// Returns a resolver that reads the given directory. Only the first
    /// `max_aliases` names on each line are considered.
    pub fn new(directory: impl Directory + 'static, cache: NameCache, max_aliases: NonZeroUsize) -> Self {
        Self {
            directory: Box::new(directory),
            cache,
            max_aliases: max_aliases.get(),
            scans: 0,
        }
    }

    /// Returns every address known for the given name.
    ///
    /// A cached name is returned without touching the hosts file. Otherwise
    /// the whole file gets read, and every name in it that matches is added
    /// to the cache. The other names on the way get cached too, as long as
    /// there’s room for them, as the next query is likely to be for one of
    /// them.
    pub fn resolve(&mut self, name: &str) -> Result<Vec<Ipv4Addr>, ResolutionError> {
        if let Some(addresses) = self.cache.lookup(name) {
            debug!("Cache hit for {:?}", name);
            return Ok(addresses.to_vec());
        }

        debug!("Cache miss for {:?}, scanning hosts file", name);
        self.scans += 1;
        self.directory.seek(SeekFrom::Start(0))?;

        let mut found = None;
        let mut line = Vec::new();
        loop {
            line.clear();
            if self.directory.read_until(b'\n', &mut line)? == 0 {
                break;
            }

            let text = String::from_utf8_lossy(&line);
            let (address, aliases) = match parse_line(&text, self.max_aliases) {
                Some(entry)  => entry,
                None         => continue,
            };

            for alias in aliases {
                if alias == name {
                    trace!("Found {:?} -> {}", alias, address);
                    found = Some(self.cache.insert(alias, address).to_vec());
                }
                else if ! self.cache.is_full() {
                    self.cache.insert(alias, address);
                }
            }
        }

        debug!("Resolver state -> {}", self);
        found.ok_or_else(|| ResolutionError::NotFound(name.into()))
    }

    /// The number of times the hosts file has been read through.
    pub fn directory_scans(&self) -> u64 {
        self.scans
    }
}

impl fmt::Display for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cache.is_empty() {
            return write!(f, "nothing cached, {} scans", self.scans);
        }

        write!(f, "{} cached names (head {:?}, tail {:?}), {} scans",
               self.cache.len(),
               self.cache.most_recent().unwrap_or("<none>"),
               self.cache.least_recent().unwrap_or("<none>"),
               self.scans)
    }
}


/// Splits a line of the hosts file into its address and the names that
/// follow it. Returns `None` for blank lines, comments, and lines that don’t
/// start with an IPv4 address.
fn parse_line(line: &str, max_aliases: usize) -> Option<(Ipv4Addr, Vec<&str>)> {
    if line.starts_with('#') {
        return None;
    }

    let line = match line.find('#') {
        Some(hash_index)  => &line[.. hash_index],
        None              => line,
    };

    let mut fields = line.split_ascii_whitespace();
    let address_str = fields.next()?;

    match address_str.parse() {
        Ok(address) => {
            Some((address, fields.take(max_aliases).collect()))
        }
        Err(e) => {
            trace!("Skipping line with address {:?}: {}", address_str, e);
            None
        }
    }
}


/// Something that can go wrong resolving a name.
#[derive(Debug)]
pub enum ResolutionError {

    /// The name isn’t in the hosts file.
    NotFound(String),

    /// The hosts file could not be opened or read.
    Directory(io::Error),
}

impl From<io::Error> for ResolutionError {
    fn from(inner: io::Error) -> Self {
        Self::Directory(inner)
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(name)  => write!(f, "Could not resolve {:?}", name),
            Self::Directory(ioe)  => write!(f, "Could not read hosts file: {}", ioe),
        }
    }
}
