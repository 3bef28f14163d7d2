//! Process-wide table of advertised globals
//!
//! This table only records which globals exist. Announcing them to the clients
//! is done by the [`Display`](super::Display), which owns both this table and
//! the clients.

use indexmap::IndexMap;

use crate::protocol::Interface;

/// An advertised global
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    /// Numeric name, unique for the lifetime of the process
    pub name: u32,
    /// Interface of the global
    pub interface: Interface,
    /// Highest version clients may bind
    pub version: u32,
}

/// Errors of the global table
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GlobalError {
    /// The interface cannot be bound through the registry
    #[error("{0} cannot be advertised as a global")]
    NotBindable(Interface),
    /// The requested version is not implemented
    #[error("version {version} of {interface} is not supported")]
    UnsupportedVersion {
        /// Interface of the global
        interface: Interface,
        /// Requested version
        version: u32,
    },
    /// No global with this name
    #[error("no global named {0}")]
    Unknown(u32),
    /// Every name has been used
    #[error("global names are exhausted")]
    Exhausted,
}

/// Table of the live globals
#[derive(Debug)]
pub struct GlobalRegistry {
    globals: IndexMap<u32, Global>,
    next_name: Option<u32>,
}

impl Default for GlobalRegistry {
    fn default() -> Self {
        GlobalRegistry {
            globals: IndexMap::new(),
            next_name: Some(1),
        }
    }
}

impl GlobalRegistry {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new global and return its name
    pub fn advertise(&mut self, interface: Interface, version: u32) -> Result<Global, GlobalError> {
        if !interface.is_global() {
            return Err(GlobalError::NotBindable(interface));
        }
        check_version(interface, version)?;
        let name = self.next_name.ok_or(GlobalError::Exhausted)?;
        self.next_name = name.checked_add(1);
        let global = Global {
            name,
            interface,
            version,
        };
        self.globals.insert(name, global);
        Ok(global)
    }

    /// Remove a global, returning it if it was still advertised
    pub fn withdraw(&mut self, name: u32) -> Option<Global> {
        // names are never reused, so order among the remaining globals is unaffected
        self.globals.shift_remove(&name)
    }

    /// Change the version offered for future binds of a global
    pub fn set_version(&mut self, name: u32, version: u32) -> Result<(), GlobalError> {
        let global = self.globals.get_mut(&name).ok_or(GlobalError::Unknown(name))?;
        check_version(global.interface, version)?;
        global.version = version;
        Ok(())
    }

    /// Look a live global up
    pub fn get(&self, name: u32) -> Option<&Global> {
        self.globals.get(&name)
    }

    /// Iterate over the live globals in advertisement order
    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.globals.values()
    }

    /// Number of live globals
    pub fn len(&self) -> usize {
        self.globals.len()
    }

    /// Whether no global is advertised
    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}

fn check_version(interface: Interface, version: u32) -> Result<(), GlobalError> {
    if version == 0 || version > interface.version() {
        return Err(GlobalError::UnsupportedVersion { interface, version });
    }
    Ok(())
}
