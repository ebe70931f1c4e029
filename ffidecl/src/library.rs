//! Symbol-loader capability: the seam between the type model and whatever
//! actually opens libraries and resolves addresses.
//!
//! The core never performs the foreign call itself; it pairs declared names
//! with resolved addresses and hands the completed type node to the call
//! backend.

use crate::error::Result;
use crate::model::TypeId;

/// resolved address of a native symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(pub usize);

/// an opened library (or the process's own symbols).
pub trait Library {
    fn symbol(&self, name: &str) -> Result<Address>;
}

/// opens libraries by name; `None` means search the already-loaded process
/// image.
pub trait SymbolLoader {
    fn load_library(&self, name: Option<&str>) -> Result<Box<dyn Library>>;
}

/// a declared name paired with its resolved address and type node.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub addr: Address,
    pub ty: TypeId,
}
