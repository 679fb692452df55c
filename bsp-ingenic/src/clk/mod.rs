//! CPM clock tree.
//!
//! Clocks are registered from a static table of [`ClkInit`] records into a
//! [`ClkTree`], which owns every node and dispatches consumer requests to the
//! node's hardware operations. [`ClkDriver`] publishes a tree to rdrive as
//! an `rdif_clk` device.

mod desc;
mod driver;
mod node;
mod tree;
pub mod x1000;

use core::fmt;

pub use desc::{
    Caps, CguAccess, CguDesc, ClkFlags, ClkInit, ClkKind, CpccrDesc, DivField, GateDesc,
    LockKind, MuxField, Parent, PllDesc, SsiDesc,
};
pub use driver::ClkDriver;
pub use node::ClkNode;
pub use tree::{ClkTree, FixedClk};

pub const MHZ: u64 = 1_000_000;
pub const KHZ: u64 = 1_000;

/// Dense numeric clock identifier, the index into the provider table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockId(usize);

impl ClockId {
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for ClockId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl From<ClockId> for usize {
    fn from(id: ClockId) -> Self {
        id.0
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClkError {
    /// No clock is registered under this ID.
    InvalidId(ClockId),
    /// The node lacks the capability for the requested operation.
    NotSupported,
    /// Parent index outside the node's parent table.
    InvalidParent(usize),
    /// The selected parent slot is a dummy marker.
    OrphanParent,
    InvalidRate(u64),
    /// A hardware busy bit never cleared.
    Timeout,
    /// `enable` on a clock that was never prepared.
    NotPrepared,
    /// The operation is refused while the clock is prepared.
    Busy,
    /// Gate configured for the PM regmap, but none was supplied.
    MissingRegmap,
    /// Parent ID not registered before its child.
    UnknownParent(ClockId),
    /// Gate association target is not a usable gate.
    BadAssociation(ClockId),
}

impl fmt::Display for ClkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClkError::InvalidId(id) => write!(f, "invalid clock id {}", id),
            ClkError::NotSupported => write!(f, "operation not supported by clock"),
            ClkError::InvalidParent(idx) => write!(f, "invalid parent index {}", idx),
            ClkError::OrphanParent => write!(f, "parent slot is not connected"),
            ClkError::InvalidRate(rate) => write!(f, "invalid rate {} Hz", rate),
            ClkError::Timeout => write!(f, "timed out waiting for clock to settle"),
            ClkError::NotPrepared => write!(f, "clock enabled before prepare"),
            ClkError::Busy => write!(f, "clock is in use"),
            ClkError::MissingRegmap => write!(f, "no PM regmap for regmap gate"),
            ClkError::UnknownParent(id) => write!(f, "parent {} is not registered", id),
            ClkError::BadAssociation(id) => write!(f, "bad gate association to {}", id),
        }
    }
}

impl core::error::Error for ClkError {}
