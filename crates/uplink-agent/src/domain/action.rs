//! # Actions
//!
//! The closed set of remote-invocable operations.

use std::fmt;

/// A named action the control plane may invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Configuration changed; host should rebuild / install dependencies.
    HandleConfig,
    /// Snapshot of the host's configuration, models and API registry.
    PullServer,
    /// Trigger the host rebuild.
    Rebuild,
    /// Remove a batch of paths.
    RemoveFileOrFolder,
    /// Copy-then-remove a batch of paths.
    RenameFileOrFolder,
}

/// Wire name → action.
const ACTION_TABLE: [(&str, ActionKind); 5] = [
    ("handleConfig", ActionKind::HandleConfig),
    ("pullServer", ActionKind::PullServer),
    ("rebuild", ActionKind::Rebuild),
    ("removeFileOrFolder", ActionKind::RemoveFileOrFolder),
    ("renameFileOrFolder", ActionKind::RenameFileOrFolder),
];

impl ActionKind {
    /// Resolve a wire name. Names are case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        ACTION_TABLE
            .iter()
            .find(|(wire, _)| *wire == name)
            .map(|(_, kind)| *kind)
    }

    /// Wire name.
    pub fn name(self) -> &'static str {
        ACTION_TABLE
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(wire, _)| *wire)
            .unwrap_or("unknown")
    }

    /// Every action, in table order.
    pub fn all() -> impl Iterator<Item = ActionKind> {
        ACTION_TABLE.iter().map(|(_, kind)| *kind)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
