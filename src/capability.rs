//! Dialect capabilities: a deny-list keyed by driver name. Unknown drivers support everything.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Write statements can return the affected rows in the same round trip.
    pub write_returning: bool,
    /// UPDATE accepts ORDER BY.
    pub ordered_update: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities {
        write_returning: true,
        ordered_update: true,
    };
}

const DENY_LIST: &[(&str, Capabilities)] = &[
    ("mysql", Capabilities { write_returning: false, ordered_update: true }),
    ("mysql2", Capabilities { write_returning: false, ordered_update: true }),
    ("sqlite3", Capabilities { write_returning: false, ordered_update: true }),
    ("mssql", Capabilities { write_returning: true, ordered_update: false }),
];

pub fn capabilities(driver_name: &str) -> Capabilities {
    DENY_LIST
        .iter()
        .find(|(name, _)| *name == driver_name)
        .map(|(_, caps)| *caps)
        .unwrap_or(Capabilities::FULL)
}

pub fn supports_write_returning(driver_name: &str) -> bool {
    capabilities(driver_name).write_returning
}

pub fn supports_ordered_update(driver_name: &str) -> bool {
    capabilities(driver_name).ordered_update
}
