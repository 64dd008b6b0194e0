/// Mass difference between the C13 and C12 isotopes.
pub const NEUTRON_MASS: f64 = 1.0033548378;

/// Version stamp expected in serialized scan-index parts.
pub const SCAN_FORMAT_VERSION: u32 = 1;
