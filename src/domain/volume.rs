use indexmap::IndexMap;

/// A named volume resource, rendered as its own unit on the Linux adapter
/// and as a plain host-directory mount target on macOS.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Volume {
    pub name: String,
    pub driver: Option<String>,
    /// Unordered; sorted by key at render time.
    pub options: IndexMap<String, String>,
    /// Unordered; sorted by key at render time.
    pub labels: IndexMap<String, String>,
    /// `true` if this volume is expected to already exist and must not be
    /// created by the generated unit.
    pub external: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_volume_is_not_external() {
        assert!(!Volume::default().external);
    }
}
