/// Deployment toggles that shape how a membership is validated.
///
/// Each [`MembershipConfig`](super::MembershipConfig) owns its own copy, so
/// loaders with different settings can coexist in one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigContext {
    /// A membership with a single participant may run standalone.
    pub standalone_enabled: bool,
    /// Dynamic reconfiguration is permitted.
    pub reconfig_enabled: bool,
}

impl Default for ConfigContext {
    fn default() -> Self {
        Self {
            standalone_enabled: true,
            reconfig_enabled: false,
        }
    }
}

impl ConfigContext {
    pub fn with_standalone(mut self, enabled: bool) -> Self {
        self.standalone_enabled = enabled;
        self
    }

    pub fn with_reconfig(mut self, enabled: bool) -> Self {
        self.reconfig_enabled = enabled;
        self
    }
}
