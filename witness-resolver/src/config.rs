//! Resolver configuration

/// How the engine treats a matching candidate whose own witness parameters are unresolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyPolicy {
    /// Resolve every unresolved witness dependency recursively
    #[default]
    Recursive,
    /// Discard any candidate that still has an unresolved witness dependency
    RejectUnresolved,
}

/// Tuning knobs for the resolution engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Nesting ceiling for dependency resolution, checked in addition to the cycle guard
    pub max_depth: usize,
    /// Drop required capabilities implied by another required capability
    pub minimize_required: bool,
    pub dependency_policy: DependencyPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            minimize_required: true,
            dependency_policy: DependencyPolicy::Recursive,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_minimize_required(mut self, minimize_required: bool) -> Self {
        self.minimize_required = minimize_required;
        self
    }

    pub fn with_dependency_policy(mut self, dependency_policy: DependencyPolicy) -> Self {
        self.dependency_policy = dependency_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = ResolverConfig::new()
            .with_max_depth(8)
            .with_dependency_policy(DependencyPolicy::RejectUnresolved);

        assert_eq!(config.max_depth, 8);
        assert!(config.minimize_required);
        assert_eq!(config.dependency_policy, DependencyPolicy::RejectUnresolved);
    }
}
