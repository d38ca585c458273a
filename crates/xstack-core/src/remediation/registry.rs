//! Strategy registry
//!
//! Maps each repair family to an ordered list of strategies. A registry is
//! only usable once every family has at least two distinct classes.

use super::family::{RepairFamily, StrategyClass};
use super::strategies::{
    CacheInvalidate, CanonicalRewrite, CommandStrategy, PathRenormalize, RepairStrategy,
    ToolDiscovery, ToolUiBind, WorkspaceRebuild,
};
use crate::config::RepairCommand;
use crate::error::GateError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Minimum distinct strategy classes per family
pub const MIN_STRATEGY_CLASSES: usize = 2;

/// Strategies per repair family, in preference order
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    families: BTreeMap<RepairFamily, Vec<Arc<dyn RepairStrategy>>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classes: BTreeMap<&str, Vec<String>> = self
            .families
            .keys()
            .map(|family| {
                let names = self.classes(*family).iter().map(ToString::to_string).collect();
                (family.as_str(), names)
            })
            .collect();
        f.debug_struct("StrategyRegistry").field("families", &classes).finish()
    }
}

impl StrategyRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in strategies plus configured commands, validated
    ///
    /// # Errors
    /// [`GateError::InvalidInput`] for commands naming an unknown family,
    /// [`GateError::StrategyDiversity`] if a family ends up under-covered
    pub fn with_defaults(commands: &[RepairCommand]) -> Result<Self, GateError> {
        use RepairFamily as F;

        let tool_discovery: Arc<dyn RepairStrategy> = Arc::new(ToolDiscovery);
        let tool_ui_bind: Arc<dyn RepairStrategy> = Arc::new(ToolUiBind);
        let rebuild: Arc<dyn RepairStrategy> = Arc::new(WorkspaceRebuild);
        let invalidate: Arc<dyn RepairStrategy> = Arc::new(CacheInvalidate);
        let rewrite: Arc<dyn RepairStrategy> = Arc::new(CanonicalRewrite);
        let renormalize: Arc<dyn RepairStrategy> = Arc::new(PathRenormalize);

        let mut registry = Self::new();
        for strategy in [&tool_discovery, &tool_ui_bind, &rebuild] {
            registry.register(F::ToolMissing, Arc::clone(strategy));
        }
        for strategy in [&renormalize, &rebuild] {
            registry.register(F::PathUnresolved, Arc::clone(strategy));
        }
        for strategy in [&rewrite, &invalidate] {
            registry.register(F::CanonicalHash, Arc::clone(strategy));
        }
        for strategy in [&invalidate, &rebuild] {
            registry.register(F::SchemaLoad, Arc::clone(strategy));
            registry.register(F::Timeout, Arc::clone(strategy));
        }
        for strategy in [&invalidate, &rewrite] {
            registry.register(F::GateViolation, Arc::clone(strategy));
        }

        for command in commands {
            let family = RepairFamily::parse(&command.family).ok_or_else(|| {
                GateError::invalid_input(format!(
                    "repair command {} names unknown family {}",
                    command.name, command.family
                ))
            })?;
            if command.command.is_empty() {
                return Err(GateError::invalid_input(format!(
                    "repair command {} has no command line",
                    command.name
                )));
            }
            registry.register(
                family,
                Arc::new(CommandStrategy::new(&command.name, family, command.command.clone())),
            );
        }

        registry.validate()?;
        Ok(registry)
    }

    /// Append `strategy` to `family`; a class already present is ignored
    pub fn register(&mut self, family: RepairFamily, strategy: Arc<dyn RepairStrategy>) {
        let entry = self.families.entry(family).or_default();
        let class = strategy.class();
        if entry.iter().any(|s| s.class() == class) {
            tracing::debug!(%family, %class, "strategy class already registered");
            return;
        }
        entry.push(strategy);
    }

    /// Require two distinct classes for every family
    ///
    /// # Errors
    /// [`GateError::StrategyDiversity`] naming the first under-covered family
    pub fn validate(&self) -> Result<(), GateError> {
        for family in RepairFamily::ALL {
            let count = self.classes(family).len();
            if count < MIN_STRATEGY_CLASSES {
                return Err(GateError::StrategyDiversity {
                    family: family.as_str().to_owned(),
                    count,
                });
            }
        }
        Ok(())
    }

    /// Strategies for `family`, in preference order
    #[must_use]
    pub fn strategies(&self, family: RepairFamily) -> &[Arc<dyn RepairStrategy>] {
        self.families.get(&family).map_or(&[], Vec::as_slice)
    }

    /// Distinct classes for `family`
    #[must_use]
    pub fn classes(&self, family: RepairFamily) -> BTreeSet<StrategyClass> {
        self.strategies(family).iter().map(|s| s.class()).collect()
    }

    /// First strategy for `family` whose class is not in `tried`
    #[must_use]
    pub fn next_untried(
        &self,
        family: RepairFamily,
        tried: &BTreeSet<StrategyClass>,
    ) -> Option<&Arc<dyn RepairStrategy>> {
        self.strategies(family).iter().find(|s| !tried.contains(&s.class()))
    }

    /// Whether `family` has `class`
    #[inline]
    #[must_use]
    pub fn contains(&self, family: RepairFamily, class: &StrategyClass) -> bool {
        self.strategies(family).iter().any(|s| &s.class() == class)
    }

    /// Total registrations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.values().map(Vec::len).sum()
    }

    /// Nothing registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
