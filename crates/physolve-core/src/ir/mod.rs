//! Intermediate representation
//!
//! The [`IrBuilder`] lowers a declarative [`ProblemModel`] into a
//! [`SystemIr`]: detected physics modules in dependency order, one merged
//! parameter set, constraints, conservation laws and simulator hints.
//!
//! # Example
//!
//! ```no_run
//! use physolve_core::ir::{IrBuilder, model::{ProblemModel, SystemSpec, ParameterSpec}};
//!
//! # async fn demo() {
//! let model = ProblemModel {
//!     system: Some(SystemSpec {
//!         system_type: "free_fall".into(),
//!         parameters: vec![ParameterSpec::given("h", 20.0, "m")],
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//!
//! let mut builder = IrBuilder::new();
//! let result = builder.convert(&model).await;
//! assert!(result.success);
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod detection;
pub mod library;
pub mod model;
pub mod ordering;
pub mod types;

pub use cache::{CachedConversion, IrCache};
pub use library::{ModuleKind, PhysicsDomain};
pub use model::ProblemModel;
pub use types::*;

use crate::config::IrOptions;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Outcome of one conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    pub ir: Option<SystemIr>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Whether the IR came from the cache
    pub from_cache: bool,
    pub duration_ms: f64,
}

/// Builder counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrMetrics {
    pub conversions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Running mean over conversions that were not served from the cache
    pub average_conversion_ms: f64,
    pub failures: u64,
}

impl IrMetrics {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Converts problem models to IR, caching results
pub struct IrBuilder {
    options: IrOptions,
    cache: IrCache,
    metrics: IrMetrics,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::with_options(IrOptions::default())
    }

    pub fn with_options(options: IrOptions) -> Self {
        Self {
            cache: IrCache::with_capacity(options.cache_capacity),
            options,
            metrics: IrMetrics::default(),
        }
    }

    pub fn options(&self) -> &IrOptions {
        &self.options
    }

    pub fn metrics(&self) -> &IrMetrics {
        &self.metrics
    }

    pub fn cache(&self) -> &IrCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Convert a problem model
    ///
    /// Never fails: errors are reported in the result. A dependency cycle
    /// yields `success == false` with the cycle named in `errors`.
    pub async fn convert(&mut self, model: &ProblemModel) -> ConversionResult {
        let started = Instant::now();
        self.metrics.conversions += 1;

        let key = if self.options.cache_enabled {
            IrCache::key(model, &self.options)
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(cached) = self.cache.get(key) {
                self.metrics.cache_hits += 1;
                tracing::debug!("IR cache hit for {}", &key[..12.min(key.len())]);
                return ConversionResult {
                    success: true,
                    ir: Some(cached.ir.clone()),
                    errors: Vec::new(),
                    warnings: cached.warnings.clone(),
                    from_cache: true,
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                };
            }
            self.metrics.cache_misses += 1;
        }

        tracing::info!("Converting problem model to IR");
        tokio::task::yield_now().await;

        let outcome = builder::Lowering::new(model, &self.options).run();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record_duration(duration_ms);

        match outcome {
            Ok((ir, warnings)) => {
                tracing::info!(
                    "IR ready: {} module(s), {} parameter(s), {} warning(s) in {:.2} ms",
                    ir.system.modules.len(),
                    ir.system.parameters.len(),
                    warnings.len(),
                    duration_ms
                );
                if let Some(key) = key {
                    let entry = CachedConversion {
                        ir: ir.clone(),
                        warnings: warnings.clone(),
                    };
                    if self.cache.store(key, entry).is_some() {
                        tracing::debug!("IR cache full; evicted least recently used entry");
                    }
                }
                ConversionResult {
                    success: true,
                    ir: Some(ir),
                    errors: Vec::new(),
                    warnings,
                    from_cache: false,
                    duration_ms,
                }
            }
            Err(e) => {
                self.metrics.failures += 1;
                tracing::warn!("IR conversion failed: {}", e);
                ConversionResult {
                    success: false,
                    ir: None,
                    errors: vec![e.to_string()],
                    warnings: Vec::new(),
                    from_cache: false,
                    duration_ms,
                }
            }
        }
    }

    fn record_duration(&mut self, duration_ms: f64) {
        let built = (self.metrics.conversions - self.metrics.cache_hits) as f64;
        self.metrics.average_conversion_ms +=
            (duration_ms - self.metrics.average_conversion_ms) / built.max(1.0);
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::model::{ModuleSpec, ParameterSpec, ProblemMetadata, SystemSpec};

    fn free_fall() -> ProblemModel {
        ProblemModel {
            metadata: Some(ProblemMetadata {
                description:
                    "A ball is dropped from a height of 20 m. Find its speed when it hits the ground."
                        .to_string(),
                ..Default::default()
            }),
            system: Some(SystemSpec {
                system_type: "free_fall".to_string(),
                parameters: vec![
                    ParameterSpec::given("h", 20.0, "m"),
                    ParameterSpec::given("g", 9.8, "m/s^2"),
                    ParameterSpec::unknown("v", "m/s"),
                    ParameterSpec::unknown("t", "s"),
                ],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_convert_free_fall() {
        let mut builder = IrBuilder::new();
        let result = builder.convert(&free_fall()).await;

        assert!(result.success, "{:?}", result.errors);
        let ir = result.ir.unwrap();
        assert_eq!(ir.system.modules[0].kind, ModuleKind::FreeFall);
        assert!(ir.conserves(ConservationLaw::Energy));
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn test_cache_hit_on_identical_input() {
        let mut builder = IrBuilder::new();
        let first = builder.convert(&free_fall()).await;
        let second = builder.convert(&free_fall()).await;

        assert!(second.from_cache);
        assert_eq!(first.ir, second.ir);
        assert_eq!(builder.metrics().cache_hits, 1);
        assert_eq!(builder.metrics().cache_misses, 1);
        assert_eq!(builder.metrics().conversions, 2);
        assert_eq!(builder.metrics().hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let mut builder = IrBuilder::with_options(IrOptions {
            cache_enabled: false,
            ..Default::default()
        });
        builder.convert(&free_fall()).await;
        let second = builder.convert(&free_fall()).await;
        assert!(!second.from_cache);
        assert!(builder.cache().is_empty());
        assert_eq!(builder.metrics().cache_misses, 0);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_rebuild() {
        let mut builder = IrBuilder::new();
        builder.convert(&free_fall()).await;
        builder.clear_cache();
        assert!(builder.cache().is_empty());

        let again = builder.convert(&free_fall()).await;
        assert!(!again.from_cache);
        assert_eq!(builder.metrics().cache_misses, 2);
    }

    #[tokio::test]
    async fn test_cycle_reports_failure() {
        let model = ProblemModel {
            system: Some(SystemSpec {
                modules: vec![
                    ModuleSpec {
                        id: "a".to_string(),
                        dependencies: vec!["b".to_string()],
                        ..Default::default()
                    },
                    ModuleSpec {
                        id: "b".to_string(),
                        dependencies: vec!["a".to_string()],
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut builder = IrBuilder::new();
        let result = builder.convert(&model).await;

        assert!(!result.success);
        assert!(result.ir.is_none());
        assert!(result.errors[0].contains("Cyclic dependency"));
        assert_eq!(builder.metrics().failures, 1);
        assert!(builder.cache().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_problem_gets_generic_module() {
        let model = ProblemModel {
            system: Some(SystemSpec {
                system_type: "mystery".to_string(),
                parameters: vec![ParameterSpec::given("foo", 1.0, "")],
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = IrBuilder::new().convert(&model).await;

        assert!(result.success);
        let ir = result.ir.unwrap();
        assert_eq!(ir.system.modules.len(), 1);
        assert_eq!(ir.system.modules[0].kind, ModuleKind::Generic);
    }
}
