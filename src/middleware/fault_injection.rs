//! Chaos middleware: rejects a share of requests at random.
//!
//! The middleware is installed as a route layer, so it sees only requests
//! that matched a route and runs before the handler. Each non-exempt
//! request draws a uniform integer in `1..=100`; a draw strictly below the
//! threshold rejects the request with `400 Chaos got your request` and the
//! handler never runs.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ServiceError;
use crate::telemetry::TraceSegment;

/// Fault injection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaosSettings {
    /// Master switch.
    pub enabled: bool,
    /// Draws strictly below this value reject the request.
    pub threshold: u32,
    /// Paths containing this substring are never rejected. Empty exempts
    /// nothing.
    pub exempt_marker: String,
    /// Fixed generator seed; OS entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for ChaosSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 20,
            exempt_marker: "init".to_string(),
            seed: None,
        }
    }
}

/// Decides which requests to reject.
///
/// The generator is shared by every worker; the lock is held for a single
/// draw. With a fixed seed the sequence of draws is reproducible, but under
/// concurrency the assignment of draws to requests is not.
#[derive(Debug)]
pub struct FaultInjector {
    settings: ChaosSettings,
    rng: Mutex<StdRng>,
}

impl FaultInjector {
    /// Creates an injector, seeding its generator from `settings.seed`.
    #[must_use]
    pub fn new(settings: ChaosSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            settings,
            rng: Mutex::new(rng),
        }
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &ChaosSettings {
        &self.settings
    }

    /// Returns `true` if requests to `path` are never rejected.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        let marker = self.settings.exempt_marker.as_str();
        !marker.is_empty() && path.contains(marker)
    }

    /// Draws the next uniform integer in `1..=100`.
    pub fn draw(&self) -> u32 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(1..=100)
    }

    /// Decides the fate of one request to `path`.
    ///
    /// Exempt paths and a disabled injector consume no draw.
    pub fn should_reject(&self, path: &str) -> bool {
        if !self.settings.enabled || self.is_exempt(path) {
            return false;
        }
        self.draw() < self.settings.threshold
    }
}

/// Rejects the request when the injector says so.
///
/// A rejected request is annotated `fault_injected = true` on its trace
/// segment and logged on the `chaos` target, apart from genuine failures.
pub async fn inject_faults(
    State(injector): State<Arc<FaultInjector>>,
    req: Request,
    next: Next,
) -> Response {
    if injector.should_reject(req.uri().path()) {
        if let Some(segment) = req.extensions().get::<TraceSegment>() {
            segment.put_annotation("fault_injected", true);
        }
        tracing::info!(
            target: "chaos",
            method = %req.method(),
            path = %req.uri().path(),
            threshold = injector.settings().threshold,
            "request rejected by fault injection"
        );
        return ServiceError::ChaosInjected.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injector(threshold: u32, seed: u64) -> FaultInjector {
        FaultInjector::new(ChaosSettings {
            threshold,
            seed: Some(seed),
            ..ChaosSettings::default()
        })
    }

    #[test]
    fn same_seed_gives_same_sequence() {
        let a = injector(20, 17);
        let b = injector(20, 17);
        let first: Vec<u32> = (0..50).map(|_| a.draw()).collect();
        let second: Vec<u32> = (0..50).map(|_| b.draw()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn draws_stay_within_one_to_hundred() {
        let chaos = injector(20, 17);
        for _ in 0..10_000 {
            let draw = chaos.draw();
            assert!((1..=100).contains(&draw));
        }
    }

    #[test]
    fn init_paths_are_exempt() {
        let chaos = injector(101, 17);
        assert!(!chaos.should_reject("/init"));
        assert!(chaos.should_reject("/posts"));
        assert!(chaos.should_reject("/"));
    }

    #[test]
    fn empty_marker_exempts_nothing() {
        let chaos = FaultInjector::new(ChaosSettings {
            threshold: 101,
            exempt_marker: String::new(),
            seed: Some(17),
            ..ChaosSettings::default()
        });
        assert!(chaos.should_reject("/init"));
    }

    #[test]
    fn threshold_bounds() {
        let never = injector(0, 17);
        let always = injector(101, 17);
        let one = injector(1, 17);
        for _ in 0..1_000 {
            assert!(!never.should_reject("/posts"));
            assert!(always.should_reject("/posts"));
            assert!(!one.should_reject("/posts"));
        }
    }

    #[test]
    fn disabled_injector_never_rejects() {
        let chaos = FaultInjector::new(ChaosSettings {
            enabled: false,
            threshold: 101,
            seed: Some(17),
            ..ChaosSettings::default()
        });
        assert!(!chaos.should_reject("/posts"));
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn rejection_rate_converges_to_threshold() {
        // Draws 1..=19 reject, so the expected rate is 19%.
        let chaos = injector(20, 17);
        let samples = 100_000;
        let rejected = (0..samples).filter(|_| chaos.should_reject("/posts")).count();
        let rate = rejected as f64 / f64::from(samples);
        assert!((rate - 0.19).abs() < 0.01, "observed rate {rate}");
    }
}
