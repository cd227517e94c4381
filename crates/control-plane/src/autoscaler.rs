//! Scale-up/scale-down recommendations from cluster load.

use std::sync::Mutex;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::config::ControlPlaneConfig;
use crate::node::NodeRegistry;

/// An advisory scaling recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Recommendation {
    /// Add at least `n` nodes.
    ScaleUp(u32),
    /// Remove at least `n` nodes (never below `min_nodes`).
    ScaleDown(u32),
    /// No change recommended.
    Steady,
}

/// The autoscaler's current state: consecutive over/under-watermark window
/// counts and the last-emitted recommendation.
pub struct Autoscaler {
    config: ControlPlaneConfig,
    state: Mutex<AutoscalerState>,
}

struct AutoscalerState {
    consecutive_high: u32,
    last_recommendation: Option<Recommendation>,
    acknowledged: bool,
}

impl Autoscaler {
    /// Build an autoscaler using the given thresholds.
    #[must_use]
    pub fn new(config: ControlPlaneConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AutoscalerState { consecutive_high: 0, last_recommendation: None, acknowledged: true }),
        }
    }

    /// Evaluate one window against the current cluster state and (possibly)
    /// emit a new recommendation.
    ///
    /// `SCALE_UP` fires once `cpu_high_watermark` has been exceeded for
    /// `consecutive_windows` calls in a row, with a target sized to bring
    /// the average back below the midpoint of the two watermarks.
    /// `SCALE_DOWN` fires immediately once the average drops below
    /// `cpu_low_watermark` and the cluster has more than `min_nodes` nodes,
    /// proposing to drop down to `min_nodes`.
    pub async fn evaluate(&self, nodes: &NodeRegistry) -> Recommendation {
        let healthy = nodes.list_healthy(SystemTime::now()).await;
        if healthy.is_empty() {
            return Recommendation::Steady;
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_cpu = healthy.iter().map(|n| n.metrics.cpu_load).sum::<f32>() / healthy.len() as f32;
        let node_count = healthy.len() as u32;

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let recommendation = if avg_cpu > self.config.cpu_high_watermark {
            state.consecutive_high += 1;
            if state.consecutive_high >= self.config.consecutive_windows {
                let midpoint = (self.config.cpu_high_watermark + self.config.cpu_low_watermark) / 2.0;
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let extra_needed = ((avg_cpu / midpoint.max(0.01) - 1.0) * node_count as f32).ceil().max(1.0) as u32;
                Recommendation::ScaleUp(extra_needed)
            } else {
                Recommendation::Steady
            }
        } else {
            state.consecutive_high = 0;
            if avg_cpu < self.config.cpu_low_watermark && node_count > self.config.min_nodes {
                Recommendation::ScaleDown(node_count - self.config.min_nodes)
            } else {
                Recommendation::Steady
            }
        };

        if !matches!(recommendation, Recommendation::Steady) {
            state.last_recommendation = Some(recommendation);
            state.acknowledged = false;
        }
        recommendation
    }

    /// The most recent non-`STEADY` recommendation, if any, and whether it
    /// has been acknowledged.
    #[must_use]
    pub fn status(&self) -> (Option<Recommendation>, bool) {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        (state.last_recommendation, state.acknowledged)
    }

    /// Mark the current recommendation consumed by an operator.
    pub fn acknowledge(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.acknowledged = true;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::node::{NodeId, NodeMetrics};
    use std::time::Duration;

    async fn registry_at(cpu_load: f32, count: usize) -> NodeRegistry {
        let registry = NodeRegistry::new(Duration::from_secs(30));
        for i in 0..count {
            let id = NodeId(format!("n{i}"));
            registry.register(id.clone(), format!("http://n{i}"), 10).await;
            registry.heartbeat(&id, NodeMetrics { cpu_load, ..NodeMetrics::default() }).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn scale_up_after_three_consecutive_high_windows() {
        let nodes = registry_at(0.95, 2).await;
        let scaler = Autoscaler::new(ControlPlaneConfig::default());
        assert_eq!(scaler.evaluate(&nodes).await, Recommendation::Steady);
        assert_eq!(scaler.evaluate(&nodes).await, Recommendation::Steady);
        let third = scaler.evaluate(&nodes).await;
        match third {
            Recommendation::ScaleUp(n) => assert!(n >= 1),
            other => panic!("expected ScaleUp, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scale_down_after_acknowledge_with_excess_nodes() {
        let config = ControlPlaneConfig { min_nodes: 1, ..ControlPlaneConfig::default() };
        let scaler = Autoscaler::new(config);
        let high = registry_at(0.95, 3).await;
        for _ in 0..3 {
            scaler.evaluate(&high).await;
        }
        scaler.acknowledge();
        assert!(scaler.status().1);

        let low = registry_at(0.20, 3).await;
        let recommendation = scaler.evaluate(&low).await;
        match recommendation {
            Recommendation::ScaleDown(n) => assert!(n >= 1),
            other => panic!("expected ScaleDown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scale_down_never_proposed_at_or_below_min_nodes() {
        let config = ControlPlaneConfig { min_nodes: 2, ..ControlPlaneConfig::default() };
        let scaler = Autoscaler::new(config);
        let nodes = registry_at(0.10, 2).await;
        assert_eq!(scaler.evaluate(&nodes).await, Recommendation::Steady);
    }

    #[tokio::test]
    async fn no_healthy_nodes_is_steady() {
        let scaler = Autoscaler::new(ControlPlaneConfig::default());
        let nodes = NodeRegistry::new(Duration::from_secs(30));
        assert_eq!(scaler.evaluate(&nodes).await, Recommendation::Steady);
    }
}
