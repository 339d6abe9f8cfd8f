//! Iteration policy: the deterministic relax/tighten decision and the
//! constraint mutation it implies. Pure functions with no PRNG and no I/O.

use crate::config::PolicyConfig;
use crate::schema::{Adjustment, ConstraintsSpec, Decision, PolicyMode, ValidationSummary};
use serde_json::Value;

const DEFAULT_RELAX_ACTION: &str = "widen_lattice";
const DEFAULT_TIGHTEN_ACTION: &str = "increase_min_distance_scale";

/// Feasibility-shaped failures (density, charge, symmetry) push toward
/// relaxing; geometry-shaped failures (distance, coordination) push toward
/// tightening. Ties relax.
pub fn decide(summary: &ValidationSummary, policy: &PolicyConfig, iteration: u32) -> Decision {
    let failed = |name: &str| -> u32 {
        summary.failure_histogram.get(name).copied().unwrap_or(0)
    };
    let relax_pressure =
        failed("density_in_range") + failed("charge_neutrality_feasible") + failed("symmetry_match");
    let tighten_pressure = failed("min_distance") + failed("coordination_reasonable");

    let (mode, order, fallback) = if relax_pressure >= tighten_pressure {
        (PolicyMode::Relax, &policy.relax_order, DEFAULT_RELAX_ACTION)
    } else {
        (PolicyMode::Tighten, &policy.tighten_order, DEFAULT_TIGHTEN_ACTION)
    };
    let action = if order.is_empty() {
        fallback.to_string()
    } else {
        order[iteration as usize % order.len()].clone()
    };
    Decision { mode, action }
}

/// Records the decision in the append-only adjustment history and applies
/// the action's effect. Unknown actions only append.
pub fn apply(mut constraints: ConstraintsSpec, decision: &Decision, iteration: u32) -> ConstraintsSpec {
    constraints.adjustments.push(Adjustment {
        iteration,
        mode: decision.mode,
        action: decision.action.clone(),
    });

    match decision.action.as_str() {
        "widen_lattice" => {
            let [lo, hi] = constraints.priors.density_range;
            constraints.priors.density_range = [(lo * 0.9).max(0.1), hi * 1.1];
        }
        "narrow_density" => {
            let [lo, hi] = constraints.priors.density_range;
            constraints.priors.density_range = [lo * 1.05, (lo * 1.1).max(hi * 0.95)];
        }
        "increase_max_atoms" => {
            let bumped = match constraints.overrides.get("max_atoms") {
                Some(value) if value.is_i64() => {
                    Value::from(value.as_i64().unwrap_or(0) + 5)
                }
                Some(value) if value.is_f64() => {
                    Value::from(value.as_f64().unwrap_or(0.0) + 5.0)
                }
                _ => Value::from(150),
            };
            constraints.overrides.insert("max_atoms".to_string(), bumped);
        }
        "increase_min_distance_scale" => {
            let scale = constraints
                .overrides
                .get("min_distance_scale")
                .and_then(Value::as_f64)
                .map(|existing| existing + 0.05)
                .unwrap_or(1.05);
            constraints
                .overrides
                .insert("min_distance_scale".to_string(), Value::from(scale));
        }
        "expand_prototypes" => {
            constraints.priors.prototypes.push("proto_extra".to_string());
        }
        "restrict_prototypes" => {
            if constraints.priors.prototypes.len() > 1 {
                constraints.priors.prototypes.pop();
            }
        }
        _ => {}
    }
    constraints
}
