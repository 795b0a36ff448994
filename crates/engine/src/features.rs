//! Best-effort feature extraction for the ranking consumer.
//!
//! Enrichment, not validation: a missing or malformed sub-field degrades to
//! a 0/1 default and is logged at debug, never surfaced as a pipeline
//! failure.

use crate::validate::credited;
use preranker_types::{Amount, DryRun, Intent, SimEvent, Solution, SolutionFeatures};
use std::collections::HashSet;

/// Event payload fields recognised as protocol fees.
const FEE_FIELDS: [&str; 4] = ["fee", "protocol_fee", "platform_fee", "fee_amount"];

/// Packages owned by the chain itself; never counted as protocols.
const SYSTEM_PACKAGES: [&str; 3] = ["0x1", "0x2", "0x3"];

/// The chain's native coin type; not a hop target.
const NATIVE_COIN: &str = "0x2::sui::SUI";

/// Extract ranking features from a passed solution and its dry run.
///
/// Pure: the same intent, solution and dry run always produce the same
/// features.
pub fn extract_features(intent: &Intent, solution: &Solution, dry_run: &DryRun) -> SolutionFeatures {
    SolutionFeatures {
        gas_cost: dry_run.gas.computation,
        protocol_fees: Amount(protocol_fees(&dry_run.events)),
        surplus: Amount(surplus(intent, dry_run)),
        total_hops: total_hops(solution, dry_run),
        protocols_count: protocols_count(solution, dry_run),
    }
}

fn parse_fee(value: &serde_json::Value) -> Option<u128> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64().map(u128::from),
        _ => None,
    }
}

fn protocol_fees(events: &[SimEvent]) -> u128 {
    let mut total = 0u128;
    for event in events {
        let Some(map) = event.data.as_object() else {
            continue;
        };
        for field in FEE_FIELDS {
            let Some(value) = map.get(field) else {
                continue;
            };
            match parse_fee(value) {
                Some(fee) => total = total.saturating_add(fee),
                None => tracing::debug!(
                    field,
                    event_type = %event.event_type,
                    "unparseable fee field, counting zero"
                ),
            }
        }
    }
    total
}

/// Credited output beyond the declared minimum for the primary output leg;
/// zero wherever either side is unresolvable.
fn surplus(intent: &Intent, dry_run: &DryRun) -> u128 {
    let Some(primary) = intent.operation.outputs.first() else {
        return 0;
    };
    let Some(min) = intent
        .constraints
        .min_outputs
        .as_ref()
        .and_then(|mins| mins.iter().find(|m| m.asset_id == primary.asset_id))
    else {
        return 0;
    };
    let Some(actual) = credited(dry_run, &intent.user_address, &primary.asset_id) else {
        return 0;
    };
    actual.saturating_sub(min.amount.0)
}

fn package_of(type_name: &str) -> Option<&str> {
    type_name.split("::").next().filter(|s| !s.is_empty())
}

/// Hop estimate: the solver's declared hop count when present, merged with
/// a balance-change-based count (distinct non-native coins minus one) and
/// an object-change-based count (distinct non-system packages touched),
/// floored at one.
fn total_hops(solution: &Solution, dry_run: &DryRun) -> u32 {
    let declared = solution
        .route
        .as_ref()
        .and_then(|route| route.hops)
        .unwrap_or(0);

    let coins: HashSet<&str> = dry_run
        .balance_changes
        .iter()
        .map(|change| change.coin_type.as_str())
        .filter(|coin| *coin != NATIVE_COIN)
        .collect();
    let balance_estimate = (coins.len() as u32).saturating_sub(1);

    let packages: HashSet<&str> = dry_run
        .object_changes
        .iter()
        .filter_map(|change| package_of(&change.object_type))
        .filter(|package| !SYSTEM_PACKAGES.contains(package))
        .collect();
    let object_estimate = packages.len() as u32;

    declared.max(balance_estimate).max(object_estimate).max(1)
}

/// Distinct non-system packages observed across the declared route, the
/// simulation events and the object changes, floored at one.
fn protocols_count(solution: &Solution, dry_run: &DryRun) -> u32 {
    let declared = solution
        .route
        .as_ref()
        .and_then(|route| route.protocols.as_deref())
        .unwrap_or(&[]);
    let packages: HashSet<&str> = dry_run
        .events
        .iter()
        .filter_map(|event| package_of(&event.event_type))
        .chain(
            dry_run
                .object_changes
                .iter()
                .filter_map(|change| package_of(&change.object_type)),
        )
        .chain(declared.iter().filter_map(|protocol| package_of(protocol)))
        .filter(|package| !SYSTEM_PACKAGES.contains(package))
        .collect();
    (packages.len() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use preranker_types::{AssetBound, Constraints, ObjectChange, RouteSummary};
    use test_utils::{dry_run_ok, intent_with_constraints, solution, USDC, USER};

    fn fee_event(event_type: &str, data: serde_json::Value) -> SimEvent {
        SimEvent {
            event_type: event_type.to_string(),
            data,
        }
    }

    #[test]
    fn gas_cost_is_the_computation_cost() {
        let intent = intent_with_constraints("i-1", 5_000, Constraints::default());
        let sol = solution("s-1", "i-1", 1_000);
        let dry_run = dry_run_ok(&[(USER, USDC, 100_000)], 1_234);
        let features = extract_features(&intent, &sol, &dry_run);
        assert_eq!(features.gas_cost, Amount(1_234));
    }

    #[test]
    fn fees_sum_across_recognised_fields() {
        let intent = intent_with_constraints("i-1", 5_000, Constraints::default());
        let mut dry_run = dry_run_ok(&[(USER, USDC, 100_000)], 1_000);
        dry_run.events = vec![
            fee_event("0xdex::pool::Swap", serde_json::json!({"fee": "30"})),
            fee_event("0xamm::pair::Trade", serde_json::json!({"protocol_fee": 12})),
            // Malformed fee degrades to zero for that field.
            fee_event("0xamm::pair::Trade", serde_json::json!({"fee_amount": [1]})),
        ];
        let features = extract_features(&intent, &solution("s-1", "i-1", 1_000), &dry_run);
        assert_eq!(features.protocol_fees, Amount(42));
    }

    #[test]
    fn surplus_needs_both_sides_resolvable() {
        let constraints = Constraints {
            min_outputs: Some(vec![AssetBound {
                asset_id: USDC.to_string(),
                amount: Amount(100_000),
            }]),
            ..Constraints::default()
        };
        let intent = intent_with_constraints("i-1", 5_000, constraints);
        let sol = solution("s-1", "i-1", 1_000);
        let dry_run = dry_run_ok(&[(USER, USDC, 101_000)], 1_000);
        assert_eq!(extract_features(&intent, &sol, &dry_run).surplus, Amount(1_000));

        // No declared minimum: surplus is zero, not an error.
        let intent = intent_with_constraints("i-1", 5_000, Constraints::default());
        assert_eq!(extract_features(&intent, &sol, &dry_run).surplus, Amount(0));
    }

    #[test]
    fn hops_and_protocols_floor_at_one() {
        let intent = intent_with_constraints("i-1", 5_000, Constraints::default());
        let dry_run = dry_run_ok(&[], 1_000);
        let features = extract_features(&intent, &solution("s-1", "i-1", 1_000), &dry_run);
        assert_eq!(features.total_hops, 1);
        assert_eq!(features.protocols_count, 1);
    }

    #[test]
    fn hops_merge_balance_and_object_estimates() {
        let intent = intent_with_constraints("i-1", 5_000, Constraints::default());
        // Three non-native coins: balance estimate 2.
        let mut dry_run = dry_run_ok(
            &[
                (USER, "0xa::usdc::USDC", 1),
                (USER, "0xb::weth::WETH", 1),
                (USER, "0xc::wbtc::WBTC", 1),
                (USER, "0x2::sui::SUI", -1),
            ],
            1_000,
        );
        // Three non-system packages touched: object estimate 3 wins.
        dry_run.object_changes = vec![
            ObjectChange {
                object_type: "0xdex::pool::Pool".to_string(),
            },
            ObjectChange {
                object_type: "0xamm::pair::Pair".to_string(),
            },
            ObjectChange {
                object_type: "0xclob::book::Book".to_string(),
            },
            ObjectChange {
                object_type: "0x2::coin::Coin".to_string(),
            },
        ];
        let features = extract_features(&intent, &solution("s-1", "i-1", 1_000), &dry_run);
        assert_eq!(features.total_hops, 3);
        assert_eq!(features.protocols_count, 3);
    }

    #[test]
    fn declared_route_feeds_hops_and_protocols() {
        let intent = intent_with_constraints("i-1", 5_000, Constraints::default());
        let mut sol = solution("s-1", "i-1", 1_000);
        sol.route = Some(RouteSummary {
            hops: Some(4),
            protocols: Some(vec!["0xdex::pool".to_string(), "0xamm".to_string()]),
        });
        // Nothing observable in the dry run; the declared route carries it.
        let dry_run = dry_run_ok(&[], 1_000);
        let features = extract_features(&intent, &sol, &dry_run);
        assert_eq!(features.total_hops, 4);
        assert_eq!(features.protocols_count, 2);
    }

    #[test]
    fn extraction_is_pure() {
        let constraints = Constraints {
            min_outputs: Some(vec![AssetBound {
                asset_id: USDC.to_string(),
                amount: Amount(100_000),
            }]),
            ..Constraints::default()
        };
        let intent = intent_with_constraints("i-1", 5_000, constraints);
        let sol = solution("s-1", "i-1", 1_000);
        let mut dry_run = dry_run_ok(&[(USER, USDC, 101_000)], 1_000);
        dry_run.events = vec![fee_event("0xdex::pool::Swap", serde_json::json!({"fee": "30"}))];
        assert_eq!(
            extract_features(&intent, &sol, &dry_run),
            extract_features(&intent, &sol, &dry_run)
        );
    }
}
