//! Constraint validation, split into two pure phases.
//!
//! Phase 1 runs before simulation and checks everything derivable from the
//! solution body alone: the window deadline, declared input caps and
//! declared routing. Where the solver did not declare a field, the
//! corresponding check is skipped rather than failed; the post-simulation
//! phase observes actual behaviour.
//!
//! Phase 2 runs on the dry-run result and checks credited outputs,
//! slippage, gas and the limit price.
//!
//! Both phases return a [`ValidationReport`]; a report is ok iff it holds
//! no error-severity findings. Warnings are carried in fail records but
//! never reject a solution.

use preranker_types::{
    DryRun, Intent, LimitPrice, PriceComparison, Solution, ValidationReport,
};


/// Pre-simulation validation of a solution against its intent.
pub fn validate_pre_simulation(
    intent: &Intent,
    solution: &Solution,
    submitted_at_ms: u64,
    window_end_ms: u64,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if submitted_at_ms > window_end_ms {
        report.error(
            "constraints.deadline_ms",
            format!(
                "submitted at {submitted_at_ms}, after the solver window closed at {window_end_ms}"
            ),
        );
    }

    let constraints = &intent.constraints;

    if let (Some(caps), Some(declared)) = (&constraints.max_inputs, &solution.declared_inputs) {
        for cap in caps {
            let Some(input) = declared.iter().find(|i| i.asset_id == cap.asset_id) else {
                continue;
            };
            if input.amount > cap.amount {
                report.error(
                    "constraints.max_inputs",
                    format!(
                        "input {} of {} exceeds the cap of {}",
                        input.amount, cap.asset_id, cap.amount
                    ),
                );
            }
        }
    }

    if let Some(routing) = &constraints.routing {
        let route = solution.route.as_ref();
        if let (Some(max_hops), Some(hops)) = (routing.max_hops, route.and_then(|r| r.hops)) {
            if hops > max_hops {
                report.error(
                    "constraints.routing.max_hops",
                    format!("route takes {hops} hops, more than the allowed {max_hops}"),
                );
            }
        }
        let protocols = route.and_then(|r| r.protocols.as_deref());
        if let (Some(blacklist), Some(protocols)) = (&routing.blacklist, protocols) {
            for protocol in protocols {
                if blacklist.contains(protocol) {
                    report.error(
                        "constraints.routing.blacklist",
                        format!("route touches blacklisted protocol {protocol}"),
                    );
                }
            }
        }
        if let (Some(whitelist), Some(protocols)) = (&routing.whitelist, protocols) {
            if !whitelist.is_empty() {
                for protocol in protocols {
                    if !whitelist.contains(protocol) {
                        report.error(
                            "constraints.routing.whitelist",
                            format!("route touches non-whitelisted protocol {protocol}"),
                        );
                    }
                }
            }
        }
    }

    report
}

/// Post-simulation validation of a dry-run result against the intent.
pub fn validate_post_simulation(intent: &Intent, dry_run: &DryRun) -> ValidationReport {
    let mut report = ValidationReport::default();
    let constraints = &intent.constraints;
    let user = &intent.user_address;

    if let Some(mins) = &constraints.min_outputs {
        for min in mins {
            match credited(dry_run, user, &min.asset_id) {
                None => report.error(
                    "constraints.min_outputs",
                    format!("nothing of {} credited to the user", min.asset_id),
                ),
                Some(actual) if actual < min.amount.0 => report.error(
                    "constraints.min_outputs",
                    format!(
                        "credited {actual} of {}, below the minimum {}",
                        min.asset_id, min.amount
                    ),
                ),
                Some(_) => {}
            }
        }
    }

    if let (Some(max_bps), Some(expected_outputs)) = (
        constraints.max_slippage_bps,
        &intent.operation.expected_outputs,
    ) {
        for expected in expected_outputs {
            let Some(expected_amount) = expected.exact().map(|a| a.0).filter(|a| *a > 0) else {
                continue;
            };
            let actual = credited(dry_run, user, &expected.asset_id).unwrap_or(0);
            let bps = slippage_bps(expected_amount, actual);
            if bps > i128::from(max_bps) {
                report.error(
                    "constraints.max_slippage_bps",
                    format!(
                        "slippage of {bps} bps on {} exceeds the allowed {max_bps} bps",
                        expected.asset_id
                    ),
                );
            }
        }
    }

    if let Some(max_gas) = constraints.max_gas_cost {
        let total = dry_run.gas.total();
        if total > max_gas.0 {
            report.error(
                "constraints.max_gas_cost",
                format!("total gas {total} exceeds the cap {max_gas}"),
            );
        }
    }

    if let Some(limit) = &constraints.limit_price {
        check_limit_price(intent, dry_run, limit, &mut report);
    }

    report
}

/// Realised slippage in basis points. Negative when the user received more
/// than expected; negative slippage never fails a solution.
pub(crate) fn slippage_bps(expected: u128, actual: u128) -> i128 {
    let expected = i128::try_from(expected).unwrap_or(i128::MAX);
    let actual = i128::try_from(actual).unwrap_or(i128::MAX);
    (expected - actual).saturating_mul(10_000) / expected
}

/// Total of positive balance changes of `asset` credited to `owner`.
/// `None` when no such credit appears at all.
pub(crate) fn credited(dry_run: &DryRun, owner: &str, asset: &str) -> Option<u128> {
    let mut total: Option<u128> = None;
    for change in &dry_run.balance_changes {
        if change.owner == owner && change.coin_type == asset && change.amount.0 > 0 {
            total = Some(total.unwrap_or(0).saturating_add(change.amount.0 as u128));
        }
    }
    total
}

/// Total magnitude of negative balance changes of `asset` debited from
/// `owner`. `None` when no such debit appears.
pub(crate) fn debited(dry_run: &DryRun, owner: &str, asset: &str) -> Option<u128> {
    let mut total: Option<u128> = None;
    for change in &dry_run.balance_changes {
        if change.owner == owner && change.coin_type == asset && change.amount.0 < 0 {
            total = Some(
                total
                    .unwrap_or(0)
                    .saturating_add(change.amount.0.unsigned_abs()),
            );
        }
    }
    total
}

fn check_limit_price(
    intent: &Intent,
    dry_run: &DryRun,
    limit: &LimitPrice,
    report: &mut ValidationReport,
) {
    const FIELD: &str = "constraints.limit_price";

    let Some(input) = intent.operation.inputs.first() else {
        report.warning(FIELD, "intent has no input leg, skipping limit price");
        return;
    };
    let Some(output) = intent.operation.outputs.first() else {
        report.warning(FIELD, "intent has no output leg, skipping limit price");
        return;
    };

    // Prefer the executed input observed in the simulation; fall back to
    // the intent's declared exact input.
    let input_amount = debited(dry_run, &intent.user_address, &input.asset_id)
        .or_else(|| input.exact().map(|a| a.0));
    let Some(input_amount) = input_amount.filter(|a| *a > 0) else {
        report.warning(FIELD, "executed input amount is not determinable, skipping");
        return;
    };
    let Some(output_amount) =
        credited(dry_run, &intent.user_address, &output.asset_id).filter(|a| *a > 0)
    else {
        report.warning(FIELD, "credited output amount is not determinable, skipping");
        return;
    };

    let in_norm = input_amount as f64 / 10f64.powi(i32::from(input.decimals.unwrap_or(0)));
    let out_norm = output_amount as f64 / 10f64.powi(i32::from(output.decimals.unwrap_or(0)));

    let realised = if limit.price_asset == input.asset_id {
        in_norm / out_norm
    } else if limit.price_asset == output.asset_id {
        out_norm / in_norm
    } else {
        report.warning(
            FIELD,
            format!(
                "price asset {} is neither the input nor the output asset, skipping",
                limit.price_asset
            ),
        );
        return;
    };

    match limit.comparison {
        PriceComparison::Gte if realised < limit.price => report.error(
            FIELD,
            format!(
                "realised price {realised} is below the limit {}",
                limit.price
            ),
        ),
        PriceComparison::Lte if realised > limit.price => report.error(
            FIELD,
            format!(
                "realised price {realised} is above the limit {}",
                limit.price
            ),
        ),
        _ => {}
    }
}
