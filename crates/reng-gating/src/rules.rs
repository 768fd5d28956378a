use chrono::Utc;
use reng_types::{
    gating::{Candidate, CooldownScope, GatingCode, GatingRejection, GatingWorldView},
    EngineConfig,
};
use rust_decimal::Decimal;

type RuleResult = Result<(), GatingRejection>;

fn reject(code: GatingCode, source: &str) -> RuleResult {
    Err(GatingRejection::new(code, source))
}

/// Rule 1: positive, finite prices and leverage (spec §4.4 rule 1).
pub fn schema_validation(candidate: &Candidate, _world: &GatingWorldView, _cfg: &EngineConfig) -> RuleResult {
    let checks: &[(&str, Decimal)] = &[
        ("entry_price", candidate.entry_price),
        ("current_price", candidate.current_price),
        ("leverage", candidate.leverage),
    ];
    for (field, value) in checks {
        if *value <= Decimal::ZERO {
            return reject(
                GatingCode::InvalidRequestBody {
                    field: field.to_string(),
                    message: format!("{field} must be positive, got {value}"),
                },
                "schema_validation",
            );
        }
    }
    Ok(())
}

fn cooldown_check(
    last: Option<chrono::DateTime<Utc>>,
    window_ms: i64,
    code_of: impl Fn(i64, chrono::DateTime<Utc>) -> GatingCode,
) -> RuleResult {
    let Some(last) = last else { return Ok(()) };
    let elapsed_ms = (Utc::now() - last).num_milliseconds();
    if elapsed_ms < window_ms {
        let remaining_ms = window_ms - elapsed_ms;
        let next_available_at = last + chrono::Duration::milliseconds(window_ms);
        return Err(GatingRejection::new(code_of(remaining_ms, next_available_at), "cooldown"));
    }
    Ok(())
}

/// Rule 2: four cooldown scopes, opt-out via `bypass_cooldown` (spec §4.4
/// rule 2).
pub fn cooldown(candidate: &Candidate, world: &GatingWorldView, cfg: &EngineConfig) -> RuleResult {
    if candidate.bypass_cooldown {
        return Ok(());
    }

    cooldown_check(
        world.same_direction_last_created_at,
        cfg.cooldown_same_direction_ms,
        |remaining_ms, next_available_at| GatingCode::CooldownSameDirection {
            remaining_ms,
            next_available_at,
        },
    )?;

    cooldown_check(
        world.opposite_last_created_at,
        cfg.cooldown_opposite_ms,
        |remaining_ms, next_available_at| GatingCode::CooldownOpposite {
            remaining_ms,
            next_available_at,
        },
    )?;

    cooldown_check(
        world.global_last_created_at,
        cfg.cooldown_global_ms,
        |remaining_ms, next_available_at| GatingCode::CooldownGlobal {
            remaining_ms,
            next_available_at,
        },
    )?;

    if world.hourly_total_count >= cfg.hourly_cap_total {
        return reject(
            GatingCode::HourlyCap {
                scope: CooldownScope::Total,
                cap: cfg.hourly_cap_total,
                current_count: world.hourly_total_count,
                next_available_at: Utc::now() + chrono::Duration::hours(1),
            },
            "cooldown",
        );
    }
    if world.hourly_per_direction_count >= cfg.hourly_cap_per_direction {
        return reject(
            GatingCode::HourlyCap {
                scope: CooldownScope::PerDirection,
                cap: cfg.hourly_cap_per_direction,
                current_count: world.hourly_per_direction_count,
                next_available_at: Utc::now() + chrono::Duration::hours(1),
            },
            "cooldown",
        );
    }

    Ok(())
}

/// Rule 3: reject if an active/recent same `(symbol, direction,
/// strategy_type)` recommendation exists within `duplicate_bps_threshold`
/// of the candidate's entry price (spec §4.4 rule 3).
pub fn duplicate_suppression(candidate: &Candidate, world: &GatingWorldView, cfg: &EngineConfig) -> RuleResult {
    if world.duplicate_candidates.is_empty() {
        return Ok(());
    }

    let threshold = Decimal::from(cfg.duplicate_bps_threshold);
    let matched: Vec<String> = world
        .duplicate_candidates
        .iter()
        .filter(|(_, entry_price, _)| {
            if entry_price.is_zero() {
                return false;
            }
            let diff_bps = ((candidate.entry_price - entry_price).abs() / entry_price) * Decimal::from(10_000);
            diff_bps <= threshold
        })
        .map(|(id, _, _)| id.clone())
        .collect();

    if matched.is_empty() {
        return Ok(());
    }

    reject(
        GatingCode::DuplicateRecommendation {
            matched_ids: matched,
            window_minutes: cfg.duplicate_window_minutes,
            bps_threshold: cfg.duplicate_bps_threshold,
        },
        "duplicate_suppression",
    )
}

/// Rule 4: multi-timeframe agreement, enforced only when
/// `require_mtf_agreement` is on (spec §4.4 rule 4).
pub fn mtf_consistency(candidate: &Candidate, _world: &GatingWorldView, cfg: &EngineConfig) -> RuleResult {
    if !cfg.require_mtf_agreement {
        return Ok(());
    }

    let agreement = candidate.mtf_agreement.unwrap_or(0.0);
    let agrees = agreement >= cfg.min_mtf_agreement
        && candidate.mtf_dominant_direction == Some(candidate.direction);

    if agrees {
        return Ok(());
    }

    reject(
        GatingCode::MtfConsistency {
            agreement,
            dominant_direction: candidate.mtf_dominant_direction,
        },
        "mtf_consistency",
    )
}

/// Rule 5: require higher confidence to open against an existing opposing
/// position (spec §4.4 rule 5).
pub fn opposite_direction_constraint(candidate: &Candidate, world: &GatingWorldView, cfg: &EngineConfig) -> RuleResult {
    if world.opposite_active_count == 0 {
        return Ok(());
    }
    if candidate.confidence >= cfg.opposite_min_confidence {
        return Ok(());
    }
    reject(
        GatingCode::OppositeConstraint {
            opposite_active_count: world.opposite_active_count,
        },
        "opposite_direction_constraint",
    )
}

/// Rule 6: total and per-direction active-position caps (spec §4.4 rule 6).
pub fn exposure_caps(_candidate: &Candidate, world: &GatingWorldView, cfg: &EngineConfig) -> RuleResult {
    if world.total_active_count + 1 > cfg.exposure_cap_total {
        return reject(
            GatingCode::ExposureCap {
                total_cap: cfg.exposure_cap_total,
                dir_cap: cfg.exposure_cap_per_direction,
                current_total: world.total_active_count,
                current_direction: world.direction_active_count,
                adding: 1,
            },
            "exposure_caps",
        );
    }
    if world.direction_active_count + 1 > cfg.exposure_cap_per_direction {
        return reject(
            GatingCode::ExposureCap {
                total_cap: cfg.exposure_cap_total,
                dir_cap: cfg.exposure_cap_per_direction,
                current_total: world.total_active_count,
                current_direction: world.direction_active_count,
                adding: 1,
            },
            "exposure_caps",
        );
    }
    Ok(())
}

/// The fixed rule order named in spec §4.4: evaluation stops at first
/// failure.
pub const RULES: &[fn(&Candidate, &GatingWorldView, &EngineConfig) -> RuleResult] = &[
    schema_validation,
    cooldown,
    duplicate_suppression,
    mtf_consistency,
    opposite_direction_constraint,
    exposure_caps,
];
