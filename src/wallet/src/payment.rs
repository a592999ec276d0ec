//! Job payment calculation (§4.6): a pure function consumed by settlement,
//! not a `Wallet` method — the wallet only ever moves funds that have
//! already been computed, it never itself decides how much a job is worth.

/// Outcome of pricing a single job settlement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaymentOutcome {
    /// The amount to deposit into the executing node's wallet.
    pub payment: f64,
    /// The portion of `payment` drawn from the reward pool (0 unless the
    /// job finished on time and a bonus was available).
    pub bonus_drawn: f64,
}

/// Lateness past which a completed job is considered "very late" rather
/// than merely late (§4.6).
pub const VERY_LATE_THRESHOLD_SECS: f64 = 60.0;

/// Prices a completed job.
///
/// - on time (`lateness_secs <= 0`): network fee is deducted, then a success
///   bonus is added, capped by whatever `available_reward_pool` still holds.
/// - late (`0 < lateness_secs < 60`): network fee deducted, then a
///   proportional penalty subtracted.
/// - very late (`lateness_secs >= 60`): payment is halved after the fee, no
///   bonus.
pub fn calculate_payment(
    base_amount: f64,
    network_fee_rate: f64,
    lateness_secs: f64,
    available_reward_pool: f64,
    success_bonus_rate: f64,
    late_penalty_rate: f64,
) -> PaymentOutcome {
    let after_fee = (base_amount - base_amount * network_fee_rate).max(0.0);

    if lateness_secs <= 0.0 {
        let bonus = (after_fee * success_bonus_rate).clamp(0.0, available_reward_pool.max(0.0));
        PaymentOutcome {
            payment: after_fee + bonus,
            bonus_drawn: bonus,
        }
    } else if lateness_secs < VERY_LATE_THRESHOLD_SECS {
        let penalty = after_fee * late_penalty_rate;
        PaymentOutcome {
            payment: (after_fee - penalty).max(0.0),
            bonus_drawn: 0.0,
        }
    } else {
        PaymentOutcome {
            payment: after_fee * 0.5,
            bonus_drawn: 0.0,
        }
    }
}
