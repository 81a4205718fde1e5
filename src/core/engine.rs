use tracing::info;

use super::types::{Aggregates, Category, FundingPlan, LedgerRecord, ScenarioParameters};

const MONTHS_PER_YEAR: f64 = 12.0;

pub fn aggregate(records: &[LedgerRecord], target_equity_marker: &str) -> Aggregates {
    let mut totals = Aggregates::default();

    for record in records {
        if record.is_liability() {
            totals.total_liabilities += record.amount;
            continue;
        }
        if !record.is_asset() {
            continue;
        }

        if record.is_reserve {
            totals.reserve_cash += record.amount;
        } else {
            totals.general_assets += record.amount;
            if record.category == Category::Cash {
                totals.ordinary_cash += record.amount;
            }
        }

        if !target_equity_marker.is_empty() && record.label.contains(target_equity_marker) {
            totals.target_equity_shares += record.share_count;
        }
    }

    totals.total_assets = totals.general_assets + totals.reserve_cash;
    totals.net_worth = totals.total_assets + totals.total_liabilities;
    totals
}

/// Covers the year's expenses from dividends, a rule-based sale, ordinary cash
/// and finally reserve cash, each layer only taking what the previous ones left open.
pub fn allocate(
    aggregates: &Aggregates,
    target_equity_shares: f64,
    params: &ScenarioParameters,
) -> FundingPlan {
    let (living_cost, debt_cost) = annual_expenses(params);
    let total_expense = living_cost + debt_cost;

    let dividend_income = target_equity_shares * params.dividend_per_share;

    // Reserve cash never enters the sale base.
    let sale_ceiling = aggregates.general_assets * params.initial_withdrawal_rate;
    let sold_asset_amount = (sale_ceiling - dividend_income).max(0.0);

    let gap = total_expense - (dividend_income + sold_asset_amount);
    let (ordinary_cash_used, reserve_cash_used) = draw_cash_layers(gap, aggregates.ordinary_cash);

    let final_balance =
        (dividend_income + sold_asset_amount + ordinary_cash_used + reserve_cash_used)
            - total_expense;

    let plan = FundingPlan {
        dividend_income,
        sale_ceiling,
        sold_asset_amount,
        ordinary_cash_used,
        reserve_cash_used,
        living_cost,
        debt_cost,
        total_expense,
        final_balance,
    };

    info!(
        total_expense,
        dividend_income,
        sold_asset_amount,
        ordinary_cash_used,
        reserve_cash_used,
        final_balance,
        "allocated funding layers"
    );
    plan
}

fn annual_expenses(params: &ScenarioParameters) -> (f64, f64) {
    // Only living cost is inflated; debt service is fixed.
    let living = params.monthly_living_expense * MONTHS_PER_YEAR * (1.0 + params.inflation_rate);
    let debt = params.monthly_debt_service * MONTHS_PER_YEAR;
    (living, debt)
}

/// Returns `(ordinary, reserve)` draws for the gap left by layers 1 and 2.
/// The reserve draw is not capped at the reserve balance.
fn draw_cash_layers(gap: f64, ordinary_cash: f64) -> (f64, f64) {
    if gap <= 0.0 {
        return (0.0, 0.0);
    }

    let ordinary = gap.min(ordinary_cash).max(0.0);
    let residual = gap - ordinary;
    let reserve = if residual > 0.0 { residual } else { 0.0 };
    (ordinary, reserve)
}
