use serde::{Deserialize, Serialize};

/// One spreadsheet cell as handed over by the row source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn display_text(&self) -> String {
        match self {
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

static BLANK_CELL: Cell = Cell::Text(String::new());

/// A spreadsheet row. Reads past the end behave as blank cells, so short rows
/// act as if padded to the four columns the classifier looks at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    cells: Vec<Cell>,
}

impl RawRow {
    pub const MIN_WIDTH: usize = 4;

    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&BLANK_CELL)
    }

    pub fn label(&self) -> String {
        self.cell(0).display_text().trim().to_string()
    }

    pub fn width(&self) -> usize {
        self.cells.len().max(Self::MIN_WIDTH)
    }
}

impl<C: Into<Cell>> FromIterator<C> for RawRow {
    fn from_iter<T: IntoIterator<Item = C>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Cash,
    ForeignEquity,
    DomesticEquity,
    Other,
    Liability,
    ReserveCash,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Section {
    Asset,
    Liability,
}

/// A typed, signed ledger line: positive amounts are assets, negative ones liabilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub label: String,
    pub category: Category,
    pub amount: f64,
    pub share_count: f64,
    pub is_reserve: bool,
}

impl LedgerRecord {
    pub fn is_asset(&self) -> bool {
        self.amount > 0.0
    }

    pub fn is_liability(&self) -> bool {
        self.amount < 0.0
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FlagReason {
    /// A value column held text that is not a number; it was read as 0.
    UnparseableCell { column: usize },
    /// The resolved asset amount was zero or negative, so no record was emitted.
    NonPositiveAsset,
    /// An equity row with an empty money column: the second column was taken
    /// as the amount and no share count was recorded.
    AmountWithoutShareCount,
    /// An equity row with a filled money column but no share count, so it
    /// contributes no dividend shares.
    ShareCountMissing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFlag {
    pub row: usize,
    pub label: String,
    pub reason: FlagReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub records: Vec<LedgerRecord>,
    pub flags: Vec<RowFlag>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub general_assets: f64,
    pub reserve_cash: f64,
    pub ordinary_cash: f64,
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub net_worth: f64,
    pub target_equity_shares: f64,
}

/// Scenario assumptions for one allocation run. Rates are fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioParameters {
    pub dividend_per_share: f64,
    pub initial_withdrawal_rate: f64,
    pub inflation_rate: f64,
    pub monthly_living_expense: f64,
    pub monthly_debt_service: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingPlan {
    pub dividend_income: f64,
    pub sale_ceiling: f64,
    pub sold_asset_amount: f64,
    pub ordinary_cash_used: f64,
    pub reserve_cash_used: f64,
    pub living_cost: f64,
    pub debt_cost: f64,
    pub total_expense: f64,
    pub final_balance: f64,
}

impl FundingPlan {
    pub fn funds_available(&self) -> f64 {
        self.dividend_income + self.sold_asset_amount + self.ordinary_cash_used + self.reserve_cash_used
    }

    pub fn is_funded_without_reserve(&self) -> bool {
        self.reserve_cash_used <= 0.0
    }

    /// Portion of the reserve draw that the reserve balance cannot actually cover.
    pub fn unfunded_reserve_shortfall(&self, reserve_cash: f64) -> f64 {
        (self.reserve_cash_used - reserve_cash).max(0.0)
    }

    /// Years the reserve lasts at this year's draw; `None` when the reserve is untouched.
    pub fn reserve_runway_years(&self, reserve_cash: f64) -> Option<f64> {
        if self.reserve_cash_used > 0.0 {
            Some(reserve_cash / self.reserve_cash_used)
        } else {
            None
        }
    }
}
