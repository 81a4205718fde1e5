mod classifier;
mod engine;
mod types;

pub use classifier::{
    CATEGORY_RULES, CategoryRule, DEFAULT_DIVIDEND_EQUITY, categorize, classify,
    classify_with_flags, parse_amount, try_parse_amount,
};
pub use engine::{aggregate, allocate};
pub use types::{
    Aggregates, Category, Cell, Classification, FlagReason, FundingPlan, LedgerRecord, RawRow,
    RowFlag, ScenarioParameters,
};
