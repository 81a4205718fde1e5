use tracing::{debug, info};

use super::types::{
    Category, Cell, Classification, FlagReason, LedgerRecord, RawRow, RowFlag, Section,
};

/// Header cell of the item column.
pub const HEADER_TOKEN: &str = "項目";

/// Rows carrying any of these are the sheet's own totals, net worth or FX lines.
pub const EXCLUSION_MARKERS: &[&str] = &["合計", "淨值", "匯率"];

pub const OFFSET_MARKER: &str = "抵利型";
pub const CASH_MARKER: &str = "現金";
pub const MORTGAGE_MARKER: &str = "房貸";

/// Mortgage, unsecured loan, borrowing.
pub const LIABILITY_MARKERS: &[&str] = &["房貸", "信貸", "借款"];

pub const DEFAULT_DIVIDEND_EQUITY: &str = "鴻海";

const AMOUNT_COLUMN: usize = 1;
const MONEY_COLUMN: usize = 3;
const CURRENCY_PREFIXES: &[&str] = &["NT$", "US$", "$"];

#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub category: Category,
    pub markers: &'static [&'static str],
}

impl CategoryRule {
    pub fn matches(&self, label: &str) -> bool {
        self.markers.iter().any(|marker| label.contains(marker))
    }
}

/// Asset category rules, evaluated top to bottom; the first match wins.
pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: Category::Cash,
        markers: &["現金", "口袋", "活存", "e財庫"],
    },
    CategoryRule {
        category: Category::ForeignEquity,
        markers: &["美股", "VT", "VOO"],
    },
    CategoryRule {
        category: Category::DomesticEquity,
        markers: &["鴻海", "0050", "台股"],
    },
];

pub fn categorize(label: &str) -> Category {
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.matches(label))
        .map_or(Category::Other, |rule| rule.category)
}

/// Lenient numeric read of a cell. Blank or unparseable text reads as 0.
pub fn parse_amount(cell: &Cell) -> f64 {
    try_parse_amount(cell).unwrap_or(0.0)
}

/// Like [`parse_amount`] but returns `None` for non-blank text that is not a number.
pub fn try_parse_amount(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(v) => v.is_finite().then_some(*v),
        Cell::Text(raw) => {
            let mut cleaned = raw.replace([',', '%'], "");
            for prefix in CURRENCY_PREFIXES {
                cleaned = cleaned.replace(prefix, "");
            }
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                return Some(0.0);
            }
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
    }
}

pub fn is_excluded_label(label: &str) -> bool {
    label.is_empty()
        || label == HEADER_TOKEN
        || EXCLUSION_MARKERS.iter().any(|marker| label.contains(marker))
}

pub fn is_reserve_label(label: &str) -> bool {
    label.contains(OFFSET_MARKER) && label.contains(CASH_MARKER) && !label.contains(MORTGAGE_MARKER)
}

pub fn starts_liability_section(label: &str) -> bool {
    LIABILITY_MARKERS.iter().any(|marker| label.contains(marker)) && !label.contains(OFFSET_MARKER)
}

pub fn classify(rows: &[RawRow]) -> Vec<LedgerRecord> {
    classify_with_flags(rows).records
}

pub fn classify_with_flags(rows: &[RawRow]) -> Classification {
    let folded = rows
        .iter()
        .enumerate()
        .fold(Accumulator::new(), |acc, (index, row)| acc.consume(index, row));

    for flag in &folded.flags {
        debug!(row = flag.row, label = %flag.label, reason = ?flag.reason, "flagged spreadsheet row");
    }
    info!(
        rows = rows.len(),
        records = folded.records.len(),
        flags = folded.flags.len(),
        "classified ledger rows"
    );

    Classification {
        records: folded.records,
        flags: folded.flags,
    }
}

struct Accumulator {
    section: Section,
    records: Vec<LedgerRecord>,
    flags: Vec<RowFlag>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            section: Section::Asset,
            records: Vec::new(),
            flags: Vec::new(),
        }
    }

    fn consume(mut self, index: usize, row: &RawRow) -> Self {
        let label = row.label();
        if is_excluded_label(&label) {
            return self;
        }

        let val_a = self.read_value(index, &label, row, AMOUNT_COLUMN);

        if is_reserve_label(&label) {
            let val_c = self.read_value(index, &label, row, MONEY_COLUMN);
            let amount = val_a.max(val_c);
            if amount > 0.0 {
                self.records.push(LedgerRecord {
                    label,
                    category: Category::ReserveCash,
                    amount,
                    share_count: 0.0,
                    is_reserve: true,
                });
            } else {
                self.flag(index, label, FlagReason::NonPositiveAsset);
            }
            return self;
        }

        if starts_liability_section(&label) {
            self.section = Section::Liability;
        }

        match self.section {
            Section::Asset => {
                let val_c = self.read_value(index, &label, row, MONEY_COLUMN);
                self.push_asset(index, label, val_a, val_c);
            }
            Section::Liability => {
                if val_a > 0.0 {
                    self.records.push(LedgerRecord {
                        label,
                        category: Category::Liability,
                        amount: -val_a,
                        share_count: 0.0,
                        is_reserve: false,
                    });
                }
            }
        }
        self
    }

    fn push_asset(&mut self, index: usize, label: String, val_a: f64, val_c: f64) {
        let money_column_filled = val_c > 0.0;
        let amount = if money_column_filled { val_c } else { val_a };
        let share_count = if money_column_filled { val_a } else { 0.0 };

        if amount <= 0.0 {
            self.flag(index, label, FlagReason::NonPositiveAsset);
            return;
        }

        let category = categorize(&label);
        if matches!(category, Category::ForeignEquity | Category::DomesticEquity) {
            if !money_column_filled {
                self.flag(index, label.clone(), FlagReason::AmountWithoutShareCount);
            } else if share_count <= 0.0 {
                self.flag(index, label.clone(), FlagReason::ShareCountMissing);
            }
        }

        self.records.push(LedgerRecord {
            label,
            category,
            amount,
            share_count,
            is_reserve: false,
        });
    }

    fn read_value(&mut self, index: usize, label: &str, row: &RawRow, column: usize) -> f64 {
        let cell = row.cell(column);
        match try_parse_amount(cell) {
            Some(v) => v,
            None => {
                self.flag(index, label.to_string(), FlagReason::UnparseableCell { column });
                0.0
            }
        }
    }

    fn flag(&mut self, row: usize, label: String, reason: FlagReason) {
        self.flags.push(RowFlag { row, label, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop, prop_assert, prop_assert_eq, proptest};

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().copied().collect()
    }

    fn household_sheet() -> Vec<RawRow> {
        vec![
            row(&["項目", "股數/金額", "股價", "市值"]),
            row(&["鴻海", "2,000", "150", "300,000"]),
            row(&["VT 美股", "100", "110", "NT$352,000"]),
            row(&["0050", "1000", "", ""]),
            row(&["口袋現金", "50,000"]),
            row(&["抵利型帳戶 現金", "200,000", "", ""]),
            row(&["資產合計", "", "", "902,000"]),
            row(&["美元匯率", "32"]),
            row(&["房貸", "", "", ""]),
            row(&["抵利型房貸", "3,000,000"]),
            row(&["信貸", "400,000"]),
            row(&["合計", "", "", "999999"]),
            row(&["淨值", "", "", "-2,298,000"]),
        ]
    }

    #[test]
    fn parse_amount_strips_separators_currency_and_percent() {
        assert_eq!(parse_amount(&Cell::text("1,234,567")), 1_234_567.0);
        assert_eq!(parse_amount(&Cell::text(" NT$12,000 ")), 12_000.0);
        assert_eq!(parse_amount(&Cell::text("$99.5")), 99.5);
        assert_eq!(parse_amount(&Cell::text("4.5%")), 4.5);
        assert_eq!(parse_amount(&Cell::Number(42.0)), 42.0);
    }

    #[test]
    fn parse_amount_degrades_blank_and_garbage_to_zero() {
        assert_eq!(parse_amount(&Cell::text("")), 0.0);
        assert_eq!(parse_amount(&Cell::text("   ")), 0.0);
        assert_eq!(parse_amount(&Cell::text("n/a")), 0.0);
        assert_eq!(parse_amount(&Cell::text("NaN")), 0.0);
        assert_eq!(parse_amount(&Cell::Number(f64::INFINITY)), 0.0);
        assert_eq!(try_parse_amount(&Cell::text("n/a")), None);
        assert_eq!(try_parse_amount(&Cell::text("")), Some(0.0));
    }

    #[test]
    fn category_rules_resolve_overlaps_by_precedence() {
        assert_eq!(categorize("美股現金"), Category::Cash);
        assert_eq!(categorize("VT 台股"), Category::ForeignEquity);
        assert_eq!(categorize("鴻海"), Category::DomesticEquity);
        assert_eq!(categorize("黃金"), Category::Other);
        assert_eq!(CATEGORY_RULES[0].category, Category::Cash);
    }

    #[test]
    fn classify_household_sheet() {
        let out = classify_with_flags(&household_sheet());
        let labels: Vec<&str> = out.records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["鴻海", "VT 美股", "0050", "口袋現金", "抵利型帳戶 現金", "抵利型房貸", "信貸"]
        );

        let honhai = &out.records[0];
        assert_eq!(honhai.category, Category::DomesticEquity);
        assert_eq!(honhai.amount, 300_000.0);
        assert_eq!(honhai.share_count, 2_000.0);

        assert_eq!(out.records[1].category, Category::ForeignEquity);
        assert_eq!(out.records[1].amount, 352_000.0);

        let etf = &out.records[2];
        assert_eq!(etf.amount, 1_000.0);
        assert_eq!(etf.share_count, 0.0);

        let cash = &out.records[3];
        assert_eq!(cash.category, Category::Cash);
        assert_eq!(cash.amount, 50_000.0);
        assert!(!cash.is_reserve);

        let reserve = &out.records[4];
        assert_eq!(reserve.category, Category::ReserveCash);
        assert!(reserve.is_reserve);
        assert_eq!(reserve.amount, 200_000.0);

        assert_eq!(out.records[5].category, Category::Liability);
        assert_eq!(out.records[5].amount, -3_000_000.0);
        assert_eq!(out.records[6].amount, -400_000.0);

        assert_eq!(
            out.flags,
            vec![RowFlag {
                row: 3,
                label: "0050".to_string(),
                reason: FlagReason::AmountWithoutShareCount,
            }]
        );
    }

    #[test]
    fn reserve_row_wins_even_inside_liability_section() {
        let rows = vec![
            row(&["信貸", "100"]),
            row(&["抵利型 現金", "10", "", "500"]),
            row(&["股票", "30"]),
        ];
        let records = classify(&rows);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].category, Category::ReserveCash);
        assert_eq!(records[1].amount, 500.0);
        assert_eq!(records[2].category, Category::Liability);
        assert_eq!(records[2].amount, -30.0);
    }

    #[test]
    fn offset_mortgage_label_does_not_switch_section() {
        let rows = vec![row(&["抵利型房貸帳戶", "5000"]), row(&["活存", "10"])];
        let records = classify(&rows);
        assert_eq!(records[0].category, Category::Other);
        assert_eq!(records[0].amount, 5_000.0);
        assert_eq!(records[1].category, Category::Cash);
    }

    #[test]
    fn section_switch_is_sticky() {
        let rows = vec![
            row(&["借款", "0"]),
            row(&["口袋現金", "800"]),
            row(&["鴻海", "10", "", "1500"]),
        ];
        let records = classify(&rows);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.category == Category::Liability));
        assert_eq!(records[0].amount, -800.0);
        assert_eq!(records[1].amount, -10.0);
    }

    #[test]
    fn zero_liability_rows_are_dropped_silently() {
        let out = classify_with_flags(&[row(&["房貸"]), row(&["房貸 本金", "", "", "12"])]);
        assert!(out.records.is_empty());
        assert!(out.flags.is_empty());
    }

    #[test]
    fn non_positive_assets_are_flagged_and_skipped() {
        let out = classify_with_flags(&[row(&["黃金", "0"]), row(&["抵利型 現金", "-5"])]);
        assert!(out.records.is_empty());
        assert_eq!(out.flags.len(), 2);
        assert!(
            out.flags
                .iter()
                .all(|f| f.reason == FlagReason::NonPositiveAsset)
        );
    }

    #[test]
    fn unparseable_cells_are_flagged_and_read_as_zero() {
        let out = classify_with_flags(&[row(&["活存", "about 5k", "", "7,000"])]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].amount, 7_000.0);
        assert_eq!(out.records[0].share_count, 0.0);
        assert_eq!(out.flags[0].reason, FlagReason::UnparseableCell { column: 1 });
    }

    #[test]
    fn equity_with_money_but_no_share_count_is_flagged() {
        let out = classify_with_flags(&[row(&["鴻海", "", "", "300,000"])]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].amount, 300_000.0);
        assert_eq!(out.records[0].share_count, 0.0);
        assert_eq!(
            out.flags,
            vec![RowFlag {
                row: 0,
                label: "鴻海".to_string(),
                reason: FlagReason::ShareCountMissing,
            }]
        );
    }

    #[test]
    fn liability_rows_ignore_money_column() {
        let out = classify_with_flags(&[row(&["信貸", "100", "", "see note"])]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].amount, -100.0);
        assert!(out.flags.is_empty());
    }

    #[test]
    fn total_row_never_reaches_ledger() {
        let rows = vec![row(&["合計", "", "", "999999"])];
        assert!(classify(&rows).is_empty());
    }

    #[test]
    fn numeric_cells_pass_through() {
        let rows = vec![RawRow::new(vec![
            Cell::text("VOO"),
            Cell::Number(3.0),
            Cell::Number(500.0),
            Cell::Number(1500.0),
        ])];
        let records = classify(&rows);
        assert_eq!(records[0].amount, 1_500.0);
        assert_eq!(records[0].share_count, 3.0);
    }

    fn arb_label() -> impl proptest::strategy::Strategy<Value = String> {
        prop::sample::select(vec![
            "鴻海", "VT", "口袋現金", "抵利型 現金", "抵利型房貸", "房貸", "信貸", "借款",
            "合計", "資產合計", "淨值", "匯率", "項目", "", "黃金", "台股", "e財庫",
        ])
        .prop_map(str::to_string)
    }

    fn arb_cell() -> impl proptest::strategy::Strategy<Value = String> {
        prop::sample::select(vec![
            "", "0", "12", "1,000", "NT$2,500", "-40", "abc", "7.5%", "999999",
        ])
        .prop_map(str::to_string)
    }

    fn arb_rows() -> impl proptest::strategy::Strategy<Value = Vec<RawRow>> {
        prop::collection::vec(
            (arb_label(), prop::collection::vec(arb_cell(), 0..4)).prop_map(|(label, rest)| {
                std::iter::once(label).chain(rest).collect::<RawRow>()
            }),
            0..24,
        )
    }

    use proptest::strategy::Strategy;

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_classify_is_idempotent(rows in arb_rows()) {
            prop_assert_eq!(classify(&rows), classify(&rows));
        }

        #[test]
        fn prop_excluded_labels_never_emit_records(rows in arb_rows()) {
            for record in classify(&rows) {
                prop_assert!(!EXCLUSION_MARKERS.iter().any(|m| record.label.contains(m)));
                prop_assert!(!record.label.is_empty());
                prop_assert!(record.label != HEADER_TOKEN);
            }
        }

        #[test]
        fn prop_sign_matches_category(rows in arb_rows()) {
            for record in classify(&rows) {
                prop_assert_eq!(record.amount > 0.0, record.category != Category::Liability);
                prop_assert_eq!(record.amount < 0.0, record.category == Category::Liability);
                prop_assert!(!(record.is_reserve && record.is_liability()));
            }
        }
    }
}
