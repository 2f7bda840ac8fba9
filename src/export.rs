//! Consolidated monthly report and its CSV rendering.
//!
//! Unlike the rest of the persistence surface, export failures are surfaced
//! to the caller: this is the one path where the UI shows a blocking error.

use std::io::Write;

use crate::errors::CoreResult;
use crate::ledger::{
    category_breakdown, compute_totals, filter_by_month, CategoryBreakdown, Category, Expense,
    Income, MonthKey, MonthlyBudget, Totals,
};

/// Snapshot of one month: derived totals plus the per-category rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyReport {
    pub month: MonthKey,
    pub totals: Totals,
    pub rows: Vec<CategoryBreakdown>,
}

impl MonthlyReport {
    /// Builds the report from raw (unfiltered) snapshots.
    pub fn build(
        month: MonthKey,
        expenses: &[Expense],
        incomes: &[Income],
        categories: &[Category],
        budget: &MonthlyBudget,
    ) -> Self {
        let month_expenses = filter_by_month(expenses, month);
        let month_incomes = filter_by_month(incomes, month);
        Self {
            month,
            totals: compute_totals(&month_expenses, &month_incomes, budget),
            rows: category_breakdown(&month_expenses, categories, budget),
        }
    }

    /// Writes the report as CSV: one row per category followed by the
    /// monthly totals.
    pub fn write_csv<W: Write>(&self, writer: W) -> CoreResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["category", "spent", "budgeted", "difference"])?;
        for row in &self.rows {
            csv.write_record([
                row.category.name.clone(),
                format_amount(row.spent),
                format_amount(row.budgeted),
                format_amount(row.difference),
            ])?;
        }
        csv.write_record([
            "total".to_string(),
            format_amount(self.totals.total_expenses),
            format_amount(self.totals.total_incomes),
            format_amount(self.totals.balance),
        ])?;
        csv.flush().map_err(crate::errors::StoreError::from)?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> CoreResult<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn format_amount(value: f64) -> String {
    if value == value.trunc() {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}
