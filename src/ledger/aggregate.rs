//! Pure monthly aggregation over transaction snapshots.
//!
//! Every function here is deterministic and stateless: calling twice with
//! identical inputs yields identical outputs, and summation is
//! order-independent.

use serde::Serialize;
use tracing::warn;

use super::budget::MonthlyBudget;
use super::category::{find_or_unknown, unknown_category, Category};
use super::month::MonthKey;
use super::transaction::{Expense, LedgerEntry};

/// Derived totals for one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Totals {
    pub total_expenses: f64,
    pub total_incomes: f64,
    /// `total_incomes - total_expenses`.
    pub balance: f64,
    /// `budget.overall - total_expenses`.
    pub remaining: f64,
    /// Spent share of the overall budget, in percent. Zero when no budget.
    pub percentage: f64,
}

/// One row of the per-category spend/budget comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub category: Category,
    pub spent: f64,
    pub budgeted: f64,
    /// `budgeted - spent`; negative when overspent.
    pub difference: f64,
}

/// Subset of `entries` whose date falls within the anchor's calendar month,
/// inclusive on both ends. Entries with a missing or unparsable date are
/// excluded and logged as a data-quality warning.
pub fn filter_by_month<T: LedgerEntry + Clone>(entries: &[T], anchor: MonthKey) -> Vec<T> {
    entries
        .iter()
        .filter(|entry| match entry.parsed_date() {
            Some(date) => anchor.contains(date),
            None => {
                warn!(date = entry.date_str(), "excluding entry with unparsable date");
                false
            }
        })
        .cloned()
        .collect()
}

/// Sum of entry amounts, each coerced to a non-negative finite number.
/// Never fails: invalid amounts count as zero.
pub fn sum_amounts<T: LedgerEntry>(entries: &[T]) -> f64 {
    entries.iter().map(|entry| coerce_amount(entry.amount())).sum()
}

/// Derived totals for a month's expense and income snapshots.
pub fn compute_totals<E, I>(expenses: &[E], incomes: &[I], budget: &MonthlyBudget) -> Totals
where
    E: LedgerEntry,
    I: LedgerEntry,
{
    let total_expenses = sum_amounts(expenses);
    let total_incomes = sum_amounts(incomes);
    let percentage = if budget.overall > 0.0 {
        total_expenses / budget.overall * 100.0
    } else {
        0.0
    };
    Totals {
        total_expenses,
        total_incomes,
        balance: total_incomes - total_expenses,
        remaining: budget.overall - total_expenses,
        percentage,
    }
}

/// Per-category spend against budget, restricted to categories with nonzero
/// spend or budget. Expenses referencing a missing category are gathered
/// under the fallback category rather than dropped.
pub fn category_breakdown(
    expenses: &[Expense],
    categories: &[Category],
    budget: &MonthlyBudget,
) -> Vec<CategoryBreakdown> {
    let mut rows: Vec<CategoryBreakdown> = categories
        .iter()
        .map(|category| {
            let spent: f64 = expenses
                .iter()
                .filter(|expense| expense.category_id.as_deref() == Some(category.id.as_str()))
                .map(|expense| coerce_amount(expense.amount))
                .sum();
            let budgeted = budget.category_limit(&category.id);
            CategoryBreakdown {
                category: category.clone(),
                spent,
                budgeted,
                difference: budgeted - spent,
            }
        })
        .collect();

    let dangling: f64 = expenses
        .iter()
        .filter(|expense| {
            find_or_unknown(categories, expense.category_id.as_deref()).id == unknown_category().id
        })
        .map(|expense| coerce_amount(expense.amount))
        .sum();
    if dangling > 0.0 {
        rows.push(CategoryBreakdown {
            category: unknown_category(),
            spent: dangling,
            budgeted: 0.0,
            difference: -dangling,
        });
    }

    rows.retain(|row| row.spent > 0.0 || row.budgeted > 0.0);
    rows
}

fn coerce_amount(amount: f64) -> f64 {
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transaction::Income;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn june() -> MonthKey {
        MonthKey::new(2024, 6).unwrap()
    }

    #[test]
    fn filter_keeps_only_entries_inside_the_month() {
        let expenses = vec![
            Expense::new(30_000.0, "Supermercado", date(2024, 6, 1), Some("1".into())),
            Expense::new(20_000.0, "Bencina", date(2024, 6, 30), Some("2".into())),
            Expense::new(99_999.0, "Fuera de mes", date(2024, 7, 1), None),
            Expense::new(99_999.0, "Mes anterior", date(2024, 5, 31), None),
        ];
        let filtered = filter_by_month(&expenses, june());
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|e| e.date.starts_with("2024-06")));
    }

    #[test]
    fn filter_excludes_missing_and_unparsable_dates() {
        let mut bad = Expense::new(5_000.0, "Sin fecha", date(2024, 6, 10), None);
        bad.date = String::new();
        let mut garbled = Expense::new(5_000.0, "Fecha rota", date(2024, 6, 10), None);
        garbled.date = "06/15/2024".into();
        let ok = Expense::new(5_000.0, "Ok", date(2024, 6, 10), None);

        let filtered = filter_by_month(&[bad, garbled, ok.clone()], june());
        assert_eq!(filtered, vec![ok]);
    }

    #[test]
    fn sums_are_order_independent_and_coerced() {
        let mut incomes = vec![
            Income::new(500_000.0, "Sueldo", date(2024, 6, 1), None),
            Income::new(25_000.0, "Venta", date(2024, 6, 2), None),
            Income::new(-100.0, "Negativo", date(2024, 6, 3), None),
        ];
        incomes[2].amount = f64::NAN;
        let forward = sum_amounts(&incomes);
        incomes.reverse();
        assert_eq!(forward, sum_amounts(&incomes));
        assert_eq!(forward, 525_000.0);
    }

    #[test]
    fn negative_amounts_count_as_zero() {
        let incomes = vec![Income::new(-500.0, "Ajuste", date(2024, 6, 1), None)];
        assert_eq!(sum_amounts(&incomes), 0.0);
    }

    // Scenario: budget 100000 CLP, expenses 30000 + 20000 in the month.
    #[test]
    fn totals_against_overall_budget() {
        let expenses = vec![
            Expense::new(30_000.0, "Supermercado", date(2024, 6, 5), Some("1".into())),
            Expense::new(20_000.0, "Bencina", date(2024, 6, 12), Some("2".into())),
        ];
        let incomes: Vec<Income> = Vec::new();
        let budget = MonthlyBudget {
            overall: 100_000.0,
            ..Default::default()
        };

        let totals = compute_totals(&expenses, &incomes, &budget);
        assert_eq!(totals.total_expenses, 50_000.0);
        assert_eq!(totals.remaining, 50_000.0);
        assert_eq!(totals.percentage, 50.0);
    }

    // Scenario: income 500000, expense 600000, balance -100000.
    #[test]
    fn balance_can_go_negative() {
        let expenses = vec![Expense::new(600_000.0, "Arriendo", date(2024, 6, 1), None)];
        let incomes = vec![Income::new(500_000.0, "Sueldo", date(2024, 6, 1), None)];
        let totals = compute_totals(&expenses, &incomes, &MonthlyBudget::default());
        assert_eq!(totals.balance, -100_000.0);
        assert_eq!(totals.percentage, 0.0);
    }

    #[test]
    fn totals_are_idempotent_over_the_same_snapshot() {
        let expenses = vec![Expense::new(1_000.0, "x", date(2024, 6, 1), None)];
        let incomes = vec![Income::new(2_000.0, "y", date(2024, 6, 1), None)];
        let budget = MonthlyBudget {
            overall: 4_000.0,
            ..Default::default()
        };
        let first = compute_totals(&expenses, &incomes, &budget);
        let second = compute_totals(&expenses, &incomes, &budget);
        assert_eq!(first, second);
    }

    // Scenario: new category, one expense against it, no budget yet.
    #[test]
    fn breakdown_for_unbudgeted_category() {
        let category = Category::new("Mascotas", "#AABBCC", "🐶");
        let expense = Expense::new(
            12_500.0,
            "Veterinario",
            date(2024, 6, 3),
            Some(category.id.clone()),
        );

        let rows = category_breakdown(&[expense], &[category.clone()], &MonthlyBudget::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, category);
        assert_eq!(rows[0].spent, 12_500.0);
        assert_eq!(rows[0].budgeted, 0.0);
        assert_eq!(rows[0].difference, -12_500.0);
    }

    #[test]
    fn breakdown_skips_idle_categories_and_collects_dangling_refs() {
        let categories = crate::ledger::category::seed_categories();
        let mut budget = MonthlyBudget::default();
        budget.per_category.insert("2".into(), 40_000.0);
        let expenses = vec![
            Expense::new(10_000.0, "Almuerzo", date(2024, 6, 2), Some("1".into())),
            Expense::new(3_000.0, "Huérfano", date(2024, 6, 2), Some("gone".into())),
        ];

        let rows = category_breakdown(&expenses, &categories, &budget);
        // Food (spend), transport (budget only), and the fallback row.
        assert_eq!(rows.len(), 3);
        let transport = rows.iter().find(|r| r.category.id == "2").unwrap();
        assert_eq!(transport.spent, 0.0);
        assert_eq!(transport.difference, 40_000.0);
        let fallback = rows.iter().find(|r| r.category.id == "unknown").unwrap();
        assert_eq!(fallback.spent, 3_000.0);
    }
}
