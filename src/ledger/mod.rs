//! Ledger domain models and pure monthly aggregation.

pub mod aggregate;
pub mod budget;
pub mod category;
pub mod month;
pub mod transaction;

pub use aggregate::{
    category_breakdown, compute_totals, filter_by_month, sum_amounts, CategoryBreakdown, Totals,
};
pub use budget::MonthlyBudget;
pub use category::{find_or_unknown, seed_categories, unknown_category, Category};
pub use month::MonthKey;
pub use transaction::{Expense, Income, LedgerEntry, DATE_FORMAT};
