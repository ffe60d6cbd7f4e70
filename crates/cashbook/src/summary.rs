use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::transaction::{TransactionCategory, TransactionEntry, TransactionKind};

/// Totals over an arbitrary set of cash movements (typically a date range).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub total_income: i64,
    pub total_expense: i64,
    pub income_by_category: HashMap<TransactionCategory, i64>,
    pub expense_by_category: HashMap<TransactionCategory, i64>,
}

impl RangeSummary {
    pub fn net(&self) -> i64 {
        self.total_income - self.total_expense
    }
}

/// Roll up movements by kind and category.
pub fn summarize<'a, I>(entries: I) -> RangeSummary
where
    I: IntoIterator<Item = &'a TransactionEntry>,
{
    let mut summary = RangeSummary::default();
    for entry in entries {
        match entry.kind {
            TransactionKind::Income => {
                summary.total_income += entry.amount;
                *summary.income_by_category.entry(entry.category).or_insert(0) += entry.amount;
            }
            TransactionKind::Expense => {
                summary.total_expense += entry.amount;
                *summary
                    .expense_by_category
                    .entry(entry.category)
                    .or_insert(0) += entry.amount;
            }
        }
    }
    summary
}
