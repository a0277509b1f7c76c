//! Column sorting of UTXO rows.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::UtxoRow;

/// Sortable columns of the coin selection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortColumn {
    Amount,
    /// Plain string comparison of the encoded address.
    Address,
    Confirmations,
    ReceiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn reversed(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

/// Click counter of the active sort column.
///
/// Odd click counts sort ascending, even ones descending. Clicking another
/// column makes it the active one and restarts its count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortTracker {
    column: Option<SortColumn>,
    clicks: u32,
}

impl SortTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a click on `column` and return the order to sort by.
    pub fn click(&mut self, column: SortColumn) -> SortOrder {
        if self.column != Some(column) {
            self.column = Some(column);
            self.clicks = 0;
        }
        self.clicks = self.clicks.wrapping_add(1);
        self.order()
    }

    fn order(&self) -> SortOrder {
        if self.clicks % 2 == 1 {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        }
    }

    /// Active column and the order of its last sort.
    pub fn indicator(&self) -> Option<(SortColumn, SortOrder)> {
        self.column.map(|column| (column, self.order()))
    }

    pub fn reset(&mut self) {
        self.column = None;
        self.clicks = 0;
    }
}

/// Ascending comparison of two rows on `column`.
pub fn compare(a: &UtxoRow, b: &UtxoRow, column: SortColumn) -> Ordering {
    let (a, b) = (&a.output, &b.output);
    match column {
        SortColumn::Amount => a.amount.cmp(&b.amount),
        SortColumn::Address => a.address.cmp(&b.address),
        SortColumn::Confirmations => a.confirmations.cmp(&b.confirmations),
        SortColumn::ReceiveTime => a.receive_time.cmp(&b.receive_time),
    }
}

/// Stable sort of one account's rows.
pub fn sort_rows(rows: &mut [UtxoRow], column: SortColumn, order: SortOrder) {
    match order {
        SortOrder::Ascending => rows.sort_by(|a, b| compare(a, b, column)),
        SortOrder::Descending => rows.sort_by(|a, b| compare(b, a, column)),
    }
}
