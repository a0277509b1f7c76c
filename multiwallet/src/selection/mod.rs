//! Manual coin selection.
//!
//! A [`SelectionSession`] loads the unspent outputs of every account of one
//! wallet, lets the user pick outputs by hand and keeps the running count,
//! amount and transaction size estimate in step with the picked set.

pub mod sort;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::AssetAdapter;
use crate::error::{Result, WalletError};
use crate::model::{OutPointRef, SizeEstimate, UnspentOutput};
use crate::registry::AccountRegistry;
use crate::types::WalletId;

pub use sort::{SortColumn, SortOrder, SortTracker};

/// Lifecycle of a selection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionState {
    /// Nothing fetched yet.
    Empty,
    /// Outputs loaded, nothing selected.
    Loaded,
    Selecting,
    /// The selection was handed to the transaction builder.
    Submitted,
}

/// One unspent output with its selection flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRow {
    pub output: UnspentOutput,
    pub selected: bool,
}

/// Unspent outputs of a single account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUtxos {
    pub account_number: u32,
    pub account_name: String,
    pub rows: Vec<UtxoRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSummary {
    pub selected_count: usize,
    pub selected_amount: u128,
    pub size_estimate: SizeEstimate,
}

/// Outputs handed over to transaction building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedSelection {
    pub wallet_id: WalletId,
    /// In the order they were selected.
    pub outputs: Vec<UnspentOutput>,
    pub total: u128,
    pub size_estimate: SizeEstimate,
}

/// Coin selection workflow over one wallet.
pub struct SelectionSession {
    registry: Arc<AccountRegistry>,
    wallet_id: WalletId,
    adapter: Option<Arc<dyn AssetAdapter>>,
    groups: Vec<AccountUtxos>,
    /// Group and row index of every loaded output.
    positions: HashMap<OutPointRef, (usize, usize)>,
    /// Selected outpoints, stamped in selection order.
    selected: HashMap<OutPointRef, u64>,
    next_stamp: u64,
    selected_amount: u128,
    /// Sum of the input sizes of the selected outputs.
    inputs_size: usize,
    size_estimate: SizeEstimate,
    tracker: SortTracker,
    state: SelectionState,
}

impl SelectionSession {
    pub fn new(registry: Arc<AccountRegistry>, wallet_id: WalletId) -> Self {
        Self {
            registry,
            wallet_id,
            adapter: None,
            groups: Vec::new(),
            positions: HashMap::new(),
            selected: HashMap::new(),
            next_stamp: 0,
            selected_amount: 0,
            inputs_size: 0,
            size_estimate: SizeEstimate::Unavailable,
            tracker: SortTracker::new(),
            state: SelectionState::Empty,
        }
    }

    pub fn wallet_id(&self) -> WalletId {
        self.wallet_id
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// Load the unspent outputs of every account of the wallet.
    ///
    /// The account list is refreshed from the backend first, so accounts
    /// created or renamed since the last refresh are picked up. All-or-nothing:
    /// if the refresh or any account's listing fails the session is left
    /// exactly as it was and the error is returned.
    pub async fn fetch_accounts_info(&mut self) -> Result<()> {
        let adapter = self.registry.adapter(self.wallet_id).await?;
        let snapshot = self.registry.refresh(self.wallet_id).await?;

        let mut groups = Vec::with_capacity(snapshot.accounts.len());
        for account in &snapshot.accounts {
            let outputs = self
                .registry
                .unspent_outputs(self.wallet_id, account.number())
                .await
                .inspect_err(|e| {
                    tracing::warn!(
                        "Querying unspent outputs of account {} in wallet {} failed: {}",
                        account.number(),
                        self.wallet_id,
                        e
                    );
                })?;

            groups.push(AccountUtxos {
                account_number: account.number(),
                account_name: account.name().to_string(),
                rows: outputs
                    .into_iter()
                    .map(|output| UtxoRow {
                        output,
                        selected: false,
                    })
                    .collect(),
            });
        }

        self.size_estimate = adapter.estimate_size(0, 0);
        self.adapter = Some(adapter);
        self.groups = groups;
        self.index_all();
        self.selected.clear();
        self.selected_amount = 0;
        self.inputs_size = 0;
        self.tracker.reset();
        self.state = SelectionState::Loaded;

        tracing::debug!(
            "Loaded {} outputs across {} accounts of wallet {}",
            self.groups.iter().map(|g| g.rows.len()).sum::<usize>(),
            self.groups.len(),
            self.wallet_id
        );
        Ok(())
    }

    pub fn groups(&self) -> &[AccountUtxos] {
        &self.groups
    }

    /// Flip the selection flag of `outpoint` and return its new value.
    pub fn toggle(&mut self, outpoint: &OutPointRef) -> Result<bool> {
        self.ensure_editable()?;
        let (group, row) = self.position(outpoint)?;
        let selected = !self.groups[group].rows[row].selected;
        self.set_selected(outpoint, selected)?;
        Ok(selected)
    }

    /// Set the selection flag of `outpoint`. Setting the current value is a no-op.
    ///
    /// Runs in constant time: the count, amount and size estimate are
    /// adjusted by the one output that changed.
    pub fn set_selected(&mut self, outpoint: &OutPointRef, selected: bool) -> Result<()> {
        self.ensure_editable()?;

        let (group, row) = self.position(outpoint)?;
        let row = &mut self.groups[group].rows[row];
        if row.selected == selected {
            return Ok(());
        }
        row.selected = selected;
        let amount = u128::from(row.output.amount.to_sat());
        let input_size = self.adapter.as_ref().and_then(|a| a.input_size(&row.output)).unwrap_or(0);

        if selected {
            self.selected.insert(outpoint.clone(), self.next_stamp);
            self.next_stamp += 1;
            self.selected_amount += amount;
            self.inputs_size += input_size;
        } else {
            self.selected.remove(outpoint);
            self.selected_amount -= amount;
            self.inputs_size -= input_size;
        }

        self.update_estimate();
        self.state = if self.selected.is_empty() {
            SelectionState::Loaded
        } else {
            SelectionState::Selecting
        };
        Ok(())
    }

    /// Sort every account group on `column`, one click of the column header.
    pub fn sort(&mut self, column: SortColumn) -> SortOrder {
        let order = self.tracker.click(column);
        for group in &mut self.groups {
            sort::sort_rows(&mut group.rows, column, order);
        }
        self.index_all();
        order
    }

    /// Sort only the given account's group. Shares the click counter with [`Self::sort`].
    pub fn sort_account(&mut self, account_number: u32, column: SortColumn) -> Result<SortOrder> {
        let index = self
            .groups
            .iter()
            .position(|g| g.account_number == account_number)
            .ok_or_else(|| {
                WalletError::NotFound(format!(
                    "account {} in selection of wallet {}",
                    account_number, self.wallet_id
                ))
            })?;

        let order = self.tracker.click(column);
        sort::sort_rows(&mut self.groups[index].rows, column, order);
        self.index_group(index);
        Ok(order)
    }

    pub fn sort_indicator(&self) -> Option<(SortColumn, SortOrder)> {
        self.tracker.indicator()
    }

    /// Deselect everything and forget the sort state.
    pub fn clear(&mut self) {
        for row in self.groups.iter_mut().flat_map(|g| g.rows.iter_mut()) {
            row.selected = false;
        }
        self.selected.clear();
        self.selected_amount = 0;
        self.inputs_size = 0;
        self.tracker.reset();
        self.update_estimate();
        if self.state != SelectionState::Empty {
            self.state = SelectionState::Loaded;
        }
    }

    pub fn summary(&self) -> SelectionSummary {
        SelectionSummary {
            selected_count: self.selected.len(),
            selected_amount: self.selected_amount,
            size_estimate: self.size_estimate,
        }
    }

    /// Selected outputs in the order they were selected.
    pub fn selected_outputs(&self) -> Vec<UnspentOutput> {
        let mut stamped: Vec<_> = self
            .selected
            .iter()
            .filter_map(|(outpoint, stamp)| {
                let (group, row) = *self.positions.get(outpoint)?;
                Some((*stamp, &self.groups[group].rows[row].output))
            })
            .collect();
        stamped.sort_unstable_by_key(|(stamp, _)| *stamp);
        stamped.into_iter().map(|(_, output)| output.clone()).collect()
    }

    /// Hand the selection over. The session accepts no further edits until cleared.
    pub fn submit(&mut self) -> Result<SubmittedSelection> {
        self.ensure_editable()?;
        if self.selected.is_empty() {
            return Err(WalletError::InvalidState("no outputs selected".to_string()));
        }

        self.state = SelectionState::Submitted;
        tracing::info!(
            "Submitted {} outputs totalling {} from wallet {}",
            self.selected.len(),
            self.selected_amount,
            self.wallet_id
        );
        Ok(SubmittedSelection {
            wallet_id: self.wallet_id,
            outputs: self.selected_outputs(),
            total: self.selected_amount,
            size_estimate: self.size_estimate,
        })
    }

    fn ensure_editable(&self) -> Result<()> {
        match self.state {
            SelectionState::Empty => {
                Err(WalletError::InvalidState("unspent outputs not loaded".to_string()))
            }
            SelectionState::Submitted => {
                Err(WalletError::InvalidState("selection already submitted".to_string()))
            }
            SelectionState::Loaded | SelectionState::Selecting => Ok(()),
        }
    }

    fn update_estimate(&mut self) {
        if let Some(adapter) = &self.adapter {
            self.size_estimate = adapter.estimate_size(self.selected.len(), self.inputs_size);
        }
    }

    fn position(&self, outpoint: &OutPointRef) -> Result<(usize, usize)> {
        self.positions.get(outpoint).copied().ok_or_else(|| not_found(outpoint))
    }

    fn index_all(&mut self) {
        self.positions.clear();
        for index in 0..self.groups.len() {
            self.index_group(index);
        }
    }

    fn index_group(&mut self, index: usize) {
        for (row, utxo) in self.groups[index].rows.iter().enumerate() {
            self.positions.insert(utxo.output.outpoint(), (index, row));
        }
    }
}

fn not_found(outpoint: &OutPointRef) -> WalletError {
    WalletError::NotFound(format!("output {}:{}", outpoint.txid, outpoint.vout))
}
