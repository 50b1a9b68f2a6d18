//! Money transfer between two accounts
//!
//! One atomic scope writes the transfer record, a debit and a credit entry,
//! and both balances.
//!
//! # Lock Ordering
//!
//! Balance updates lock rows. They always run lower account id first, so two
//! transfers touching the same pair of accounts (in either direction) queue
//! on the same first row instead of each holding one row and waiting for the
//! other.

use serde::Serialize;
use tracing::{info, warn};

use super::error::StoreError;
use super::models::{Account, CreateEntryParams, CreateTransferParams, Entry, Transfer};
use super::querier::Querier;
use super::store::{Store, TxBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTxParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    /// Must be positive; anything else is rejected before a scope opens
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// `(account_id, delta)` pairs in lock order. `arg.amount` is positive.
pub(crate) fn balance_updates(arg: &TransferTxParams) -> [(i64, i64); 2] {
    let debit = (arg.from_account_id, -arg.amount);
    let credit = (arg.to_account_id, arg.amount);
    if arg.from_account_id < arg.to_account_id {
        [debit, credit]
    } else {
        [credit, debit]
    }
}

impl<B: TxBackend> Store<B> {
    pub async fn transfer_tx(&self, arg: TransferTxParams) -> Result<TransferTxResult, StoreError> {
        if arg.from_account_id == arg.to_account_id {
            warn!(account_id = arg.from_account_id, "Rejected self-transfer");
            return Err(StoreError::SelfTransfer);
        }
        if arg.amount <= 0 {
            warn!(amount = arg.amount, "Rejected non-positive transfer amount");
            return Err(StoreError::InvalidData(format!(
                "transfer amount must be positive, got {}",
                arg.amount
            )));
        }

        match self
            .exec_tx(move |q| Box::pin(transfer_in_scope(q, arg)))
            .await
        {
            Ok(result) => {
                info!(
                    transfer_id = result.transfer.id,
                    from = arg.from_account_id,
                    to = arg.to_account_id,
                    amount = arg.amount,
                    "Transfer committed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    from = arg.from_account_id,
                    to = arg.to_account_id,
                    amount = arg.amount,
                    error = %e,
                    "Transfer rolled back"
                );
                Err(e)
            }
        }
    }
}

async fn transfer_in_scope(
    q: &mut dyn Querier,
    arg: TransferTxParams,
) -> Result<TransferTxResult, StoreError> {
    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: arg.from_account_id,
            amount: -arg.amount,
        })
        .await?;

    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    let [(first_id, first_delta), (second_id, second_delta)] = balance_updates(&arg);
    let first = q.add_account_balance(first_id, first_delta).await?;
    let second = q.add_account_balance(second_id, second_delta).await?;
    let (from_account, to_account) = if first_id == arg.from_account_id {
        (first, second)
    } else {
        (second, first)
    };

    // Row is still locked by this scope, so the post-update balance is exact
    if from_account.balance < 0 {
        return Err(StoreError::InsufficientBalance {
            account_id: from_account.id,
            balance: from_account.balance + arg.amount,
            amount: arg.amount,
        });
    }

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}
