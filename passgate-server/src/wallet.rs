//! Wallet ledger module
//!
//! In-memory accounts and transaction history. Mutations only happen through
//! [`WalletLedger::execute`], fed by payloads the step-up coordinator has
//! released, so every balance change is backed by a verified assertion.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Deposits are capped per transaction; anything above needs to be split.
pub const MIN_AMOUNT_CENTS: i64 = 1;
pub const MAX_DEPOSIT_CENTS: i64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("amount {amount} out of range {min}..={max}")]
    InvalidAmount { amount: i64, min: i64, max: i64 },

    #[error("cannot transfer to yourself")]
    SelfTransfer,

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    #[error("no such account")]
    UnknownAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    TransferOut,
    TransferIn,
}

/// One ledger entry, newest last.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    /// Signed amount in cents as applied to this account.
    pub amount: i64,
    /// Username of the other party for transfers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    pub balance_after: i64,
    pub at: DateTime<Utc>,
}

/// A verified wallet mutation, parsed back out of a step-up payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WalletCommand {
    Deposit {
        amount: i64,
    },
    Transfer {
        to: Uuid,
        to_username: String,
        amount: i64,
    },
}

#[derive(Debug, Default)]
struct Account {
    balance: i64,
    transactions: Vec<Transaction>,
}

/// In-memory ledger keyed by user id.
#[derive(Default)]
pub struct WalletLedger {
    accounts: DashMap<Uuid, Account>,
}

impl WalletLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the user an account; registration calls this.
    pub fn open_account(&self, user_id: Uuid) {
        self.accounts.entry(user_id).or_default();
    }

    pub fn balance(&self, user_id: Uuid) -> Result<i64, WalletError> {
        self.accounts
            .get(&user_id)
            .map(|a| a.balance)
            .ok_or(WalletError::UnknownAccount)
    }

    pub fn transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, WalletError> {
        self.accounts
            .get(&user_id)
            .map(|a| a.transactions.clone())
            .ok_or(WalletError::UnknownAccount)
    }

    /// Validate a command before parking it for step-up, so users are not
    /// sent through a ceremony for a request that can never succeed. The
    /// same checks run again at execution time; balances may have moved
    /// while the operation was parked.
    pub fn precheck(&self, user_id: Uuid, command: &WalletCommand) -> Result<(), WalletError> {
        match command {
            WalletCommand::Deposit { amount } => {
                check_amount(*amount)?;
                self.balance(user_id)?;
                Ok(())
            }
            WalletCommand::Transfer { to, amount, .. } => {
                check_amount(*amount)?;
                if *to == user_id {
                    return Err(WalletError::SelfTransfer);
                }
                self.accounts
                    .get(to)
                    .ok_or(WalletError::UnknownAccount)?;
                let balance = self.balance(user_id)?;
                if balance < *amount {
                    return Err(WalletError::InsufficientFunds {
                        balance,
                        requested: *amount,
                    });
                }
                Ok(())
            }
        }
    }

    /// Apply a verified command, returning the actor's new balance.
    pub fn execute(&self, user_id: Uuid, command: &WalletCommand) -> Result<i64, WalletError> {
        match command {
            WalletCommand::Deposit { amount } => {
                check_amount(*amount)?;
                let mut account = self
                    .accounts
                    .get_mut(&user_id)
                    .ok_or(WalletError::UnknownAccount)?;
                account.balance += amount;
                let entry = Transaction {
                    kind: TransactionKind::Deposit,
                    amount: *amount,
                    counterparty: None,
                    balance_after: account.balance,
                    at: Utc::now(),
                };
                account.transactions.push(entry);
                tracing::info!(%user_id, amount, balance = account.balance, "deposit applied");
                Ok(account.balance)
            }
            WalletCommand::Transfer {
                to,
                to_username,
                amount,
            } => {
                check_amount(*amount)?;
                if *to == user_id {
                    return Err(WalletError::SelfTransfer);
                }
                // Confirm the recipient before touching the sender so a
                // refused transfer never leaves a partial debit behind.
                if !self.accounts.contains_key(to) {
                    return Err(WalletError::UnknownAccount);
                }
                // Debit first while holding only the sender's shard guard;
                // the credit acquires the recipient's afterwards. Lock order
                // is single-entry at a time, so no deadlock window.
                let new_balance = {
                    let mut sender = self
                        .accounts
                        .get_mut(&user_id)
                        .ok_or(WalletError::UnknownAccount)?;
                    if sender.balance < *amount {
                        return Err(WalletError::InsufficientFunds {
                            balance: sender.balance,
                            requested: *amount,
                        });
                    }
                    sender.balance -= amount;
                    let balance_after = sender.balance;
                    sender.transactions.push(Transaction {
                        kind: TransactionKind::TransferOut,
                        amount: -amount,
                        counterparty: Some(to_username.clone()),
                        balance_after,
                        at: Utc::now(),
                    });
                    balance_after
                };

                match self.accounts.get_mut(to) {
                    Some(mut recipient) => {
                        recipient.balance += amount;
                        let balance_after = recipient.balance;
                        recipient.transactions.push(Transaction {
                            kind: TransactionKind::TransferIn,
                            amount: *amount,
                            counterparty: None,
                            balance_after,
                            at: Utc::now(),
                        });
                    }
                    None => {
                        // Accounts are never removed, so the recipient
                        // checked above is still here. Should that change,
                        // reverse the debit with a compensating entry; the
                        // log is append-only and another writer may have
                        // pushed in the meantime.
                        if let Some(mut sender) = self.accounts.get_mut(&user_id) {
                            sender.balance += amount;
                            let balance_after = sender.balance;
                            sender.transactions.push(Transaction {
                                kind: TransactionKind::TransferIn,
                                amount: *amount,
                                counterparty: Some(to_username.clone()),
                                balance_after,
                                at: Utc::now(),
                            });
                        }
                        return Err(WalletError::UnknownAccount);
                    }
                }

                tracing::info!(%user_id, recipient = %to, amount, "transfer applied");
                Ok(new_balance)
            }
        }
    }
}

fn check_amount(amount: i64) -> Result<(), WalletError> {
    if (MIN_AMOUNT_CENTS..=MAX_DEPOSIT_CENTS).contains(&amount) {
        Ok(())
    } else {
        Err(WalletError::InvalidAmount {
            amount,
            min: MIN_AMOUNT_CENTS,
            max: MAX_DEPOSIT_CENTS,
        })
    }
}
