// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use thiserror::Error;

/// Integer minor currency units.
pub type Amount = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient balance for {account}: has {balance}, needs {requested}")]
    InsufficientFunds {
        account: String,
        balance: Amount,
        requested: Amount,
    },
    #[error("Balance overflow for {0}")]
    Overflow(String),
}

/// Bettor balances plus the house account. Implemented by the store state so
/// that every credit and debit commits with the rest of its transaction.
pub trait Ledger {
    fn balance(&self, account: &str) -> Amount;

    fn credit(&mut self, account: &str, amount: Amount) -> Result<Amount, LedgerError>;

    fn debit(&mut self, account: &str, amount: Amount) -> Result<Amount, LedgerError>;

    fn house_balance(&self) -> Amount;

    fn credit_house(&mut self, amount: Amount) -> Result<Amount, LedgerError>;
}
