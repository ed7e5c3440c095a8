//! Transactions: immutable records of money moving in or out of an account.
//!
//! This module contains the `Transaction` model, the `TransactionBuilder` for
//! creating transactions, and the database functions for storing and querying
//! them.

mod core;

pub use core::{
    Transaction, TransactionBuilder, TransactionType, count_transactions, create_transaction,
    create_transaction_table, get_transaction, get_transactions_for_subscription,
};
