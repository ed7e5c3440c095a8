//! Accounts: the currency buckets that subscriptions bill to.

mod core;

pub use core::{
    Account, create_account, create_account_table, delete_account, get_account, get_accounts,
};
