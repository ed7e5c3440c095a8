//! Subscriptions: recurring payments that bill an account on a fixed interval.
//!
//! This module contains the `Subscription` model and its schedule arithmetic,
//! the database functions for storing and querying subscriptions, the daily
//! billing engine, and the create and edit flows.

mod billing;
mod core;
mod db;
mod manage;

pub use billing::{
    BilledSubscription, BillingReport, Charge, FailedSubscription, bill_subscription,
    process_due_subscriptions, quote_charge,
};
pub use core::{BillingStatus, IntervalUnit, NewSubscription, Subscription, next_run_date};
pub use db::{
    advance_schedule, create_subscription_table, delete_subscription, get_due_subscriptions,
    get_overdue_subscriptions, get_subscription, get_subscriptions, insert_subscription,
    update_subscription,
};
pub use manage::{SubscriptionChanges, create_subscription, edit_subscription};
