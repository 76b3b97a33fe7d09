//! Unit-of-work wrapper around a database transaction.

use std::future::Future;
use std::pin::Pin;

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use crate::error::AppResult;

pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'c>>;

/// Runs `work` inside a transaction: commit on `Ok`, rollback on `Err`.
///
/// The closure receives the transaction handle and must do every write
/// through it. Anything that must not roll back with the business change
/// (cache, notifications) belongs after this call returns.
pub async fn run_in_transaction<F, T>(
    db: &DatabaseConnection,
    label: &'static str,
    work: F,
) -> AppResult<T>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> TxFuture<'c, T> + Send,
    T: Send,
{
    let txn = db.begin().await?;
    let outcome = work(&txn).await;
    match outcome {
        Ok(value) => {
            txn.commit().await?;
            tracing::debug!(unit = label, "transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::warn!(unit = label, error = %rollback_err, "rollback failed");
            }
            tracing::debug!(unit = label, error = %err, "transaction rolled back");
            Err(err)
        }
    }
}
