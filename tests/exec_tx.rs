//! Transaction executor: commit, rollback and failure reporting

mod common;

use std::time::Duration;

use common::{create_account, new_store};
use simple_bank::db::{CreateEntryParams, ErrorKind, ListEntriesParams, StoreError};

#[tokio::test]
async fn test_ok_commits_all_writes() {
    let store = new_store();
    let account = create_account(&store, 100, "USD").await;
    let id = account.id;

    let entry = store
        .exec_tx(move |q| {
            Box::pin(async move {
                q.add_account_balance(id, 25).await?;
                q.create_entry(CreateEntryParams {
                    account_id: id,
                    amount: 25,
                })
                .await
            })
        })
        .await
        .unwrap();

    assert_eq!(store.get_account(id).await.unwrap().balance, 125);
    let entries = store
        .exec_tx(move |q| {
            q.list_entries(ListEntriesParams {
                account_id: id,
                limit: 10,
                offset: 0,
            })
        })
        .await
        .unwrap();
    assert_eq!(entries, vec![entry]);
}

#[tokio::test]
async fn test_err_discards_all_writes() {
    let store = new_store();
    let account = create_account(&store, 100, "USD").await;
    let id = account.id;

    let err = store
        .exec_tx(move |q| {
            Box::pin(async move {
                q.add_account_balance(id, 25).await?;
                q.create_entry(CreateEntryParams {
                    account_id: id,
                    amount: 25,
                })
                .await?;
                // Fails after two successful writes
                q.get_account(id + 1_000).await
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::NotFound("account")));
    assert_eq!(store.get_account(id).await.unwrap().balance, 100);
    let entries = store
        .exec_tx(move |q| {
            q.list_entries(ListEntriesParams {
                account_id: id,
                limit: 10,
                offset: 0,
            })
        })
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_rollback_failure_reports_both_errors() {
    let store = new_store();
    let account = create_account(&store, 100, "USD").await;
    let id = account.id;

    store.backend().set_fail_rollback(true);
    let err = store
        .exec_tx(move |q| {
            Box::pin(async move {
                let updated = q.add_account_balance(id, -150).await?;
                Err::<(), _>(StoreError::InsufficientBalance {
                    account_id: id,
                    balance: updated.balance,
                    amount: 150,
                })
            })
        })
        .await
        .unwrap_err();

    match &err {
        StoreError::Rollback { source, rollback } => {
            assert!(matches!(**source, StoreError::InsufficientBalance { .. }));
            assert_eq!(rollback.kind(), ErrorKind::StorageError);
        }
        other => panic!("expected combined rollback error, got {other}"),
    }
    // Classification follows the unit of work, not the rollback
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert!(err.to_string().contains("rollback also failed"));

    assert_eq!(store.get_account(id).await.unwrap().balance, 100);
}

#[tokio::test]
async fn test_commit_failure_is_reported_and_writes_invisible() {
    let store = new_store();
    let account = create_account(&store, 100, "USD").await;
    let id = account.id;

    store.backend().set_fail_commit(true);
    let err = store
        .exec_tx(move |q| q.add_account_balance(id, 40))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Storage(_)));
    assert!(err.is_retryable());
    assert_eq!(store.get_account(id).await.unwrap().balance, 100);

    // Fault was one-shot; the retry goes through
    let updated = store
        .exec_tx(move |q| q.add_account_balance(id, 40))
        .await
        .unwrap();
    assert_eq!(updated.balance, 140);
}

#[tokio::test]
async fn test_timeout_rolls_back_and_releases_locks() {
    let store = new_store().with_tx_timeout(Duration::from_millis(50));
    let account = create_account(&store, 100, "USD").await;
    let id = account.id;

    let err = store
        .exec_tx(move |q| {
            Box::pin(async move {
                q.add_account_balance(id, -10).await?;
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Timeout(d) if d == Duration::from_millis(50)));
    assert_eq!(err.kind(), ErrorKind::StorageError);

    // Row lock from the abandoned scope is gone
    let updated = tokio::time::timeout(
        Duration::from_secs(1),
        store.exec_tx(move |q| q.add_account_balance(id, -10)),
    )
    .await
    .expect("row lock leaked past timeout")
    .unwrap();
    assert_eq!(updated.balance, 90);
}
