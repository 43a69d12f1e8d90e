//! Integration tests for nested transactions and savepoints.

mod common;

use std::time::Duration;

use common::{Item, count_items, sqlite_db};
use pretty_assertions::assert_eq;
use tandem::prelude::*;
use tandem::testing::rollback_scope;
use tandem::ErrorCode;

fn set_value(id: Option<i64>, value: &str) -> Update<Item> {
    Update::<Item>::new().set("value", value).filter(col("id").eq(id))
}

#[tokio::test]
async fn test_inner_failure_rolls_back_to_savepoint() {
    let db = sqlite_db(2).await;
    let ctx = db.context();

    let outer = ctx.atomic().await.unwrap();
    let id = ctx.create(Item::new("a", "FOO")).await.unwrap().id;

    let result: Result<(), QueryError> = ctx
        .atomic_with(|ctx: ConnectionContext| async move {
            ctx.update_where(&set_value(id, "BAR")).await?;
            Err(QueryError::database("boom"))
        })
        .await;
    assert_eq!(result.unwrap_err().message, "boom");
    assert_eq!(ctx.depth(), 1);

    let stored: Item = ctx.get_by_id(id).await.unwrap();
    assert_eq!(stored.value, "FOO");

    outer.commit().await.unwrap();
    let stored: Item = db.get_by_id(id).await.unwrap();
    assert_eq!(stored.value, "FOO");
}

#[tokio::test]
async fn test_outer_rollback_reverts_released_savepoint() {
    let db = sqlite_db(2).await;
    let ctx = db.context();

    let outer = ctx.atomic().await.unwrap();
    let id = ctx.create(Item::new("a", "FOO")).await.unwrap().id;
    ctx.atomic_with(|ctx: ConnectionContext| async move {
        ctx.update_where(&set_value(id, "BAR")).await
    })
    .await
    .unwrap();

    let stored: Item = ctx.get_by_id(id).await.unwrap();
    assert_eq!(stored.value, "BAR");

    outer.rollback().await.unwrap();
    assert_eq!(count_items(&db).await, 0);
}

#[tokio::test]
async fn test_nested_levels_unwind_in_order() {
    let db = sqlite_db(1).await;
    let ctx = db.context();

    let first = ctx.atomic().await.unwrap();
    let second = ctx.atomic().await.unwrap();
    let third = ctx.atomic().await.unwrap();
    assert_eq!((first.depth(), second.depth(), third.depth()), (1, 2, 3));
    assert_eq!(ctx.depth(), 3);

    ctx.create(Item::new("deep", "x")).await.unwrap();
    third.commit().await.unwrap();
    second.rollback().await.unwrap();
    assert_eq!(ctx.depth(), 1);
    first.commit().await.unwrap();

    assert_eq!(ctx.depth(), 0);
    assert!(!ctx.is_connected());
    assert_eq!(count_items(&db).await, 0);
}

#[tokio::test]
async fn test_out_of_order_close_is_rejected() {
    let db = sqlite_db(1).await;
    let ctx = db.context();

    let outer = ctx.atomic().await.unwrap();
    let inner = ctx.atomic().await.unwrap();

    let err = outer.commit().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TransactionOrder);
    assert_eq!(ctx.depth(), 0);

    let err = inner.commit().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NoActiveTransaction);
}

#[tokio::test]
async fn test_transaction_rejects_nesting() {
    let db = sqlite_db(1).await;
    let ctx = db.context();

    let tx = ctx.transaction().await.unwrap();
    let err = ctx.transaction().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NestedTransaction);
    tx.commit().await.unwrap();

    let handle = db.db.clone();
    let err = db
        .atomic_with(|_ctx: ConnectionContext| async move {
            handle
                .transaction_with(|_ctx: ConnectionContext| async move { Ok::<_, QueryError>(()) })
                .await
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NestedTransaction);
    assert_eq!(count_items(&db).await, 0);
}

#[tokio::test]
async fn test_manual_transaction() {
    let db = sqlite_db(1).await;
    let ctx = db.context();
    let mut tx = ctx.manual().await.unwrap();

    let err = tx.commit().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NoActiveTransaction);

    tx.begin().await.unwrap();
    ctx.create(Item::new("kept", "1")).await.unwrap();
    tx.begin().await.unwrap();
    ctx.create(Item::new("dropped", "2")).await.unwrap();
    assert_eq!(tx.depth(), 2);

    tx.rollback().await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(tx.depth(), 0);
    assert_eq!(tx.rollback().await.unwrap_err().code, ErrorCode::NoActiveTransaction);
    drop(tx);

    let names: Vec<String> = db
        .select(&Select::<Item>::new())
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.name)
        .collect();
    assert_eq!(names, vec!["kept".to_string()]);
}

#[tokio::test]
async fn test_database_begin_commit() {
    let db = sqlite_db(1).await;
    assert_eq!(db.commit().await.unwrap_err().code, ErrorCode::NoActiveTransaction);

    db.scope(async {
        db.context().begin().await.unwrap();
        db.create(Item::new("scoped", "1")).await.unwrap();
        db.rollback().await.unwrap();
        assert_eq!(db.rollback().await.unwrap_err().code, ErrorCode::NoActiveTransaction);
    })
    .await;
    assert_eq!(count_items(&db).await, 0);

    let mut tx = db.begin().await.unwrap();
    tx.scope().context().create(Item::new("manual", "1")).await.unwrap();
    tx.commit().await.unwrap();
    drop(tx);
    assert_eq!(count_items(&db).await, 1);
}

#[tokio::test]
async fn test_dropped_guard_rolls_back() {
    let db = sqlite_db(1).await;
    let ctx = db.context();
    let _held = ctx.acquire().await.unwrap();

    {
        let _tx = ctx.atomic().await.unwrap();
        ctx.create(Item::new("ghost", "1")).await.unwrap();
    }
    assert_eq!(ctx.depth(), 0);
    assert_eq!(ctx.count(&Select::<Item>::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancelled_scope_rolls_back_and_discards() {
    let db = sqlite_db(2).await;
    let ctx = db.context();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        ctx.atomic_with(|ctx: ConnectionContext| async move {
            ctx.create(Item::new("late", "1")).await?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, QueryError>(())
        }),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(ctx.depth(), 0);
    assert!(!ctx.is_connected());
    assert_eq!(count_items(&db).await, 0);
}

#[tokio::test]
async fn test_close_mid_transaction() {
    let db = sqlite_db(2).await;
    let ctx = db.context();

    let tx = ctx.atomic().await.unwrap();
    ctx.create(Item::new("orphan", "1")).await.unwrap();
    db.close();

    let err = tx.commit().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NoActiveTransaction);
    assert_eq!(ctx.depth(), 0);
    assert_eq!(ctx.rollback().await.unwrap_err().code, ErrorCode::NoActiveTransaction);

    db.connect().await.unwrap();
    assert_eq!(count_items(&db).await, 0);
}

#[tokio::test]
async fn test_rollback_scope() {
    let db = sqlite_db(1).await;
    let handle = db.db.clone();
    let found = rollback_scope(&db, |ctx: ConnectionContext| async move {
        handle.create(Item::new("temp", "1")).await?;
        let err = ctx.atomic().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionsDisabled);

        let (_, created) = handle
            .get_or_create(&Select::<Item>::new().filter(col("name").eq("temp")), Item::new("temp", "2"))
            .await?;
        assert!(!created);
        ctx.count(&Select::<Item>::new()).await
    })
    .await
    .unwrap();
    assert_eq!(found, 1);
    assert_eq!(count_items(&db).await, 0);
}

#[tokio::test]
async fn test_isolation_config() {
    let db = sqlite_db(1).await;
    let ctx = db.context();
    let tx = ctx
        .atomic_with_config(TransactionConfig::new().isolation(tandem::IsolationLevel::Serializable))
        .await
        .unwrap();
    ctx.create(Item::new("exclusive", "1")).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(count_items(&db).await, 1);
}
