//! Fund pool ledger integration tests
//!
//! Exercise the service directly against the database, including the
//! concurrent-adjustment guarantees of the conditional update.

use fundpool::domain::{Delta, Identity, OperationContext, Role};
use fundpool::fund_pool::FundPoolService;
use fundpool::{AppError, DomainError};

mod common;

fn admin() -> Identity {
    Identity::new(common::admin_user_id(), Role::Admin)
}

fn context() -> OperationContext {
    OperationContext::new().with_user(common::admin_user_id())
}

async fn audit_count(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE action = 'fund_pool.adjusted'")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_delta_sequence_sums_and_audits() {
    let _guard = common::DB_LOCK.lock().await;
    let pool = common::setup_test_db().await;
    let service = FundPoolService::new(pool.clone());

    let balance = service
        .apply_delta(&admin(), Delta::new(100).unwrap(), None, &context())
        .await
        .unwrap();
    assert_eq!(balance, 100);

    let balance = service
        .apply_delta(
            &admin(),
            Delta::new(50).unwrap(),
            Some("grant".to_string()),
            &context(),
        )
        .await
        .unwrap();
    assert_eq!(balance, 150);

    // Overdraw leaves the balance unchanged and writes no audit entry
    let result = service
        .apply_delta(
            &admin(),
            Delta::new(-200).unwrap(),
            Some("big withdrawal".to_string()),
            &context(),
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::Domain(DomainError::InsufficientFunds {
            balance: 150,
            delta: -200
        }))
    ));

    let state = service.get_balance().await.unwrap();
    assert_eq!(state.balance, 150);
    assert_eq!(state.updated_by.unwrap().id, common::admin_user_id());

    assert_eq!(audit_count(&pool).await, 2);

    // The latest entry captures {from, delta, to, note}
    let changes: serde_json::Value = sqlx::query_scalar(
        "SELECT changes FROM audit_logs WHERE action = 'fund_pool.adjusted' \
         ORDER BY created_at DESC LIMIT 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(changes["from"], 100);
    assert_eq!(changes["delta"], 50);
    assert_eq!(changes["to"], 150);
    assert_eq!(changes["note"], "grant");
}

#[tokio::test]
async fn test_first_withdrawal_on_unset_pool_rejected() {
    let _guard = common::DB_LOCK.lock().await;
    let pool = common::setup_test_db().await;
    let service = FundPoolService::new(pool.clone());

    let result = service
        .apply_delta(&admin(), Delta::new(-10).unwrap(), None, &context())
        .await;

    assert!(matches!(
        result,
        Err(AppError::Domain(DomainError::InsufficientFunds {
            balance: 0,
            delta: -10
        }))
    ));

    assert_eq!(service.get_balance().await.unwrap().balance, 0);
    assert_eq!(audit_count(&pool).await, 0);
}

#[tokio::test]
async fn test_non_admin_cannot_adjust() {
    let _guard = common::DB_LOCK.lock().await;
    let pool = common::setup_test_db().await;
    let service = FundPoolService::new(pool.clone());

    let user = Identity::new(common::user_id(), Role::User);
    let result = service
        .apply_delta(&user, Delta::new(100).unwrap(), None, &context())
        .await;

    assert!(matches!(result, Err(AppError::PermissionDenied)));
    assert_eq!(service.get_balance().await.unwrap().balance, 0);
    assert_eq!(audit_count(&pool).await, 0);
}

#[tokio::test]
async fn test_concurrent_credits_lose_no_updates() {
    let _guard = common::DB_LOCK.lock().await;
    let pool = common::setup_test_db().await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = FundPoolService::new(pool.clone());
        handles.push(tokio::spawn(async move {
            service
                .apply_delta(&admin(), Delta::new(10).unwrap(), None, &context())
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let service = FundPoolService::new(pool.clone());
    assert_eq!(service.get_balance().await.unwrap().balance, 100);
    assert_eq!(audit_count(&pool).await, 10);
}

#[tokio::test]
async fn test_concurrent_overdraw_has_single_winner() {
    let _guard = common::DB_LOCK.lock().await;
    let pool = common::setup_test_db().await;

    let service = FundPoolService::new(pool.clone());
    service
        .apply_delta(&admin(), Delta::new(50).unwrap(), None, &context())
        .await
        .unwrap();

    // Two concurrent -40s against a balance of 50: exactly one may win.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = FundPoolService::new(pool.clone());
        handles.push(tokio::spawn(async move {
            service
                .apply_delta(&admin(), Delta::new(-40).unwrap(), None, &context())
                .await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Domain(DomainError::InsufficientFunds { .. })) => rejections += 1,
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(rejections, 1);

    assert_eq!(service.get_balance().await.unwrap().balance, 10);
}
