mod common;

use chrono::Utc;
use common::{PASSWORD, PIN, bank, flaky_bank};
use corebank::domain::money::Amount;
use corebank::domain::qr::{QrPayment, QrStatus};
use corebank::domain::transaction::{TransactionKind, TransactionStatus};
use corebank::error::LedgerError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_generate_issues_pending_payment() {
    let bank = bank();
    let (seller, seller_account) = bank.open_user("seller").await;

    let qr = bank
        .qr
        .generate(
            seller,
            dec!(25.0).try_into().unwrap(),
            Some("coffee".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(qr.seller_account, seller_account.id);
    assert_eq!(qr.status, QrStatus::Pending);
    assert!(qr.code.starts_with("QR_"));
    assert_eq!(qr.expires_at, qr.created_at + chrono::Duration::minutes(10));
    assert_eq!(qr.transaction, None);

    let stored = bank.qr.get(&qr.code).await.unwrap();
    assert_eq!(stored, qr);
}

#[tokio::test]
async fn test_redeem_pays_seller_and_completes_payment() {
    let bank = bank();
    let (seller, _) = bank.open_funded("seller", dec!(5.0)).await;
    let (buyer, _) = bank.open_funded("buyer", dec!(100.0)).await;

    let qr = bank
        .qr
        .generate(
            seller,
            dec!(25.0).try_into().unwrap(),
            Some("coffee".to_string()),
        )
        .await
        .unwrap();

    let receipt = bank
        .qr
        .redeem(buyer, &qr.code, PASSWORD, None)
        .await
        .unwrap();

    assert_eq!(receipt.status, TransactionStatus::Completed);
    assert_eq!(bank.balance_of(buyer).await, dec!(75.0));
    assert_eq!(bank.balance_of(seller).await, dec!(30.0));

    let completed = bank.qr.get(&qr.code).await.unwrap();
    assert_eq!(completed.status, QrStatus::Completed);
    assert_eq!(completed.transaction, Some(receipt.transaction));

    let record = bank
        .store
        .transaction(receipt.transaction)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.kind, TransactionKind::QrPayment);
    assert_eq!(record.description.as_deref(), Some("coffee"));
}

#[tokio::test]
async fn test_second_redeem_rejected() {
    let bank = bank();
    let (seller, _) = bank.open_user("seller").await;
    let (buyer, _) = bank.open_funded("buyer", dec!(100.0)).await;
    let (other, _) = bank.open_funded("other", dec!(100.0)).await;

    let qr = bank
        .qr
        .generate(seller, dec!(10.0).try_into().unwrap(), None)
        .await
        .unwrap();
    bank.qr.redeem(buyer, &qr.code, PASSWORD, None).await.unwrap();

    let err = bank
        .qr
        .redeem(other, &qr.code, PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyUsed));
    assert_eq!(bank.balance_of(other).await, dec!(100.0));
    assert_eq!(bank.balance_of(seller).await, dec!(10.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeem_has_single_winner() {
    let bank = bank();
    let (seller, _) = bank.open_user("seller").await;
    let (first, _) = bank.open_funded("first", dec!(50.0)).await;
    let (second, _) = bank.open_funded("second", dec!(50.0)).await;

    let qr = bank
        .qr
        .generate(seller, dec!(10.0).try_into().unwrap(), None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for buyer in [first, second] {
        let registry = bank.qr.clone();
        let code = qr.code.clone();
        handles.push(tokio::spawn(async move {
            registry.redeem(buyer, &code, PASSWORD, None).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(LedgerError::AlreadyUsed) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(bank.balance_of(seller).await, dec!(10.0));
    let spent = dec!(100.0) - bank.balance_of(first).await - bank.balance_of(second).await;
    assert_eq!(spent, dec!(10.0));
}

#[tokio::test]
async fn test_stale_payment_expires_on_redeem() {
    let bank = bank();
    let (_, seller_account) = bank.open_user("seller").await;
    let (buyer, _) = bank.open_funded("buyer", dec!(100.0)).await;

    // Issued 11 minutes ago with the standard 10 minute validity.
    let aged = QrPayment::issue(
        seller_account.id,
        Amount::new(dec!(10.0)).unwrap(),
        None,
        "QR_20260825_0ddba11e".to_string(),
        Utc::now() - chrono::Duration::minutes(11),
        chrono::Duration::minutes(10),
    );
    let mut uow = bank.store.begin().await.unwrap();
    uow.put_qr(aged.clone());
    uow.commit().await.unwrap();

    let err = bank
        .qr
        .redeem(buyer, &aged.code, PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Expired));
    assert_eq!(bank.balance_of(buyer).await, dec!(100.0));

    // Lazy expiry stuck: the row is now terminally EXPIRED.
    let stored = bank.qr.get(&aged.code).await.unwrap();
    assert_eq!(stored.status, QrStatus::Expired);

    // A later attempt sees a spent row, not a second expiry.
    let err = bank
        .qr
        .redeem(buyer, &aged.code, PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyUsed));
}

#[tokio::test]
async fn test_seller_cannot_redeem_own_code() {
    let bank = bank();
    let (seller, _) = bank.open_funded("seller", dec!(100.0)).await;

    let qr = bank
        .qr
        .generate(seller, dec!(10.0).try_into().unwrap(), None)
        .await
        .unwrap();

    let err = bank
        .qr
        .redeem(seller, &qr.code, PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::SelfTargetNotAllowed));
    assert_eq!(bank.qr.get(&qr.code).await.unwrap().status, QrStatus::Pending);
    assert_eq!(bank.balance_of(seller).await, dec!(100.0));
}

#[tokio::test]
async fn test_redeem_requires_primary_password() {
    let bank = bank();
    let (seller, _) = bank.open_user("seller").await;
    let (buyer, _) = bank.open_funded("buyer", dec!(100.0)).await;

    let qr = bank
        .qr
        .generate(seller, dec!(10.0).try_into().unwrap(), None)
        .await
        .unwrap();

    // The simple PIN is not enough to redeem.
    let err = bank.qr.redeem(buyer, &qr.code, PIN, None).await.unwrap_err();
    assert!(matches!(err, LedgerError::CredentialMismatch));
    assert_eq!(bank.qr.get(&qr.code).await.unwrap().status, QrStatus::Pending);

    bank.qr.redeem(buyer, &qr.code, PASSWORD, None).await.unwrap();
}

#[tokio::test]
async fn test_cancel_is_seller_only_and_terminal() {
    let bank = bank();
    let (seller, _) = bank.open_user("seller").await;
    let (buyer, _) = bank.open_funded("buyer", dec!(100.0)).await;
    let (stranger, _) = bank.open_user("stranger").await;

    let qr = bank
        .qr
        .generate(seller, dec!(10.0).try_into().unwrap(), None)
        .await
        .unwrap();

    // A non-owner cannot even see the payment, let alone void it.
    let err = bank.qr.cancel(stranger, &qr.code).await.unwrap_err();
    assert!(matches!(err, LedgerError::QrNotFound));

    let cancelled = bank.qr.cancel(seller, &qr.code).await.unwrap();
    assert_eq!(cancelled.status, QrStatus::Cancelled);

    let err = bank
        .qr
        .redeem(buyer, &qr.code, PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyUsed));
    assert_eq!(bank.balance_of(buyer).await, dec!(100.0));
}

#[tokio::test]
async fn test_unknown_code_not_found() {
    let bank = bank();
    let (buyer, _) = bank.open_funded("buyer", dec!(100.0)).await;

    let err = bank
        .qr
        .redeem(buyer, "QR_20260825_ffffffff", PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::QrNotFound));
}

#[tokio::test]
async fn test_failed_redeem_leaves_payment_retryable() {
    let (bank, store) = flaky_bank();
    let (seller, _) = bank.open_user("seller").await;
    let (buyer, _) = bank.open_funded("buyer", dec!(100.0)).await;

    let qr = bank
        .qr
        .generate(seller, dec!(10.0).try_into().unwrap(), None)
        .await
        .unwrap();

    store.arm();
    let err = bank
        .qr
        .redeem(buyer, &qr.code, PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));

    // Nothing moved, the payment is still open, and the failure is on
    // record for the buyer.
    assert_eq!(bank.balance_of(buyer).await, dec!(100.0));
    assert_eq!(bank.balance_of(seller).await, dec!(0.0));
    assert_eq!(bank.qr.get(&qr.code).await.unwrap().status, QrStatus::Pending);
    let failed: Vec<_> = bank
        .history_of(buyer)
        .await
        .into_iter()
        .filter(|r| r.status == TransactionStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, TransactionKind::QrPayment);

    let receipt = bank
        .qr
        .redeem(buyer, &qr.code, PASSWORD, None)
        .await
        .unwrap();
    assert_eq!(receipt.status, TransactionStatus::Completed);
    assert_eq!(bank.balance_of(buyer).await, dec!(90.0));
    assert_eq!(bank.balance_of(seller).await, dec!(10.0));
}

#[tokio::test]
async fn test_underfunded_buyer_leaves_payment_pending() {
    let bank = bank();
    let (seller, _) = bank.open_user("seller").await;
    let (buyer, _) = bank.open_user("buyer").await;

    let qr = bank
        .qr
        .generate(seller, dec!(10.0).try_into().unwrap(), None)
        .await
        .unwrap();

    let err = bank
        .qr
        .redeem(buyer, &qr.code, PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(bank.qr.get(&qr.code).await.unwrap().status, QrStatus::Pending);

    // Funding the buyer makes the same code redeemable.
    bank.settlement
        .self_deposit(buyer, dec!(50.0).try_into().unwrap(), None, PIN, None)
        .await
        .unwrap();
    bank.qr.redeem(buyer, &qr.code, PASSWORD, None).await.unwrap();
    assert_eq!(bank.balance_of(seller).await, dec!(10.0));
}
