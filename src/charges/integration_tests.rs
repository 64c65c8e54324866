//! Integration Tests for the charge coordinators
//!
//! Full flows against the in-memory ledger, the memory reservation cache and
//! a scripted balance authority.

#[cfg(test)]
mod integration_tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use crate::authority::{BalanceAuthority, MockAuthority};
    use crate::breaker::{BreakerState, Settings};
    use crate::charges::{ChargeService, ReadCoordinator, WithdrawalCoordinator};
    use crate::error::ChargeError;
    use crate::ledger::{LedgerStore, MemoryLedger};
    use crate::models::{Balance, ChargeType, NewCharge, WithdrawRequest};
    use crate::reservation::{MemoryReservationCache, ReservationCache};

    const ACCOUNT: &str = "ACC-1";
    const BALANCE_ID: i64 = 7;

    struct TestHarness {
        coordinator: Arc<WithdrawalCoordinator>,
        ledger: MemoryLedger,
        cache: Arc<MemoryReservationCache>,
        authority: Arc<MockAuthority>,
    }

    impl TestHarness {
        fn new(balance: i64) -> Self {
            Self::with_deadline(balance, Duration::from_secs(30))
        }

        fn with_deadline(balance: i64, deadline: Duration) -> Self {
            let ledger = MemoryLedger::new();
            let cache = Arc::new(MemoryReservationCache::new(Duration::from_secs(60)));
            let authority = Arc::new(MockAuthority::new().with_balance(ACCOUNT, BALANCE_ID, balance));
            let coordinator = Arc::new(WithdrawalCoordinator::new(
                Arc::new(ledger.clone()),
                cache.clone(),
                authority.clone(),
                deadline,
            ));
            Self {
                coordinator,
                ledger,
                cache,
                authority,
            }
        }

        async fn reserved(&self) -> Decimal {
            self.cache.peek(ACCOUNT).await.unwrap()
        }
    }

    fn withdraw_req(amount: i64) -> WithdrawRequest {
        WithdrawRequest {
            account_id: ACCOUNT.to_string(),
            amount: Decimal::from(amount),
            currency: "BRL".to_string(),
            tenant_id: "TENANT-1".to_string(),
        }
    }

    /// Lets background releases spawned from dropped guards run
    async fn settle_background() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    // ========================================================================
    // Withdrawal
    // ========================================================================

    #[tokio::test]
    async fn test_successful_withdrawal() {
        let harness = TestHarness::new(100);

        let record = harness.coordinator.withdraw(withdraw_req(-30)).await.unwrap();

        assert_eq!(record.fk_balance_id, BALANCE_ID);
        assert_eq!(record.charge_type, ChargeType::Debit);
        assert_eq!(record.amount, Decimal::from(-30));
        assert_eq!(harness.ledger.records().len(), 1);
        assert_eq!(harness.ledger.commit_count(), 1);
        assert_eq!(harness.ledger.rollback_count(), 0);

        let applied = harness.authority.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].1.amount, Decimal::from(70));
        assert_eq!(applied[0].1.balance_id, BALANCE_ID);

        assert_eq!(harness.reserved().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_serial_withdrawals_second_is_insufficient() {
        let harness = TestHarness::new(100);

        harness.coordinator.withdraw(withdraw_req(-80)).await.unwrap();
        let err = harness.coordinator.withdraw(withdraw_req(-80)).await.unwrap_err();

        assert_eq!(err, ChargeError::InsufficientFunds);
        assert_eq!(harness.ledger.records().len(), 1);
        assert_eq!(harness.ledger.rollback_count(), 1);
        assert_eq!(harness.authority.applied().len(), 1);
        assert_eq!(harness.authority.amount(ACCOUNT), Some(Decimal::from(20)));
        assert_eq!(harness.reserved().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_overlapping_withdrawal_sees_inflight_reservation() {
        let harness = TestHarness::new(100);
        // first withdrawal of 80 still in flight
        harness.cache.reserve(ACCOUNT, Decimal::from(-80)).await.unwrap();

        let err = harness.coordinator.withdraw(withdraw_req(-80)).await.unwrap_err();

        assert_eq!(err, ChargeError::InsufficientFunds);
        assert!(harness.ledger.records().is_empty());
        assert_eq!(harness.ledger.rollback_count(), 1);
        assert!(harness.authority.applied().is_empty());
        // counter back to its pre-call value
        assert_eq!(harness.reserved().await, Decimal::from(-80));
    }

    #[tokio::test]
    async fn test_authority_push_failure_rolls_back() {
        let harness = TestHarness::new(100);
        harness.authority.set_fail_apply(true);

        let err = harness.coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();

        assert!(matches!(err, ChargeError::Authority(_)));
        assert!(harness.ledger.records().is_empty());
        assert_eq!(harness.ledger.commit_count(), 0);
        assert_eq!(harness.ledger.rollback_count(), 1);
        assert_eq!(harness.reserved().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_account_surfaces_balance_not_found() {
        let harness = TestHarness::new(100);
        let mut req = withdraw_req(-10);
        req.account_id = "ACC-404".to_string();

        let err = harness.coordinator.withdraw(req).await.unwrap_err();

        assert_eq!(err, ChargeError::BalanceNotFound("ACC-404".to_string()));
        assert_eq!(harness.ledger.rollback_count(), 1);
        assert_eq!(harness.cache.peek("ACC-404").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_begin_failure_takes_no_reservation() {
        let harness = TestHarness::new(100);
        harness.ledger.set_fail_begin(true);

        let err = harness.coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();

        assert!(matches!(err, ChargeError::TransactionStartFailed(_)));
        assert_eq!(harness.authority.get_count(), 0);
        assert!(harness.cache.is_empty());
    }

    #[tokio::test]
    async fn test_insert_failure_skips_push() {
        let harness = TestHarness::new(100);
        harness.ledger.set_fail_insert(true);

        let err = harness.coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();

        assert!(matches!(err, ChargeError::WriteFailed(_)));
        assert!(harness.authority.applied().is_empty());
        assert_eq!(harness.ledger.rollback_count(), 1);
        assert_eq!(harness.reserved().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_commit_failure_compensates_authority() {
        let harness = TestHarness::new(100);
        harness.ledger.set_fail_commit(true);

        let err = harness.coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();

        assert!(matches!(err, ChargeError::Internal(_)));
        assert!(harness.ledger.records().is_empty());

        let applied = harness.authority.applied();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].1.amount, Decimal::from(70));
        assert_eq!(applied[1].1.amount, Decimal::from(100));
        assert_eq!(harness.authority.amount(ACCOUNT), Some(Decimal::from(100)));
        assert_eq!(harness.reserved().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_zero_amount_rejected_before_io() {
        let harness = TestHarness::new(100);

        let err = harness.coordinator.withdraw(withdraw_req(0)).await.unwrap_err();

        assert_eq!(err, ChargeError::InvalidAmount);
        assert_eq!(harness.authority.get_count(), 0);
        assert!(harness.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_flow_and_releases() {
        let harness = TestHarness::with_deadline(100, Duration::from_secs(30));
        harness.authority.set_get_delay(Some(Duration::from_secs(60)));

        let err = harness.coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();
        assert_eq!(err, ChargeError::DeadlineExceeded("withdraw"));

        settle_background().await;
        assert_eq!(harness.reserved().await, Decimal::ZERO);
        assert!(harness.ledger.records().is_empty());
        assert!(harness.authority.applied().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_withdrawals_net_counter_to_zero() {
        let harness = TestHarness::new(1_000_000);

        let mut handles = Vec::new();
        for i in 0..50 {
            let coordinator = harness.coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.withdraw(withdraw_req(-(i % 5 + 1))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(harness.ledger.records().len(), 50);
        assert_eq!(harness.reserved().await, Decimal::ZERO);
    }

    // ========================================================================
    // Cancellation inside reserve
    // ========================================================================

    /// Applies the increment, then stalls before acknowledging it
    struct SlowAckCache {
        inner: MemoryReservationCache,
        stall: Duration,
    }

    #[async_trait]
    impl ReservationCache for SlowAckCache {
        async fn reserve(&self, account_id: &str, amount: Decimal) -> Result<(), ChargeError> {
            self.inner.reserve(account_id, amount).await?;
            tokio::time::sleep(self.stall).await;
            Ok(())
        }

        async fn peek(&self, account_id: &str) -> Result<Decimal, ChargeError> {
            self.inner.peek(account_id).await
        }

        async fn release(&self, account_id: &str, amount: Decimal) -> Result<(), ChargeError> {
            self.inner.release(account_id, amount).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_reserve_still_releases() {
        let cache = Arc::new(SlowAckCache {
            inner: MemoryReservationCache::new(Duration::from_secs(60)),
            stall: Duration::from_secs(60),
        });
        let ledger = MemoryLedger::new();
        let authority = Arc::new(MockAuthority::new().with_balance(ACCOUNT, BALANCE_ID, 100));
        let coordinator = WithdrawalCoordinator::new(
            Arc::new(ledger.clone()),
            cache.clone(),
            authority.clone(),
            Duration::from_secs(30),
        );

        let err = coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();
        assert_eq!(err, ChargeError::DeadlineExceeded("withdraw"));

        settle_background().await;
        assert_eq!(cache.peek(ACCOUNT).await.unwrap(), Decimal::ZERO);
        assert!(ledger.records().is_empty());
        assert!(authority.applied().is_empty());
    }

    /// Refuses every reserve without applying it
    struct RefusingCache {
        inner: MemoryReservationCache,
    }

    #[async_trait]
    impl ReservationCache for RefusingCache {
        async fn reserve(&self, _account_id: &str, _amount: Decimal) -> Result<(), ChargeError> {
            Err(ChargeError::CacheUnavailable("connection refused".to_string()))
        }

        async fn peek(&self, account_id: &str) -> Result<Decimal, ChargeError> {
            self.inner.peek(account_id).await
        }
    }

    #[tokio::test]
    async fn test_refused_reserve_rolls_back_without_release() {
        let cache = Arc::new(RefusingCache {
            inner: MemoryReservationCache::new(Duration::from_secs(60)),
        });
        let ledger = MemoryLedger::new();
        let authority = Arc::new(MockAuthority::new().with_balance(ACCOUNT, BALANCE_ID, 100));
        let coordinator = WithdrawalCoordinator::new(
            Arc::new(ledger.clone()),
            cache.clone(),
            authority.clone(),
            Duration::from_secs(30),
        );

        let err = coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();
        settle_background().await;

        assert!(matches!(err, ChargeError::CacheUnavailable(_)));
        assert_eq!(ledger.rollback_count(), 1);
        assert_eq!(authority.get_count(), 0);
        assert_eq!(cache.peek(ACCOUNT).await.unwrap(), Decimal::ZERO);
    }

    // ========================================================================
    // Compensation
    // ========================================================================

    /// Lets another flow debit the account right after each first push lands
    struct RacingAuthority {
        inner: Arc<MockAuthority>,
        rival_debit: i64,
        raced: AtomicBool,
    }

    #[async_trait]
    impl BalanceAuthority for RacingAuthority {
        async fn get_balance(&self, account_id: &str) -> Result<Balance, ChargeError> {
            self.inner.get_balance(account_id).await
        }

        async fn apply_balance(&self, account_id: &str, balance: &Balance) -> Result<(), ChargeError> {
            self.inner.apply_balance(account_id, balance).await?;
            if !self.raced.swap(true, Ordering::SeqCst) {
                let rival = Balance {
                    amount: balance.amount - Decimal::from(self.rival_debit),
                    ..balance.clone()
                };
                self.inner.apply_balance(account_id, &rival).await?;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_compensation_keeps_concurrent_push() {
        let ledger = MemoryLedger::new();
        ledger.set_fail_commit(true);
        let inner = Arc::new(MockAuthority::new().with_balance(ACCOUNT, BALANCE_ID, 100));
        let coordinator = WithdrawalCoordinator::new(
            Arc::new(ledger.clone()),
            Arc::new(MemoryReservationCache::new(Duration::from_secs(60))),
            Arc::new(RacingAuthority {
                inner: inner.clone(),
                rival_debit: 20,
                raced: AtomicBool::new(false),
            }),
            Duration::from_secs(30),
        );

        let err = coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();

        assert!(matches!(err, ChargeError::Internal(_)));
        // 100 - 30 pushed, rival takes 20, only our 30 is given back
        assert_eq!(inner.amount(ACCOUNT), Some(Decimal::from(80)));
    }

    // ========================================================================
    // Release failures
    // ========================================================================

    /// Reserves normally but refuses every release
    struct StuckCache {
        inner: MemoryReservationCache,
    }

    #[async_trait]
    impl ReservationCache for StuckCache {
        async fn reserve(&self, account_id: &str, amount: Decimal) -> Result<(), ChargeError> {
            self.inner.reserve(account_id, amount).await
        }

        async fn peek(&self, account_id: &str) -> Result<Decimal, ChargeError> {
            self.inner.peek(account_id).await
        }

        async fn release(&self, _account_id: &str, _amount: Decimal) -> Result<(), ChargeError> {
            Err(ChargeError::CacheUnavailable("release refused".to_string()))
        }
    }

    fn stuck_coordinator(authority: Arc<MockAuthority>) -> WithdrawalCoordinator {
        WithdrawalCoordinator::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(StuckCache {
                inner: MemoryReservationCache::new(Duration::from_secs(60)),
            }),
            authority,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_release_failure_does_not_mask_error() {
        let authority = Arc::new(MockAuthority::new().with_balance(ACCOUNT, BALANCE_ID, 100));
        authority.set_fail_get(true);
        let coordinator = stuck_coordinator(authority);

        let err = coordinator.withdraw(withdraw_req(-30)).await.unwrap_err();

        assert!(matches!(err, ChargeError::Authority(_)));
    }

    #[tokio::test]
    async fn test_release_failure_does_not_fail_success() {
        let authority = Arc::new(MockAuthority::new().with_balance(ACCOUNT, BALANCE_ID, 100));
        let coordinator = stuck_coordinator(authority.clone());

        let record = coordinator.withdraw(withdraw_req(-30)).await.unwrap();

        assert_eq!(record.amount, Decimal::from(-30));
        assert_eq!(authority.amount(ACCOUNT), Some(Decimal::from(70)));
    }

    // ========================================================================
    // Guarded reads
    // ========================================================================

    fn reader(ledger: &MemoryLedger) -> ReadCoordinator {
        ReadCoordinator::new(Arc::new(ledger.clone()), Settings::new("test-reader"))
    }

    fn charge(amount: i64) -> NewCharge {
        NewCharge {
            account_id: ACCOUNT.to_string(),
            fk_balance_id: BALANCE_ID,
            charge_type: ChargeType::from_amount(Decimal::from(amount)),
            amount: Decimal::from(amount),
            currency: "BRL".to_string(),
            tenant_id: "TENANT-1".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_read_pending_then_recovers() {
        let ledger = MemoryLedger::new();
        let record = ledger.insert(charge(-10)).await.unwrap();
        let reader = reader(&ledger);

        ledger.set_fail_reads(true);
        for _ in 0..3 {
            let err = reader.get_guarded(record.id).await.unwrap_err();
            assert!(matches!(err, ChargeError::Internal(_)));
        }
        assert_eq!(reader.breaker_state(), BreakerState::Open);
        assert_eq!(
            reader.get_guarded(record.id).await.unwrap_err(),
            ChargeError::Pending
        );

        ledger.set_fail_reads(false);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(reader.breaker_state(), BreakerState::HalfOpen);

        let found = reader.get_guarded(record.id).await.unwrap();
        assert_eq!(found.id, record.id);
        assert_eq!(reader.breaker_state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_guarded_not_found_never_trips() {
        let ledger = MemoryLedger::new();
        let reader = reader(&ledger);

        for _ in 0..5 {
            assert_eq!(
                reader.get_guarded(999).await.unwrap_err(),
                ChargeError::NotFound(999)
            );
        }
        assert_eq!(reader.breaker_state(), BreakerState::Closed);
    }

    // ========================================================================
    // Charge service
    // ========================================================================

    fn service(harness: &TestHarness) -> ChargeService {
        ChargeService::new(
            Arc::new(harness.ledger.clone()),
            harness.cache.clone(),
            harness.authority.clone(),
        )
    }

    #[tokio::test]
    async fn test_add_credits_without_reservation() {
        let harness = TestHarness::new(100);
        let service = service(&harness);
        let mut credit = charge(50);
        credit.fk_balance_id = 0;

        let record = service.add(credit).await.unwrap();

        assert_eq!(record.fk_balance_id, BALANCE_ID);
        assert_eq!(record.charge_type, ChargeType::Credit);
        assert_eq!(harness.authority.amount(ACCOUNT), Some(Decimal::from(150)));
        assert!(harness.cache.is_empty());
        assert_eq!(service.get(record.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_list_by_account_newest_first() {
        let harness = TestHarness::new(100);
        let service = service(&harness);

        let first = service.add(charge(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = harness.coordinator.withdraw(withdraw_req(-10)).await.unwrap();

        let records = service.list_by_account(ACCOUNT).await.unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(
            service.list_by_account("ACC-404").await.unwrap_err(),
            ChargeError::BalanceNotFound("ACC-404".to_string())
        );
    }

    #[tokio::test]
    async fn test_peek_reservation_reports_inflight_total() {
        let harness = TestHarness::new(100);
        let service = service(&harness);
        assert_eq!(service.peek_reservation(ACCOUNT).await.unwrap(), Decimal::ZERO);

        harness.cache.reserve(ACCOUNT, Decimal::new(-125, 1)).await.unwrap();
        assert_eq!(
            service.peek_reservation(ACCOUNT).await.unwrap(),
            Decimal::new(-125, 1)
        );
    }
}
