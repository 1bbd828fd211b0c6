//! Test harness over the in-memory store.
//!
//! Every test gets a fresh store, a recording notifier, a scripted payment
//! gateway and a clock that only moves when the test moves it.

use std::sync::Arc;

use booking_core::kernel::{
    FixedClock, MemoryBookingStore, MockPaymentGateway, ServerDeps, TestDependencies, TestNotifier,
};
use test_context::AsyncTestContext;

/// Test harness that wires `ServerDeps` over test doubles.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let result = book(&ctx.deps, occurrence_id, student_id).await;
/// }
/// ```
pub struct TestHarness {
    pub deps: ServerDeps,
    pub mocks: TestDependencies,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::with(TestDependencies::new())
    }

    async fn teardown(self) {}
}

impl TestHarness {
    /// Harness over custom doubles, e.g. a gateway with scripted receipts.
    pub fn with(mocks: TestDependencies) -> Self {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        Self {
            deps: mocks.server_deps(),
            mocks,
        }
    }

    pub fn store(&self) -> &Arc<MemoryBookingStore> {
        &self.mocks.store
    }

    pub fn notifier(&self) -> &Arc<TestNotifier> {
        &self.mocks.notifier
    }

    pub fn payments(&self) -> &Arc<MockPaymentGateway> {
        &self.mocks.payments
    }

    pub fn clock(&self) -> &Arc<FixedClock> {
        &self.mocks.clock
    }
}
