//! Process-wide coordinator access.

mod common;

use serial_test::serial;

use batchwatch::BatchCoordinator;
use common::TestHarness;

#[tokio::test]
#[serial]
async fn test_global_or_init_creates_once() {
    let harness = TestHarness::new();
    let first = BatchCoordinator::global_or_init(|| harness.coordinator());
    let second = BatchCoordinator::global_or_init(|| panic!("initialised twice"));

    assert!(std::ptr::eq(first, second));
    assert!(BatchCoordinator::global().is_some());
}

#[tokio::test]
#[serial]
async fn test_install_rejects_second_coordinator() {
    let harness = TestHarness::new();
    BatchCoordinator::global_or_init(|| harness.coordinator());

    let other = TestHarness::new().coordinator();
    assert!(BatchCoordinator::install(other).is_err());
}
