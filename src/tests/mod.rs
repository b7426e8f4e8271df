//! Cross-module tests: the full send flow and balance-diff previews against
//! the deterministic chain and backend mocks.

mod simulator_tests;
mod test_helpers;
mod wallet_flow_tests;
