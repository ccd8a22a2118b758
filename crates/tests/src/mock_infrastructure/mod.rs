//! Reusable mock types for testing.

pub mod rpc_mock;
pub mod test_helpers;

pub use rpc_mock::TonRpcMock;
