//! Integration test harness.

mod mock_oracle;
mod simulation;
