//! Process execution and the verification harness contract
//!
//! All external processes are described by a [`CommandSpec`] and executed by a
//! [`ProcessRunner`] with a hard timeout. Captured output is bounded through
//! [`RingBuffer`] so a runaway harness cannot exhaust memory.
//!
//! The [`VerificationHarness`] trait is the boundary the verification-repair
//! loop talks to. [`PytestHarness`] is the stock implementation.

pub mod command_spec;
pub mod error;
pub mod harness;
pub mod process;
pub mod pytest;
pub mod ring_buffer;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use harness::{ArtifactSet, HarnessReport, HarnessStats, Verdict, VerificationHarness};
pub use process::{ProcessOutput, ProcessRunner, TokioRunner};
pub use pytest::{PytestHarness, parse_pytest_summary};
pub use ring_buffer::RingBuffer;
