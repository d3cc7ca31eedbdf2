pub mod fakes;
pub mod harness;

pub use fakes::{
    collecting_sink, counting_observer, FailingTunnel, FixedPrefixEnvironments, RecipeBook,
    StaticTunnel,
};
pub use harness::{wait_for, Harness, HarnessBuilder};
