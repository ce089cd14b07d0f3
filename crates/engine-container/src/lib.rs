//! Container Runner: deterministic image build and bind-mounted container
//! execution over the Docker Engine API.

pub mod runner;

pub use runner::{
    classify_exit, ContainerRunner, ContainerRuntime, ContainerSpec, RunOutcome, EARLY_STOP_EXIT_CODE,
};
