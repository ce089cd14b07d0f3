//! The Tool Node lifecycle, encoded as an explicit sum type rather than a
//! member-nullability pattern (`built_command is None` meaning "wrong
//! state"): a `StateError` becomes
//! unreachable in the happy path because each phase can only read the
//! previous phase's payload out of the matching variant.

use engine_container::RunOutcome;
use engine_core::resolver::ResolvedValues;

#[derive(Debug, Clone, Default)]
pub enum ToolState {
    #[default]
    Init,
    Prepared,
    ArgsFetched {
        values: ResolvedValues,
    },
    CommandBuilt {
        values: ResolvedValues,
        argv: Vec<String>,
    },
    ContainerRan {
        argv: Vec<String>,
        container_name: String,
        outcome: RunOutcome,
        build_log: Vec<String>,
    },
    ResultsStored,
}

impl ToolState {
    pub fn name(&self) -> &'static str {
        match self {
            ToolState::Init => "INIT",
            ToolState::Prepared => "PREPARED",
            ToolState::ArgsFetched { .. } => "ARGS_FETCHED",
            ToolState::CommandBuilt { .. } => "COMMAND_BUILT",
            ToolState::ContainerRan { .. } => "CONTAINER_RAN",
            ToolState::ResultsStored => "RESULTS_STORED",
        }
    }
}
