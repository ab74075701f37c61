//! Stage flags and phases of a pipeline run.
//!
//! `PipelineState` holds one flag per stage. Flags only ever move from false
//! to true and always form a prefix of `Stage::ALL`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const STAGE_COUNT: usize = 7;

/// Completed-stage markers in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    SpecGenerated,
    SpecApproved,
    TestCasesGenerated,
    TestCasesApproved,
    ScriptsGenerated,
    ScriptsCombined,
    ExecutionComplete,
}

impl Stage {
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::SpecGenerated,
        Stage::SpecApproved,
        Stage::TestCasesGenerated,
        Stage::TestCasesApproved,
        Stage::ScriptsGenerated,
        Stage::ScriptsCombined,
        Stage::ExecutionComplete,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn predecessor(self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Stage::ALL[i])
    }

    pub fn successor(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    /// Label shown by the progress tracker.
    pub fn label(self) -> &'static str {
        match self {
            Stage::SpecGenerated => "API Spec Generation",
            Stage::SpecApproved => "Approve API Spec",
            Stage::TestCasesGenerated => "Generate Test Cases",
            Stage::TestCasesApproved => "Approve Test Cases",
            Stage::ScriptsGenerated => "Generate K6 Scripts",
            Stage::ScriptsCombined => "Combine K6 Scripts",
            Stage::ExecutionComplete => "Run K6 Tests",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("stage '{}' cannot complete before '{}'", stage.label(), missing.label())]
pub struct OutOfOrder {
    pub stage: Stage,
    pub missing: Stage,
}

/// Ordered, monotonic stage flags for the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredFlags", into = "StoredFlags")]
pub struct PipelineState {
    flags: [bool; STAGE_COUNT],
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state from raw flags, keeping only the leading run of `true`.
    pub fn from_flags(flags: [bool; STAGE_COUNT]) -> Self {
        let mut state = Self::default();
        for stage in Stage::ALL {
            if !flags[stage.index()] {
                break;
            }
            state.flags[stage.index()] = true;
        }
        state
    }

    pub fn flags(&self) -> [bool; STAGE_COUNT] {
        self.flags
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.flags[stage.index()]
    }

    /// Sets a stage flag. Re-marking a completed stage is a no-op.
    pub fn mark_complete(&mut self, stage: Stage) -> Result<(), OutOfOrder> {
        if let Some(prev) = stage.predecessor() {
            if !self.is_complete(prev) {
                return Err(OutOfOrder {
                    stage,
                    missing: prev,
                });
            }
        }
        self.flags[stage.index()] = true;
        Ok(())
    }

    /// The last completed stage, if any.
    pub fn frontier(&self) -> Option<Stage> {
        Stage::ALL
            .iter()
            .rev()
            .copied()
            .find(|stage| self.is_complete(*stage))
    }

    /// The first stage still pending, if any.
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| !self.is_complete(*stage))
    }

    pub fn completed(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL
            .iter()
            .copied()
            .filter(|stage| self.is_complete(*stage))
    }

    /// Keeps the longest prefix of completed stages for which `keep` holds.
    pub fn retain_prefix(&mut self, mut keep: impl FnMut(Stage) -> bool) {
        let mut valid = true;
        for stage in Stage::ALL {
            valid = valid && self.is_complete(stage) && keep(stage);
            self.flags[stage.index()] = valid;
        }
    }

    pub fn reset(&mut self) {
        self.flags = [false; STAGE_COUNT];
    }
}

#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct StoredFlags {
    spec_generated: bool,
    spec_approved: bool,
    test_cases_generated: bool,
    test_cases_approved: bool,
    scripts_generated: bool,
    scripts_combined: bool,
    execution_complete: bool,
}

impl From<StoredFlags> for PipelineState {
    fn from(s: StoredFlags) -> Self {
        PipelineState::from_flags([
            s.spec_generated,
            s.spec_approved,
            s.test_cases_generated,
            s.test_cases_approved,
            s.scripts_generated,
            s.scripts_combined,
            s.execution_complete,
        ])
    }
}

impl From<PipelineState> for StoredFlags {
    fn from(state: PipelineState) -> Self {
        let [a, b, c, d, e, f, g] = state.flags;
        StoredFlags {
            spec_generated: a,
            spec_approved: b,
            test_cases_generated: c,
            test_cases_approved: d,
            scripts_generated: e,
            scripts_combined: f,
            execution_complete: g,
        }
    }
}

/// User-facing commands. Each maps to one coordinator transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    GenerateSpec,
    SuggestImprovements,
    EditSpec,
    ApproveSpec,
    GenerateTestCases,
    EditTestCases,
    ApproveTestCases,
    GenerateScripts,
    CombineScripts,
    RunScripts,
}

impl Action {
    /// Stage that must already be complete before the action may run.
    pub fn requires(self) -> Option<Stage> {
        match self {
            Action::GenerateSpec => None,
            Action::SuggestImprovements | Action::EditSpec | Action::ApproveSpec => {
                Some(Stage::SpecGenerated)
            }
            Action::GenerateTestCases => Some(Stage::SpecApproved),
            Action::EditTestCases | Action::ApproveTestCases => Some(Stage::TestCasesGenerated),
            Action::GenerateScripts => Some(Stage::TestCasesApproved),
            Action::CombineScripts => Some(Stage::ScriptsGenerated),
            Action::RunScripts => Some(Stage::ScriptsCombined),
        }
    }

    /// Stage whose flag the action sets on success.
    pub fn produces(self) -> Option<Stage> {
        match self {
            Action::GenerateSpec => Some(Stage::SpecGenerated),
            Action::ApproveSpec => Some(Stage::SpecApproved),
            Action::GenerateTestCases => Some(Stage::TestCasesGenerated),
            Action::ApproveTestCases => Some(Stage::TestCasesApproved),
            Action::GenerateScripts => Some(Stage::ScriptsGenerated),
            Action::CombineScripts => Some(Stage::ScriptsCombined),
            Action::RunScripts => Some(Stage::ExecutionComplete),
            Action::SuggestImprovements | Action::EditSpec | Action::EditTestCases => None,
        }
    }

    /// Phase observed while the action is in flight.
    pub fn running_phase(self) -> Phase {
        match self {
            Action::GenerateSpec => Phase::SpecGenerating,
            Action::SuggestImprovements | Action::EditSpec | Action::ApproveSpec => {
                Phase::SpecReady
            }
            Action::GenerateTestCases => Phase::TestCasesGenerating,
            Action::EditTestCases | Action::ApproveTestCases => Phase::TestCasesReady,
            Action::GenerateScripts => Phase::ScriptsGenerating,
            Action::CombineScripts => Phase::ScriptsCombining,
            Action::RunScripts => Phase::Executing,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Action::GenerateSpec => "generate spec",
            Action::SuggestImprovements => "suggest spec improvements",
            Action::EditSpec => "edit spec",
            Action::ApproveSpec => "approve spec",
            Action::GenerateTestCases => "generate test cases",
            Action::EditTestCases => "edit test cases",
            Action::ApproveTestCases => "approve test cases",
            Action::GenerateScripts => "generate scripts",
            Action::CombineScripts => "combine scripts",
            Action::RunScripts => "run scripts",
        };
        f.write_str(name)
    }
}

/// Coordinator state machine position, derived from the flags, the action in
/// flight and the last recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Init,
    SpecGenerating,
    SpecReady,
    SpecApproved,
    TestCasesGenerating,
    TestCasesReady,
    TestCasesApproved,
    ScriptsGenerating,
    ScriptsReady,
    ScriptsCombining,
    ScriptsCombined,
    Executing,
    Done,
    Failed { state: Box<Phase>, cause: String },
}

impl Phase {
    /// Resting phase for a set of flags.
    pub fn settled(state: &PipelineState) -> Phase {
        match state.frontier() {
            None => Phase::Init,
            Some(Stage::SpecGenerated) => Phase::SpecReady,
            Some(Stage::SpecApproved) => Phase::SpecApproved,
            Some(Stage::TestCasesGenerated) => Phase::TestCasesReady,
            Some(Stage::TestCasesApproved) => Phase::TestCasesApproved,
            Some(Stage::ScriptsGenerated) => Phase::ScriptsReady,
            Some(Stage::ScriptsCombined) => Phase::ScriptsCombined,
            Some(Stage::ExecutionComplete) => Phase::Done,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Phase::Failed { .. })
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Failed { state, cause } => write!(f, "Failed({:?}): {}", state, cause),
            other => write!(f, "{:?}", other),
        }
    }
}
