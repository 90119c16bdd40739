//! Test-only scripted collaborators and invariant builders.
//!
//! Each double records its calls so tests can assert on exactly what the
//! engine asked for.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

use anyhow::{Result, anyhow};

use crate::core::error_class::ErrorClass;
use crate::core::playbook::Playbook;
use crate::core::types::{Invariant, Stage, StageDetail};
use crate::io::health::HealthCheck;
use crate::io::recovery::{ClearanceProbe, InteractiveRecovery, RecoveryContext};
use crate::io::remediation::Remediator;
use crate::io::stage_worker::{StageContext, StageOutcome, StageWorker};

/// Invariants with the given ids, all failing.
pub fn failing(ids: &[&str]) -> Vec<Invariant> {
    ids.iter().map(|id| Invariant::new(*id, false)).collect()
}

/// Invariants with the given ids, all passing.
pub fn passing(ids: &[&str]) -> Vec<Invariant> {
    ids.iter().map(|id| Invariant::new(*id, true)).collect()
}

/// Health check that replays a script, then repeats the last entry.
pub struct ScriptedHealth {
    script: RefCell<VecDeque<Result<Vec<Invariant>, String>>>,
    last: RefCell<Option<Result<Vec<Invariant>, String>>>,
    calls: Cell<u32>,
}

impl ScriptedHealth {
    pub fn new(script: Vec<Result<Vec<Invariant>, String>>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            last: RefCell::new(None),
            calls: Cell::new(0),
        }
    }

    pub fn repeating(result: Result<Vec<Invariant>, String>) -> Self {
        Self::new(vec![result])
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl HealthCheck for ScriptedHealth {
    fn gather(&self) -> Result<Vec<Invariant>> {
        self.calls.set(self.calls.get() + 1);
        let next = match self.script.borrow_mut().pop_front() {
            Some(entry) => {
                *self.last.borrow_mut() = Some(entry.clone());
                entry
            }
            None => self
                .last
                .borrow()
                .clone()
                .ok_or_else(|| anyhow!("empty health script"))?,
        };
        next.map_err(|err| anyhow!(err))
    }
}

/// Remediator that records every playbook and optionally fails each call.
pub struct ScriptedRemediator {
    applied: RefCell<Vec<Playbook>>,
    fail: bool,
}

impl ScriptedRemediator {
    pub fn succeeding() -> Self {
        Self {
            applied: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            applied: RefCell::new(Vec::new()),
            fail: true,
        }
    }

    pub fn applied(&self) -> Vec<Playbook> {
        self.applied.borrow().clone()
    }
}

impl Remediator for ScriptedRemediator {
    fn apply(&self, playbook: Playbook) -> Result<()> {
        self.applied.borrow_mut().push(playbook);
        if self.fail {
            return Err(anyhow!("playbook {playbook} exited with status 1"));
        }
        Ok(())
    }
}

/// Stage worker with per-stage scripts; unscripted calls pass.
pub struct ScriptedWorker {
    scripts: RefCell<BTreeMap<Stage, VecDeque<Result<StageOutcome, String>>>>,
    calls: RefCell<Vec<StageContext>>,
}

impl ScriptedWorker {
    pub fn passing() -> Self {
        Self {
            scripts: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Queue outcomes for `stage`, consumed one per call.
    pub fn script(self, stage: Stage, outcomes: Vec<Result<StageOutcome, String>>) -> Self {
        self.scripts
            .borrow_mut()
            .entry(stage)
            .or_default()
            .extend(outcomes);
        self
    }

    pub fn calls(&self) -> Vec<StageContext> {
        self.calls.borrow().clone()
    }

    pub fn stages_run(&self) -> Vec<Stage> {
        self.calls.borrow().iter().map(|ctx| ctx.stage).collect()
    }
}

impl StageWorker for ScriptedWorker {
    fn run_stage(&self, ctx: &StageContext) -> Result<StageOutcome> {
        self.calls.borrow_mut().push(ctx.clone());
        let next = self
            .scripts
            .borrow_mut()
            .get_mut(&ctx.stage)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(err)) => Err(anyhow!(err)),
            None => Ok(StageOutcome::pass(StageDetail::None)),
        }
    }
}

/// Recovery with a fixed result.
pub struct ScriptedRecovery {
    recovered: bool,
    calls: RefCell<Vec<RecoveryContext>>,
}

impl ScriptedRecovery {
    pub fn new(recovered: bool) -> Self {
        Self {
            recovered,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn contexts(&self) -> Vec<RecoveryContext> {
        self.calls.borrow().clone()
    }
}

impl InteractiveRecovery for ScriptedRecovery {
    fn recover(&self, ctx: &RecoveryContext) -> Result<bool> {
        self.calls.borrow_mut().push(ctx.clone());
        Ok(self.recovered)
    }
}

/// Clearance probe with a settable answer.
pub struct StaticProbe {
    cleared: Cell<bool>,
    calls: RefCell<Vec<(Stage, Option<ErrorClass>)>>,
}

impl StaticProbe {
    pub fn new(cleared: bool) -> Self {
        Self {
            cleared: Cell::new(cleared),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn set_cleared(&self, cleared: bool) {
        self.cleared.set(cleared);
    }

    pub fn calls(&self) -> Vec<(Stage, Option<ErrorClass>)> {
        self.calls.borrow().clone()
    }
}

impl ClearanceProbe for StaticProbe {
    fn cleared(&self, stage: Stage, error_class: Option<ErrorClass>) -> Result<bool> {
        self.calls.borrow_mut().push((stage, error_class));
        Ok(self.cleared.get())
    }
}
