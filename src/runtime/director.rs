//! Minimal sequential director
//!
//! Drives one script actor through a run the way a workflow host would:
//! preinitialize, initialize, up to N prefire/fire/postfire iterations, then
//! wrapup. Absent methods take the host defaults (ready, continue).

use std::collections::BTreeMap;
use std::sync::Arc;

use super::dispatcher::{PhaseOutcome, ScriptActor};
use super::error::DispatchResult;
use super::host::{MemoryPort, Port};
use crate::interpreter::Value;

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Completed fire iterations
    pub iterations: usize,
    /// Whether postfire asked to stop before the limit
    pub stopped_by_actor: bool,
    /// Whether prefire reported not ready
    pub not_ready: bool,
    /// Tokens broadcast on each output port during the run
    pub outputs: BTreeMap<String, Vec<Value>>,
}

/// Sequential host driver
#[derive(Debug, Clone, Copy)]
pub struct Director {
    iterations: usize,
}

impl Director {
    /// Director that fires at most `iterations` times
    pub fn new(iterations: usize) -> Self {
        Self { iterations }
    }

    /// Run `actor` to completion, collecting what it sends on `outputs`.
    ///
    /// A termination signal ends the run through `terminate`; any other
    /// failure still runs `wrapup` before it is returned.
    pub fn run(
        &self,
        actor: &mut ScriptActor,
        outputs: &[Arc<MemoryPort>],
    ) -> DispatchResult<RunReport> {
        let mut report = RunReport::default();

        match self.drive(actor, &mut report) {
            Ok(()) => {
                actor.on_wrapup()?;
            }
            Err(error) if error.is_termination() => {
                tracing::info!(actor = actor.name(), %error, "run terminated");
                actor.on_terminate();
                return Err(error);
            }
            Err(error) => {
                if let Err(wrapup) = actor.on_wrapup() {
                    tracing::warn!(actor = actor.name(), error = %wrapup, "wrapup failed after error");
                }
                return Err(error);
            }
        }

        for port in outputs {
            report
                .outputs
                .insert(port.name().to_string(), port.take_broadcasts());
        }
        tracing::debug!(
            actor = actor.name(),
            iterations = report.iterations,
            stopped = report.stopped_by_actor,
            "run complete"
        );
        Ok(report)
    }

    fn drive(&self, actor: &mut ScriptActor, report: &mut RunReport) -> DispatchResult<()> {
        actor.on_preinitialize()?;
        actor.on_initialize()?;

        while report.iterations < self.iterations {
            if !actor.on_prefire()?.or_default(true) {
                report.not_ready = true;
                break;
            }
            actor.on_fire()?;
            report.iterations += 1;

            if actor.on_postfire()? == PhaseOutcome::Stop {
                report.stopped_by_actor = true;
                break;
            }
        }
        Ok(())
    }
}

impl Default for Director {
    fn default() -> Self {
        Self::new(1)
    }
}
