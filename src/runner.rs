use crate::{
    checkpoint::{step_key, CheckpointStore},
    config::InstallMode,
    context::InstallationContext,
    error::InstallerError,
    report::Reporter,
};

pub type Action<'a> = Box<dyn FnMut(&mut InstallationContext) -> Result<(), InstallerError> + 'a>;

/// One named unit of provisioning work.
pub struct Step<'a> {
    name: &'static str,
    only: Option<InstallMode>,
    action: Action<'a>,
}

impl<'a> Step<'a> {
    pub fn new(
        name: &'static str,
        action: impl FnMut(&mut InstallationContext) -> Result<(), InstallerError> + 'a,
    ) -> Self {
        Step {
            name,
            only: None,
            action: Box::new(action),
        }
    }

    /// Restricts the step to one install mode; in the other mode it is
    /// passed over without writing a marker.
    pub fn only_for(mut self, mode: InstallMode) -> Self {
        self.only = Some(mode);
        self
    }

    pub fn key(&self) -> String {
        step_key(self.name)
    }
}

/// What a completed run did, in step order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

/// Runs steps strictly in order, skipping those with a checkpoint marker and
/// stopping at the first failure.
pub struct StepRunner<'r> {
    checkpoints: &'r CheckpointStore,
    report: &'r Reporter,
}

impl<'r> StepRunner<'r> {
    pub fn new(checkpoints: &'r CheckpointStore, report: &'r Reporter) -> Self {
        StepRunner {
            checkpoints,
            report,
        }
    }

    pub fn run(
        &self,
        steps: Vec<Step<'_>>,
        ctx: &mut InstallationContext,
    ) -> Result<RunSummary, InstallerError> {
        let total = steps.len();
        let mut summary = RunSummary::default();

        for (idx, mut step) in steps.into_iter().enumerate() {
            self.report
                .show_progress(idx, total, &format!("{}...", step.name));

            let key = step.key();
            if step.only.is_some_and(|mode| mode != ctx.mode()) {
                self.report.update_status(&format!(
                    "{}: not needed in {} mode",
                    step.name,
                    ctx.mode().as_str()
                ));
                summary.skipped.push(step.name);
            } else if self.checkpoints.exists(&key) {
                self.report
                    .update_status(&format!("{}: already complete", step.name));
                summary.skipped.push(step.name);
            } else {
                let outcome = (step.action)(ctx)
                    .and_then(|()| self.checkpoints.mark_complete(&key).map_err(Into::into));
                if let Err(e) = outcome {
                    self.report.handle_error(step.name, &e);
                    return Err(e.in_step(step.name));
                }
                summary.completed.push(step.name);
            }

            self.report
                .show_progress(idx + 1, total, &format!("{} ✓", step.name));
        }

        self.report.show_progress(total, total, "Complete!");
        Ok(summary)
    }
}
