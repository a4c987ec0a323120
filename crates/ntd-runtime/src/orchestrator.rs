use serde_json::json;
use tracing::{info, warn};

use ntd_execution::{CancelFlag, Operator, TagReader, WriteMachine};
use ntd_schemas::{record_or_warn, EventKind, LogEntry, OperationLog, RunSummary, WritePlanItem};

use crate::{preflight, BatchOptions, PreflightError, PreparedItem};

/// Runs a prepared plan tag by tag, in plan order.
///
/// Owns the run summary and the run-wide "decline all locks" flag. A quit
/// (operator or cancellation) stops iteration; the rest of the plan is
/// reported as not attempted.
pub struct BatchOrchestrator<'a, R: ?Sized, O: ?Sized, L: ?Sized> {
    reader: &'a mut R,
    operator: &'a mut O,
    log: &'a mut L,
    opts: BatchOptions,
    cancel: CancelFlag,
    locks_declined: bool,
}

impl<'a, R, O, L> BatchOrchestrator<'a, R, O, L>
where
    R: TagReader + ?Sized,
    O: Operator + ?Sized,
    L: OperationLog + ?Sized,
{
    pub fn new(reader: &'a mut R, operator: &'a mut O, log: &'a mut L, opts: BatchOptions) -> Self {
        Self {
            reader,
            operator,
            log,
            opts,
            cancel: CancelFlag::new(),
            locks_declined: false,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Preflight `items`, then run them.
    pub fn execute(&mut self, items: &[WritePlanItem]) -> Result<RunSummary, PreflightError> {
        let prepared = preflight(items, &self.opts)?;
        Ok(self.run(&prepared))
    }

    pub fn run(&mut self, items: &[PreparedItem]) -> RunSummary {
        let total = items.len();
        record_or_warn(
            self.log,
            LogEntry::new(
                EventKind::RunStarted,
                None,
                json!({ "total": total, "options": self.opts }),
            ),
        );
        info!(total, lock = self.opts.lock_tags, "batch started");

        let mut summary = RunSummary::new(total);
        let config = self.opts.machine_config();

        for (i, prepared) in items.iter().enumerate() {
            let item = &prepared.item;
            if !summary.quit && self.cancel.is_cancelled() {
                info!("cancellation requested, stopping batch");
                summary.quit = true;
            }
            if summary.quit {
                summary.mark_not_attempted(item.uid.clone());
                continue;
            }

            self.operator.announce(item, i + 1, total);
            let run = WriteMachine::new(&mut *self.reader, &mut *self.operator, &mut *self.log, config)
                .with_cancel(self.cancel.clone())
                .run(item, self.locks_declined);

            // Next tag must not be mistaken for this one.
            if let Err(e) = self.reader.wait_for_removal(&item.uid) {
                warn!(uid = %item.uid, error = %e, "tag removal not confirmed");
            }

            if run.decline_all {
                info!("locking declined for the rest of the run");
                self.locks_declined = true;
            }
            summary.record(run.outcome);
            if run.quit {
                summary.quit = true;
            }
        }

        record_or_warn(
            self.log,
            LogEntry::new(
                EventKind::RunFinished,
                None,
                json!({
                    "total": summary.total,
                    "written": summary.written,
                    "locked": summary.locked,
                    "skipped": summary.skipped,
                    "failed": summary.failed,
                    "not_attempted": summary.not_attempted,
                    "quit": summary.quit,
                }),
            ),
        );
        info!(%summary, "batch finished");
        summary
    }
}
