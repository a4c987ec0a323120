//! Line-oriented prompts for the operator at the desk.
//!
//! Prompts go to the output stream (stderr in the binary) so stdout stays
//! machine readable. End of input is treated as "quit".

use anyhow::Result;
use std::io::{BufRead, Write};

use ntd_execution::{FaultContext, FaultDecision, LockDecision, Operator};
use ntd_reconcile::{ScanEvent, ScanSource};
use ntd_schemas::{Uid, WritePlanItem};

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Option<String> {
    let _ = write!(output, "{prompt} ");
    let _ = output.flush();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_ascii_lowercase()),
    }
}

pub struct TerminalOperator<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn on_fault(&mut self, ctx: &FaultContext) -> FaultDecision {
        let _ = writeln!(
            self.output,
            "!! {} during {} (attempt {}): {}",
            ctx.uid,
            ctx.state.name(),
            ctx.attempt,
            ctx.fault
        );
        loop {
            match ask(&mut self.input, &mut self.output, "[r]etry / [s]kip / [q]uit?").as_deref() {
                Some("r") | Some("retry") | Some("") => return FaultDecision::Retry,
                Some("s") | Some("skip") => return FaultDecision::Skip,
                Some("q") | Some("quit") | None => return FaultDecision::Quit,
                Some(_) => continue,
            }
        }
    }

    fn confirm_lock(&mut self, uid: &Uid) -> LockDecision {
        let _ = writeln!(self.output, "Locking {uid} is permanent.");
        loop {
            let answer = ask(
                &mut self.input,
                &mut self.output,
                "Lock? [y]es / [n]o / [a]ll no / [q]uit?",
            );
            match answer.as_deref() {
                Some("y") | Some("yes") => return LockDecision::Lock,
                Some("n") | Some("no") => return LockDecision::SkipLock,
                Some("a") | Some("all") => return LockDecision::DeclineAll,
                Some("q") | Some("quit") | None => return LockDecision::Quit,
                Some(_) => continue,
            }
        }
    }

    fn announce(&mut self, item: &WritePlanItem, position: usize, total: usize) {
        let _ = writeln!(
            self.output,
            ">> [{position}/{total}] present {} ({}) for {}",
            item.uid, item.detected_profile.name, item.record.nft_id
        );
    }
}

/// Asks before every scan: Enter scans the next tag, `q` or end of input stops.
pub struct PromptedScanSource<S, R, W> {
    inner: S,
    input: R,
    output: W,
}

impl<S: ScanSource, R: BufRead, W: Write> PromptedScanSource<S, R, W> {
    pub fn new(inner: S, input: R, output: W) -> Self {
        Self {
            inner,
            input,
            output,
        }
    }
}

impl<S: ScanSource, R: BufRead, W: Write> ScanSource for PromptedScanSource<S, R, W> {
    fn scan_next_tag(&mut self) -> Result<ScanEvent> {
        match ask(
            &mut self.input,
            &mut self.output,
            "Place the next tag and press Enter (q to stop):",
        )
        .as_deref()
        {
            None | Some("q") | Some("quit") => Ok(ScanEvent::Stopped),
            Some(_) => self.inner.scan_next_tag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntd_execution::{Fault, TagState};

    fn ctx() -> FaultContext {
        FaultContext {
            uid: Uid::parse("04A1B2C3D4E5F6").unwrap(),
            state: TagState::Writing,
            fault: Fault::TagRemoved,
            attempt: 1,
        }
    }

    #[test]
    fn fault_answers_and_reprompt() {
        let mut out = Vec::new();
        let mut op = TerminalOperator::new("x\ns\n".as_bytes(), &mut out);
        assert_eq!(op.on_fault(&ctx()), FaultDecision::Skip);
        let shown = String::from_utf8(out).unwrap();
        assert_eq!(shown.matches("[r]etry").count(), 2);
        assert!(shown.contains("during Writing"));
    }

    #[test]
    fn end_of_input_quits() {
        let mut op = TerminalOperator::new("".as_bytes(), Vec::new());
        assert_eq!(op.on_fault(&ctx()), FaultDecision::Quit);
        assert_eq!(op.confirm_lock(&ctx().uid), LockDecision::Quit);
    }

    #[test]
    fn lock_answers() {
        let mut op = TerminalOperator::new("Y\nn\nall\n".as_bytes(), Vec::new());
        let uid = ctx().uid;
        assert_eq!(op.confirm_lock(&uid), LockDecision::Lock);
        assert_eq!(op.confirm_lock(&uid), LockDecision::SkipLock);
        assert_eq!(op.confirm_lock(&uid), LockDecision::DeclineAll);
    }

    struct Always;
    impl ScanSource for Always {
        fn scan_next_tag(&mut self) -> Result<ScanEvent> {
            Ok(ScanEvent::Timeout)
        }
    }

    #[test]
    fn prompted_scan_stops_on_q_or_eof() {
        let mut src = PromptedScanSource::new(Always, "\nq\n".as_bytes(), Vec::new());
        assert_eq!(src.scan_next_tag().unwrap(), ScanEvent::Timeout);
        assert_eq!(src.scan_next_tag().unwrap(), ScanEvent::Stopped);
        assert_eq!(src.scan_next_tag().unwrap(), ScanEvent::Stopped);
    }
}
