// ABOUTME: Classifies inbound modem lines and correlates them with the in-flight AT command
// ABOUTME: Holds the single-slot register describing what the next line has to match

use crate::command::{AtCommand, DEFAULT_DELIMITER, ERROR_TOKEN, RING_TOKEN};
use crate::datatypes::JobId;

/// The job presently waiting on a serial response
///
/// There is at most one of these at any time. It is written when a command
/// is dispatched and cleared when that command completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSerialJob {
    pub id: JobId,
    pub delimiter: String,
    pub prepend_match: bool,
    /// A final `OK`/`ERROR` follows the matching line
    pub awaits_final_result: bool,
    /// Last line seen while this job was armed
    pub previous_line: String,
}

/// Outcome of routing one inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Ring alert: mail is waiting at the gateway. Does not touch the armed job.
    Ring,
    /// The modem reported an error for the armed job.
    Error { id: JobId, line: String },
    /// The armed job's completion rule matched; `line` is its payload.
    Matched { id: JobId, line: String },
    /// The final result code trailing a completed job's reply.
    Settled { id: JobId },
    /// A job is armed or settling but this line does not complete it.
    Pending,
    /// No job is armed; the line has no one to go to.
    Unsolicited,
}

/// Line-matching state machine
///
/// Routing order for each line:
///
/// 1. a line containing `SBDRING` is a ring alert,
/// 2. a line containing `ERROR` fails the armed job,
/// 3. otherwise the armed job's delimiter is tested, against the previous
///    line for prepend-match jobs or the current line for the rest.
///
/// The current line is remembered as "previous" whether or not it matched.
///
/// When a job that expects a final result code matches, the router moves to
/// settling: lines are swallowed until a bare `OK` or an `ERROR` line, which
/// is reported as `Settled`.
#[derive(Debug, Default)]
pub struct LineRouter {
    current: Option<CurrentSerialJob>,
    settling: Option<JobId>,
}

impl LineRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the register for a freshly dispatched command.
    pub fn arm(&mut self, id: JobId, command: &AtCommand) {
        self.current = Some(CurrentSerialJob {
            id,
            delimiter: command.delimiter().to_string(),
            prepend_match: command.prepend_match(),
            awaits_final_result: command.awaits_final_result(),
            previous_line: String::new(),
        });
        self.settling = None;
    }

    /// Clear the register, returning the id that was armed.
    pub fn disarm(&mut self) -> Option<JobId> {
        self.current.take().map(|job| job.id)
    }

    pub fn current(&self) -> Option<&CurrentSerialJob> {
        self.current.as_ref()
    }

    /// Id of the completed job whose final result code is still outstanding.
    pub fn settling(&self) -> Option<JobId> {
        self.settling
    }

    /// Stop waiting for a final result code.
    pub fn abandon_settling(&mut self) -> Option<JobId> {
        self.settling.take()
    }

    pub fn route(&mut self, line: &str) -> LineEvent {
        if line.contains(RING_TOKEN) {
            return LineEvent::Ring;
        }

        if let Some(id) = self.settling {
            if line == DEFAULT_DELIMITER || line.contains(ERROR_TOKEN) {
                self.settling = None;
                return LineEvent::Settled { id };
            }
            return LineEvent::Pending;
        }

        let Some(job) = self.current.as_mut() else {
            return LineEvent::Unsolicited;
        };

        if line.contains(ERROR_TOKEN) {
            return LineEvent::Error {
                id: job.id,
                line: line.to_string(),
            };
        }

        let matched = if job.prepend_match {
            job.previous_line.contains(job.delimiter.as_str())
        } else {
            line.contains(job.delimiter.as_str())
        };

        job.previous_line.clear();
        job.previous_line.push_str(line);

        if matched {
            if job.awaits_final_result {
                self.settling = Some(job.id);
            }
            LineEvent::Matched {
                id: job.id,
                line: line.to_string(),
            }
        } else {
            LineEvent::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SessionKind;
    use crate::datatypes::JobIds;

    #[test]
    fn unarmed_router_only_reports_rings() {
        let mut router = LineRouter::new();

        assert_eq!(router.route("OK"), LineEvent::Unsolicited);
        assert_eq!(router.route("ERROR"), LineEvent::Unsolicited);
        assert_eq!(router.route("SBDRING"), LineEvent::Ring);
    }

    #[test]
    fn matches_delimiter_on_current_line() {
        let ids = JobIds::new();
        let id = ids.next();
        let mut router = LineRouter::new();
        router.arm(id, &AtCommand::session(SessionKind::Standard));

        assert_eq!(router.route("AT+SBDIX"), LineEvent::Pending);
        assert_eq!(
            router.route("+SBDIX: 0, 3, 0, 0, 0, 0"),
            LineEvent::Matched {
                id,
                line: "+SBDIX: 0, 3, 0, 0, 0, 0".to_string()
            }
        );
    }

    #[test]
    fn prepend_match_returns_line_after_delimiter() {
        let ids = JobIds::new();
        let id = ids.next();
        let mut router = LineRouter::new();
        router.arm(id, &AtCommand::read_text());

        assert_eq!(router.route("AT+SBDRT"), LineEvent::Pending);
        assert_eq!(router.route("+SBDRT:"), LineEvent::Pending);
        assert_eq!(
            router.route("hello from the ground"),
            LineEvent::Matched {
                id,
                line: "hello from the ground".to_string()
            }
        );
    }

    #[test]
    fn arming_resets_previous_line() {
        let ids = JobIds::new();
        let mut router = LineRouter::new();
        router.arm(ids.next(), &AtCommand::read_text());
        router.route("+SBDRT:");

        let second = ids.next();
        router.arm(second, &AtCommand::read_text());
        assert_eq!(router.current().unwrap().previous_line, "");
        assert_eq!(router.route("stale payload"), LineEvent::Pending);
    }

    #[test]
    fn error_line_fails_armed_job() {
        let ids = JobIds::new();
        let id = ids.next();
        let mut router = LineRouter::new();
        router.arm(id, &AtCommand::write_text());

        assert_eq!(
            router.route("ERROR"),
            LineEvent::Error {
                id,
                line: "ERROR".to_string()
            }
        );
    }

    #[test]
    fn ring_does_not_disturb_armed_job() {
        let ids = JobIds::new();
        let id = ids.next();
        let mut router = LineRouter::new();
        router.arm(id, &AtCommand::signal_quality());

        assert_eq!(router.route("SBDRING"), LineEvent::Ring);
        assert_eq!(router.current().unwrap().id, id);
        assert!(matches!(router.route("+CSQ:4"), LineEvent::Matched { .. }));
    }

    #[test]
    fn trailing_ok_settles_instead_of_matching_next_job() {
        let ids = JobIds::new();
        let csq = ids.next();
        let mut router = LineRouter::new();
        router.arm(csq, &AtCommand::signal_quality());

        assert!(matches!(router.route("+CSQ:4"), LineEvent::Matched { .. }));
        router.disarm();
        assert_eq!(router.settling(), Some(csq));

        assert_eq!(router.route("SBDRING"), LineEvent::Ring);
        assert_eq!(router.route("OK"), LineEvent::Settled { id: csq });
        assert_eq!(router.settling(), None);

        let next = ids.next();
        router.arm(next, &AtCommand::new("AT+X7", "OK"));
        assert_eq!(
            router.route("X7 OK"),
            LineEvent::Matched {
                id: next,
                line: "X7 OK".to_string()
            }
        );
        assert_eq!(router.settling(), None);
    }

    #[test]
    fn settling_swallows_lines_until_final_result() {
        let ids = JobIds::new();
        let id = ids.next();
        let mut router = LineRouter::new();
        router.arm(id, &AtCommand::read_text());

        router.route("+SBDRT:");
        assert!(matches!(router.route("OK then"), LineEvent::Matched { .. }));
        router.disarm();

        assert_eq!(router.route("more text"), LineEvent::Pending);
        assert_eq!(router.route("ERROR"), LineEvent::Settled { id });
        assert_eq!(router.abandon_settling(), None);
    }

    #[test]
    fn ready_prompt_does_not_settle() {
        let ids = JobIds::new();
        let mut router = LineRouter::new();
        router.arm(ids.next(), &AtCommand::write_text());

        assert!(matches!(router.route("READY"), LineEvent::Matched { .. }));
        assert_eq!(router.settling(), None);
    }

    #[test]
    fn disarm_clears_register() {
        let ids = JobIds::new();
        let id = ids.next();
        let mut router = LineRouter::new();
        router.arm(id, &AtCommand::signal_quality());

        assert_eq!(router.disarm(), Some(id));
        assert!(router.current().is_none());
        assert_eq!(router.disarm(), None);
    }
}
