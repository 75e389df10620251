//! Append-only, timestamped persistence of per-invocation opportunity /
//! solution prose (§6 "Persisted state"), backed by a non-blocking rolling
//! file writer so the optimizer's synchronous solve path is never stalled by
//! file I/O.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use crate::model::{AmountResult, Cycle, PathResult};

/// Owns the background writer thread. Dropping this drains and closes the
/// log file; callers keep it alive for the process lifetime.
pub struct RunLog {
    _guard: WorkerGuard,
}

/// Opens (or creates) a daily-rolling log file under `directory/<prefix>.log`
/// and returns a handle whose lifetime must outlive any calls to
/// `record_invocation`.
pub fn open(directory: &str, prefix: &str) -> (RunLog, tracing_appender::non_blocking::NonBlocking) {
    let file_appender = rolling::daily(directory, prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    (RunLog { _guard: guard }, non_blocking)
}

/// Renders one invocation's outcome as append-only prose, in the spirit of
/// the original's `opp_and_solution_txt`. The original hardcoded its log
/// timestamps to `Asia/Singapore`; this takes the display timezone as a
/// parameter instead so the caller is not tied to one region.
pub fn format_invocation(
    timestamp: DateTime<Utc>,
    tz: Tz,
    run_count: u64,
    path: &PathResult,
    amounts: Option<&AmountResult>,
) -> String {
    let local = timestamp.with_timezone(&tz);

    if !path.has_opportunity() {
        return format!("[{local}] run {run_count}: no opportunity found\n");
    }

    let cycle_desc = describe_cycle(&path.cycle);
    let mut line = format!(
        "[{local}] run {run_count}: opportunity found, cycle = {cycle_desc}, profit_rate = {:.8}",
        path.profit_rate
    );

    match amounts {
        Some(amounts) if amounts.has_workable_solution() => {
            line.push_str(&format!(", objective = {:.8}, legs = {}", amounts.objective, amounts.legs.len()));
        }
        Some(_) => line.push_str(", amount optimizer: no workable solution"),
        None => {}
    }

    line.push('\n');
    line
}

fn describe_cycle(cycle: &Cycle) -> String {
    cycle
        .edges
        .iter()
        .map(|(from, to)| format!("{from}->{to}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeId;

    #[test]
    fn no_opportunity_is_one_line() {
        let path = PathResult::default();
        let line = format_invocation(Utc::now(), Tz::Asia__Singapore, 1, &path, None);
        assert!(line.contains("no opportunity"));
    }

    #[test]
    fn opportunity_includes_cycle_and_profit_rate() {
        let path = PathResult {
            cycle: Cycle {
                edges: vec![(0 as NodeId, 1), (1, 0)],
            },
            profit_rate: 0.0123,
        };
        let line = format_invocation(Utc::now(), Tz::Asia__Singapore, 7, &path, None);
        assert!(line.contains("0->1"));
        assert!(line.contains("0.01230000"));
    }
}
