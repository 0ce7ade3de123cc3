use rfab_wire::Value;

/// Pluggable sink for orphan-reply logging (spec.md §9: "The source
/// occasionally logs via print to stderr; surface through a pluggable log
/// sink"). An orphan reply is one whose task id is no longer in the
/// pending table — the `Task` that sent it was already dropped.
pub trait OrphanSink: Send + Sync {
    fn orphan_failure(&self, task_id: u64, error: &Value, traceback: &str);
}

/// Default sink: `tracing::warn!`, matching every other failure path in
/// this workspace (no `eprintln!` in library code, SPEC_FULL.md §2).
pub struct TracingOrphanSink;

impl OrphanSink for TracingOrphanSink {
    fn orphan_failure(&self, task_id: u64, error: &Value, traceback: &str) {
        tracing::warn!(task_id, ?error, %traceback, "client: orphan reply carried a failure");
    }
}
