use std::collections::HashMap;

use rfab_wire::RootId;

/// A connected client's per-root refcount map (spec.md §3 "Client record"):
/// `handle-root → count`, used to drop all of a client's references in one
/// pass when it disconnects. The Rust analogue of `host.py`'s
/// `Client.wrapped: Counter`.
#[derive(Default)]
pub struct ClientRefs {
    counts: HashMap<RootId, u64>,
}

impl ClientRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(&mut self, root: RootId) {
        *self.counts.entry(root).or_insert(0) += 1;
    }

    /// Returns `true` if this client still holds at least one reference to
    /// `root` after the decrement (false once its count reaches zero or it
    /// never held one — `OWN`/`DROP` are fire-and-forget, spec.md §9).
    pub(crate) fn decr(&mut self, root: RootId) {
        if let Some(count) = self.counts.get_mut(&root) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.counts.remove(&root);
            }
        }
    }

    pub(crate) fn drain(self) -> impl Iterator<Item = (RootId, u64)> {
        self.counts.into_iter()
    }
}
