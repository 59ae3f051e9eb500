//! Collective communication between the workers of an SPMD team.
//!
//! Every worker runs the same program and calls the collective operations of
//! this module the same number of times in the same order. A worker that
//! skips a call leaves its peers blocked forever, so callers validate their
//! inputs before reaching a collective.

use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};
use std::thread;

use lss_core::{ErrorInfo, LssError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Byte-level collectives of a fixed-size worker team.
pub trait Communicator: Send + Sync {
    /// Rank of the calling worker, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of workers in the team.
    fn size(&self) -> usize;

    /// Blocks until every worker has arrived.
    fn barrier(&self);

    /// Sends `payload` from `root` to every worker.
    ///
    /// Only the root's payload is used; other workers pass `None`. A root
    /// that passes `None` makes the call fail on every worker.
    fn broadcast_bytes(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>, LssError>;

    /// Collects one payload per worker on `root`, in rank order. Non-root
    /// workers receive `None`.
    fn gather_bytes(&self, root: usize, payload: Vec<u8>)
        -> Result<Option<Vec<Vec<u8>>>, LssError>;
}

/// Typed collectives layered over [`Communicator`], encoded with `bincode`.
pub trait CommunicatorExt: Communicator {
    /// Whether the caller is `root`.
    fn is_root(&self, root: usize) -> bool {
        self.rank() == root
    }

    /// Broadcasts `value` from `root`; non-root workers pass `None`.
    fn broadcast<T: Serialize + DeserializeOwned>(
        &self,
        root: usize,
        value: Option<&T>,
    ) -> Result<T, LssError> {
        let payload = match value {
            Some(value) if self.is_root(root) => Some(encode(value)?),
            _ => None,
        };
        decode(&self.broadcast_bytes(root, payload)?)
    }

    /// Gathers one value per worker on `root`, in rank order.
    fn gather<T: Serialize + DeserializeOwned>(
        &self,
        root: usize,
        value: &T,
    ) -> Result<Option<Vec<T>>, LssError> {
        match self.gather_bytes(root, encode(value)?)? {
            Some(parts) => parts.iter().map(|bytes| decode(bytes)).collect::<Result<_, _>>().map(Some),
            None => Ok(None),
        }
    }
}

impl<C: Communicator + ?Sized> CommunicatorExt for C {}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LssError> {
    bincode::serialize(value)
        .map_err(|err| LssError::Serde(ErrorInfo::new("comm-encode", err.to_string())))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LssError> {
    bincode::deserialize(bytes)
        .map_err(|err| LssError::Serde(ErrorInfo::new("comm-decode", err.to_string())))
}

fn bad_root(root: usize, size: usize) -> LssError {
    LssError::Collective(
        ErrorInfo::new("comm-root", "root rank outside the team")
            .with_context("root", root.to_string())
            .with_context("size", size.to_string()),
    )
}

fn missing_payload(root: usize) -> LssError {
    LssError::Collective(
        ErrorInfo::new("comm-missing-payload", "root worker broadcast nothing")
            .with_context("root", root.to_string()),
    )
}

/// Communicator of a team with a single worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn broadcast_bytes(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>, LssError> {
        if root != 0 {
            return Err(bad_root(root, 1));
        }
        payload.ok_or_else(|| missing_payload(root))
    }

    fn gather_bytes(
        &self,
        root: usize,
        payload: Vec<u8>,
    ) -> Result<Option<Vec<Vec<u8>>>, LssError> {
        if root != 0 {
            return Err(bad_root(root, 1));
        }
        Ok(Some(vec![payload]))
    }
}

#[derive(Debug)]
struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Option<Vec<u8>>>>,
}

impl Shared {
    // A worker that panicked mid-collective already breaks the team; the
    // slot vector itself is always in a consistent state.
    fn slots(&self) -> MutexGuard<'_, Vec<Option<Vec<u8>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One member of an in-process team whose workers are threads.
///
/// Members share a barrier and one mailbox slot per rank. Every collective
/// is bracketed by two barrier waits: the first publishes the writes, the
/// second keeps a fast worker from overwriting a slot that a slow one has
/// not read yet.
#[derive(Debug, Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Creates the members of a team of `size` workers, in rank order.
    pub fn team(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![None; size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn broadcast_bytes(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>, LssError> {
        if root >= self.size {
            return Err(bad_root(root, self.size));
        }
        if self.rank == root {
            self.shared.slots()[root] = payload;
        }
        self.barrier();
        let received = self.shared.slots()[root].clone();
        self.barrier();
        if self.rank == root {
            self.shared.slots()[root] = None;
        }
        received.ok_or_else(|| missing_payload(root))
    }

    fn gather_bytes(
        &self,
        root: usize,
        payload: Vec<u8>,
    ) -> Result<Option<Vec<Vec<u8>>>, LssError> {
        if root >= self.size {
            return Err(bad_root(root, self.size));
        }
        self.shared.slots()[self.rank] = Some(payload);
        self.barrier();
        let gathered: Option<Option<Vec<Vec<u8>>>> = (self.rank == root)
            .then(|| self.shared.slots().iter_mut().map(Option::take).collect());
        self.barrier();
        match gathered {
            Some(Some(parts)) => Ok(Some(parts)),
            Some(None) => Err(LssError::Collective(ErrorInfo::new(
                "comm-gather-incomplete",
                "a worker did not contribute to the gather",
            ))),
            None => Ok(None),
        }
    }
}

/// Runs `body` once per member of a fresh team of `size` threads and returns
/// the results in rank order.
///
/// A panic on any worker is re-raised on the caller once the team has been
/// joined.
pub fn run_spmd<T, F>(size: usize, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(&ThreadComm) -> T + Sync,
{
    let team = ThreadComm::team(size);
    let body = &body;
    thread::scope(|scope| {
        let handles: Vec<_> = team
            .iter()
            .map(|comm| scope.spawn(move || body(comm)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}
