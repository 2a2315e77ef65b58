//! Pool monitor thread
//!
//! Sleeps on a parker until a dying worker reports in through the crash
//! queue, then joins the dead thread and spawns a replacement under the
//! same `WorkerId` with a bumped generation. After shutdown begins, crashed
//! workers are reaped but not replaced.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use offload_core::{kerror, kinfo, kwarn};
use offload_core::{Event, OffloadError, OffloadResult, WorkerId};

use super::{worker, PoolInner};

pub(crate) fn spawn_monitor(inner: &Arc<PoolInner>) -> OffloadResult<JoinHandle<()>> {
    let inner = Arc::clone(inner);
    thread::Builder::new()
        .name("offload-monitor".to_string())
        .spawn(move || monitor_loop(inner))
        .map_err(|e| OffloadError::SpawnFailed(e.to_string()))
}

fn monitor_loop(inner: Arc<PoolInner>) {
    loop {
        while let Some(id) = inner.crashes.pop() {
            reap(&inner, id);
        }
        if inner.monitor_stop.load(Ordering::Acquire) {
            // A crash may have landed between the drain and the flag check
            while let Some(id) = inner.crashes.pop() {
                reap(&inner, id);
            }
            break;
        }
        inner.monitor_parker.park(None);
    }
}

fn reap(inner: &Arc<PoolInner>, id: WorkerId) {
    let slot = &inner.workers[id.as_usize()];

    let dead = slot.thread().take();
    if let Some(handle) = dead {
        if let Err(payload) = handle.join() {
            kwarn!("worker {} died: {}", id, crate::panic_message(payload.as_ref()));
        }
    }

    if inner.monitor_stop.load(Ordering::Acquire) {
        inner.worker_exited();
        return;
    }

    let generation = slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
    match worker::spawn_worker(inner, id) {
        Ok(handle) => {
            *slot.thread() = Some(handle);
            inner.stats.respawned.fetch_add(1, Ordering::Relaxed);
            kinfo!("worker {} respawned (generation {})", id, generation);
            inner.emit(&Event::WorkerRespawned {
                worker: id,
                generation,
            });
        }
        Err(e) => {
            kerror!("worker {} could not be respawned: {}", id, e);
            inner.worker_exited();
        }
    }
}
