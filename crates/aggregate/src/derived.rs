use std::sync::Arc;

use futures::future::select_all;
use futures::FutureExt;
use tokio::sync::watch;
use vela_store::StoreSignal;

/// A value computed from one or more stores, recomputed only after an input's epoch moves.
pub struct Derived<T> {
    inputs: Vec<watch::Receiver<StoreSignal>>,
    seen: Vec<u64>,
    compute: Box<dyn FnMut() -> T + Send>,
    value: Option<Arc<T>>,
    computations: u64,
}

impl<T> Derived<T> {
    pub fn new<F>(inputs: Vec<watch::Receiver<StoreSignal>>, compute: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        Self { inputs, seen: Vec::new(), compute: Box::new(compute), value: None, computations: 0 }
    }

    /// Current value, recomputing when any input published since the last call.
    pub fn get(&mut self) -> Arc<T> {
        let epochs: Vec<u64> = self.inputs.iter_mut().map(|rx| rx.borrow_and_update().epoch).collect();
        match &self.value {
            Some(v) if epochs == self.seen => Arc::clone(v),
            _ => {
                let v = Arc::new((self.compute)());
                self.computations += 1;
                self.seen = epochs;
                self.value = Some(Arc::clone(&v));
                v
            }
        }
    }

    /// Wait for any input to change, then return the fresh value. `None` once every input
    /// store is gone.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        loop {
            if self.inputs.is_empty() {
                return None;
            }
            let (res, idx, rest) = select_all(self.inputs.iter_mut().map(|rx| rx.changed().boxed())).await;
            drop(rest);
            if res.is_ok() {
                break;
            }
            self.inputs.remove(idx);
            self.seen.clear();
        }
        Some(self.get())
    }

    /// How many times the value was computed.
    pub fn computations(&self) -> u64 { self.computations }
}
