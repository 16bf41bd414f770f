// master/src/strategy.rs

use std::future::Future;

use common::WorkerAddr;
use tracing::warn;

use crate::error::DispatchError;

/// Dónde terminó ejecutándose una tarea.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Remote(WorkerAddr),
    Local,
}

#[derive(Debug, Clone)]
pub struct Executed<T> {
    pub value: T,
    pub placement: Placement,
}

/// Dos niveles: primero la cadena remota (reintentos + rotación de workers);
/// si se agota, el cálculo local en el master.
pub struct RemoteThenLocal<L> {
    op: &'static str,
    local: L,
}

impl<L> RemoteThenLocal<L> {
    pub fn new(op: &'static str, local: L) -> Self {
        Self { op, local }
    }

    pub async fn run<T, R>(self, remote: R) -> Executed<T>
    where
        L: FnOnce() -> T,
        R: Future<Output = Result<(WorkerAddr, T), DispatchError>>,
    {
        match remote.await {
            Ok((worker, value)) => Executed {
                value,
                placement: Placement::Remote(worker),
            },
            Err(e) => {
                warn!("{}: {}; calculando en el master", self.op, e);
                Executed {
                    value: (self.local)(),
                    placement: Placement::Local,
                }
            }
        }
    }
}
