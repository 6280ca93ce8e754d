//! Pass planning: the remote calls that move the server from `baseline` to
//! `local`.
//!
//! Order is deterministic so the same inputs always produce the same call
//! sequence:
//!
//! 1. `remove` for every id in `baseline` missing from `local` (ascending id)
//! 2. per id in `local` (ascending id):
//!    - new id: `add`, then `increase` `qty - 1` times
//!    - grown: `increase` `delta` times
//!    - shrunk: `decrease` `-delta` times
//!
//! An empty `local` against a non-empty `baseline` is planned as a single
//! `clear`.

use core::fmt;

use cart_sync_core::{Cart, ProductId};

use crate::client::{CartService, ClientError};

/// One remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Add(ProductId),
    Increase(ProductId),
    Decrease(ProductId),
    Remove(ProductId),
    Clear,
}

impl RemoteOp {
    /// Issue this call.
    ///
    /// # Errors
    ///
    /// Returns the service error unchanged.
    pub async fn apply<S: CartService + ?Sized>(&self, service: &S) -> Result<(), ClientError> {
        match self {
            Self::Add(id) => service.add(id).await,
            Self::Increase(id) => service.increase(id).await,
            Self::Decrease(id) => service.decrease(id).await,
            Self::Remove(id) => service.remove(id).await,
            Self::Clear => service.clear().await,
        }
    }
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(id) => write!(f, "add({id})"),
            Self::Increase(id) => write!(f, "increase({id})"),
            Self::Decrease(id) => write!(f, "decrease({id})"),
            Self::Remove(id) => write!(f, "remove({id})"),
            Self::Clear => f.write_str("clear()"),
        }
    }
}

/// Plan the calls that bring the server from `baseline` to `local`.
#[must_use]
pub fn plan_pass(local: &Cart, baseline: &Cart) -> Vec<RemoteOp> {
    if local.is_empty() {
        return if baseline.is_empty() {
            Vec::new()
        } else {
            vec![RemoteOp::Clear]
        };
    }

    let mut ops: Vec<RemoteOp> = baseline
        .sorted_ids()
        .into_iter()
        .filter(|id| !local.contains(id))
        .map(|id| RemoteOp::Remove(id.clone()))
        .collect();

    for id in local.sorted_ids() {
        let target = i64::from(local.quantity_of(id));
        let current = i64::from(baseline.quantity_of(id));

        if current == 0 {
            ops.push(RemoteOp::Add(id.clone()));
            push_repeated(&mut ops, target - 1, || RemoteOp::Increase(id.clone()));
        } else if target > current {
            push_repeated(&mut ops, target - current, || RemoteOp::Increase(id.clone()));
        } else if target < current {
            push_repeated(&mut ops, current - target, || RemoteOp::Decrease(id.clone()));
        }
    }

    ops
}

fn push_repeated(ops: &mut Vec<RemoteOp>, times: i64, op: impl Fn() -> RemoteOp) {
    for _ in 0..times.max(0) {
        ops.push(op());
    }
}
