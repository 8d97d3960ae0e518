//! Object storage reachability check, used at startup and by `/readyz`

use opendal::Operator;
use zkshare_core::{ShareError, ShareResult};

/// List the root. Any backend error, including auth, counts as unreachable.
pub async fn check_health(op: &Operator) -> ShareResult<()> {
    match op.list("/").await {
        Ok(_) => Ok(()),
        Err(e) => Err(ShareError::Storage(format!(
            "{} backend unreachable: {e}",
            op.info().scheme()
        ))),
    }
}

pub async fn is_healthy(op: &Operator) -> bool {
    check_health(op).await.is_ok()
}
