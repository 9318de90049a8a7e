//! Request-scoped tenant context.
//!
//! The tenant identity of the current request lives in a tokio task-local
//! slot. [`scope`] binds an identity for the lifetime of a future; every call
//! made from inside that future (directly, or through futures it polls such as
//! `join_all` fan-outs) sees the same identity, and nothing outside it can.
//! The slot is dropped when the scoped future completes, so a worker thread
//! that later polls another request starts with no identity at all.
//!
//! Work moved onto a separate task with `tokio::spawn` does not inherit the
//! slot. Wrap it in [`scope`] again with [`current`] if it needs the tenant.

use std::future::Future;

use cyberbiz_mcp_core::{ShopId, TenantIdentity};
use thiserror::Error;

tokio::task_local! {
    static CURRENT_TENANT: TenantIdentity;
}

/// The tenant context was read outside of a bound request.
///
/// This is a programming error: the authentication gate must bind the
/// identity before any handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tenant context not initialized: no shop bound to the current request")]
pub struct TenantContextError;

/// Run `future` with `identity` bound as the current tenant.
pub async fn scope<F>(identity: TenantIdentity, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_TENANT.scope(identity, future).await
}

/// The identity bound to the current request.
///
/// # Errors
///
/// Returns [`TenantContextError`] if called outside [`scope`].
pub fn current() -> Result<TenantIdentity, TenantContextError> {
    CURRENT_TENANT
        .try_with(Clone::clone)
        .map_err(|_| TenantContextError)
}

/// The current request's shop id.
///
/// # Errors
///
/// Returns [`TenantContextError`] if called outside [`scope`].
pub fn current_shop_id() -> Result<ShopId, TenantContextError> {
    CURRENT_TENANT
        .try_with(TenantIdentity::shop_id)
        .map_err(|_| TenantContextError)
}

/// The current request's shop domain.
///
/// # Errors
///
/// Returns [`TenantContextError`] if called outside [`scope`].
pub fn current_shop_domain() -> Result<String, TenantContextError> {
    CURRENT_TENANT
        .try_with(|t| t.shop_domain().to_string())
        .map_err(|_| TenantContextError)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn identity(id: i64) -> TenantIdentity {
        TenantIdentity::new(id, format!("shop{id}.cyberbiz.co")).expect("valid identity")
    }

    #[test]
    fn test_read_before_bind_fails() {
        assert_eq!(current_shop_id(), Err(TenantContextError));
        assert_eq!(current_shop_domain(), Err(TenantContextError));
        assert!(current().is_err());
    }

    #[tokio::test]
    async fn test_scope_binds_identity() {
        let (id, domain) = scope(identity(146), async {
            (current_shop_id(), current_shop_domain())
        })
        .await;
        assert_eq!(id, Ok(ShopId::new(146)));
        assert_eq!(domain.as_deref(), Ok("shop146.cyberbiz.co"));
    }

    #[tokio::test]
    async fn test_slot_cleared_after_scope() {
        scope(identity(1), async {}).await;
        assert_eq!(current_shop_id(), Err(TenantContextError));
    }

    #[tokio::test]
    async fn test_identity_survives_await_points() {
        let seen = scope(identity(7), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tokio::task::yield_now().await;
            current_shop_id()
        })
        .await;
        assert_eq!(seen, Ok(ShopId::new(7)));
    }

    #[tokio::test]
    async fn test_nested_scope_shadows_and_restores() {
        scope(identity(1), async {
            let inner = scope(identity(2), async { current_shop_id() }).await;
            assert_eq!(inner, Ok(ShopId::new(2)));
            assert_eq!(current_shop_id(), Ok(ShopId::new(1)));
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_are_isolated() {
        let mut handles = Vec::new();
        for i in 0..64_i64 {
            let shop = (i % 2) + 1;
            handles.push(tokio::spawn(scope(identity(shop), async move {
                for step in 0..20_u64 {
                    tokio::time::sleep(Duration::from_micros((step * 37 + 11) % 200)).await;
                    assert_eq!(current_shop_id(), Ok(ShopId::new(shop)));
                    tokio::task::yield_now().await;
                }
                current_shop_domain()
            })));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let shop = (i % 2) + 1;
            let domain = handle.await.expect("task panicked");
            assert_eq!(domain, Ok(format!("shop{shop}.cyberbiz.co")));
        }
    }

    #[tokio::test]
    async fn test_spawned_task_does_not_inherit() {
        let leaked = scope(identity(3), async {
            tokio::spawn(async { current_shop_id() })
                .await
                .expect("task panicked")
        })
        .await;
        assert_eq!(leaked, Err(TenantContextError));
    }
}
