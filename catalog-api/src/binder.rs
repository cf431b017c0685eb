//! Customer context binding.
//!
//! The caller's price and cart reference are looked up next to the shared
//! part, never inside it. Unlike facet failures, any binding failure fails
//! the whole request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{CallerKey, CatalogError, CatalogResult, CustomerContext, PartId};
use tokio::time::timeout;

/// Source of caller-specific data for a part.
#[async_trait]
pub trait CustomerContextProvider: Send + Sync {
    async fn price_for(&self, caller: &CallerKey, part_id: PartId) -> CatalogResult<f64>;

    async fn cart_reference_for(&self, caller: &CallerKey, part_id: PartId) -> CatalogResult<i64>;
}

pub struct CustomerBinder {
    provider: Arc<dyn CustomerContextProvider>,
    deadline: Duration,
}

impl CustomerBinder {
    pub fn new(provider: Arc<dyn CustomerContextProvider>, deadline: Duration) -> Self {
        Self { provider, deadline }
    }

    /// Look up price and cart reference concurrently, within the deadline.
    pub async fn bind(&self, part_id: PartId, caller: &CallerKey) -> CatalogResult<CustomerContext> {
        let lookups = async {
            tokio::try_join!(
                self.provider.price_for(caller, part_id),
                self.provider.cart_reference_for(caller, part_id),
            )
        };

        match timeout(self.deadline, lookups).await {
            Ok(Ok((price, cart_reference))) => Ok(CustomerContext {
                price,
                cart_reference,
            }),
            Ok(Err(e)) => {
                tracing::warn!(part_id = %part_id, caller = %caller, error = %e, "Customer binding failed");
                Err(CatalogError::ContextBind {
                    part_id,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(part_id = %part_id, caller = %caller, "Customer binding timed out");
                Err(CatalogError::ContextBind {
                    part_id,
                    reason: format!("no response within {}ms", self.deadline.as_millis()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::StorageError;

    struct Provider {
        fail_cart: bool,
        delay: Duration,
    }

    #[async_trait]
    impl CustomerContextProvider for Provider {
        async fn price_for(&self, _caller: &CallerKey, _part_id: PartId) -> CatalogResult<f64> {
            tokio::time::sleep(self.delay).await;
            Ok(199.99)
        }

        async fn cart_reference_for(&self, _caller: &CallerKey, part_id: PartId) -> CatalogResult<i64> {
            if self.fail_cart {
                return Err(StorageError::QueryFailed {
                    statement: "cart_reference".to_string(),
                    reason: "no such customer".to_string(),
                }
                .into());
            }
            Ok(part_id.get() * 10)
        }
    }

    fn binder(fail_cart: bool, delay: Duration) -> CustomerBinder {
        CustomerBinder::new(Arc::new(Provider { fail_cart, delay }), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_bind_combines_lookups() {
        let ctx = binder(false, Duration::ZERO)
            .bind(PartId::new(11000), &CallerKey::new("key"))
            .await
            .unwrap();
        assert_eq!(ctx.price, 199.99);
        assert_eq!(ctx.cart_reference, 110000);
    }

    #[tokio::test]
    async fn test_one_failed_lookup_fails_binding() {
        let err = binder(true, Duration::ZERO)
            .bind(PartId::new(1), &CallerKey::new("key"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ContextBind { .. }));
        assert!(err.to_string().contains("no such customer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let err = binder(false, Duration::from_secs(10))
            .bind(PartId::new(1), &CallerKey::new("key"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500ms"));
    }
}
