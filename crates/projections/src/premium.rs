//! Premium status projection.

use std::sync::Arc;

use catalog::ProductCatalog;
use futures_util::StreamExt;
use ledger::{EntitlementStore, ProductId, UserId, UserStore};

use crate::{ProjectionError, Result};

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Users whose flag was recomputed.
    pub users: usize,
    /// Users whose stored flag was wrong and has been corrected.
    pub changed: usize,
}

/// Recomputes the premium flag on the user record.
///
/// The set of premium products is fixed when the projector is built, so
/// callers cannot pass a different set for different users.
#[derive(Debug, Clone)]
pub struct PremiumProjector<S> {
    store: S,
    premium_products: Arc<[ProductId]>,
}

impl<S> PremiumProjector<S>
where
    S: EntitlementStore + UserStore,
{
    /// Creates a projector using the catalog's premium products.
    pub fn new(store: S, catalog: &ProductCatalog) -> Self {
        Self::with_products(store, catalog.premium_product_ids())
    }

    /// Creates a projector for an explicit set of premium products.
    pub fn with_products(store: S, premium_products: impl IntoIterator<Item = ProductId>) -> Self {
        Self {
            store,
            premium_products: premium_products.into_iter().collect(),
        }
    }

    /// Returns true if granting this product can change the premium flag.
    pub fn affects_premium(&self, product_id: &ProductId) -> bool {
        self.premium_products.contains(product_id)
    }

    /// Recomputes and persists the user's premium flag, returning the new
    /// value.
    ///
    /// Safe to call any number of times; the result depends only on the
    /// ledger's current quantities.
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn reproject(&self, user_id: UserId) -> Result<bool> {
        let projection = self
            .store
            .project_premium(user_id, &self.premium_products)
            .await?;

        if projection.changed {
            metrics::counter!("premium_status_changes_total").increment(1);
            tracing::info!(is_premium = projection.is_premium, "premium status changed");
        }

        Ok(projection.is_premium)
    }

    /// Reads the stored premium flag.
    pub async fn is_premium(&self, user_id: UserId) -> Result<bool> {
        Ok(self.store.is_premium(user_id).await?)
    }

    /// Reprojects every user known to the ledger.
    ///
    /// Repairs flags left stale by a reprojection that never ran, e.g. after
    /// a crash between grant and projection.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<RebuildSummary> {
        let mut users = self.store.stream_users().await?;
        let mut summary = RebuildSummary::default();

        while let Some(user) = users.next().await {
            let processed = summary.users;
            let aborted = move |source| ProjectionError::RebuildAborted { processed, source };
            let user_id = user.map_err(aborted)?;
            let projection = self
                .store
                .project_premium(user_id, &self.premium_products)
                .await
                .map_err(aborted)?;

            summary.users += 1;
            if projection.changed {
                summary.changed += 1;
                metrics::counter!("premium_status_changes_total").increment(1);
            }
        }

        tracing::info!(
            users = summary.users,
            changed = summary.changed,
            "premium rebuild complete"
        );
        Ok(summary)
    }
}
