//! Tenant identity: the shop a request acts on behalf of.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::ShopId;

/// Header carrying the numeric shop id in header-trust deployments.
pub const SHOP_ID_HEADER: &str = "x-shop-id";

/// Header carrying the shop domain in header-trust deployments.
pub const SHOP_DOMAIN_HEADER: &str = "x-shop-domain";

/// Reasons a tenant identity cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantIdentityError {
    #[error("X-Shop-ID header is required")]
    MissingShopId,
    #[error("X-Shop-Domain header is required")]
    MissingShopDomain,
    #[error("Invalid X-Shop-ID: {0}")]
    InvalidShopId(String),
    #[error("shop claims missing from verified token: {0}")]
    MissingClaim(&'static str),
}

/// The shop a request is scoped to.
///
/// Exactly one identity exists per in-flight request. It is immutable once
/// bound; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantIdentity {
    shop_id: ShopId,
    shop_domain: String,
}

impl TenantIdentity {
    /// Create an identity from an already-validated id and domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is not positive or the domain is blank.
    pub fn new(shop_id: i64, shop_domain: impl Into<String>) -> Result<Self, TenantIdentityError> {
        if shop_id <= 0 {
            return Err(TenantIdentityError::InvalidShopId(shop_id.to_string()));
        }
        let shop_domain = shop_domain.into();
        if shop_domain.trim().is_empty() {
            return Err(TenantIdentityError::MissingShopDomain);
        }
        Ok(Self {
            shop_id: ShopId::new(shop_id),
            shop_domain,
        })
    }

    /// Build an identity from the raw `X-Shop-ID` / `X-Shop-Domain` header values.
    ///
    /// Presence is checked before parsing so a request missing both headers is
    /// reported as missing `X-Shop-ID`.
    ///
    /// # Errors
    ///
    /// Returns a distinct error for each missing header and for a shop id that
    /// is not a positive integer.
    pub fn from_headers(
        shop_id: Option<&str>,
        shop_domain: Option<&str>,
    ) -> Result<Self, TenantIdentityError> {
        let raw_id = shop_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(TenantIdentityError::MissingShopId)?;
        let domain = shop_domain
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(TenantIdentityError::MissingShopDomain)?;

        let id = raw_id
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| TenantIdentityError::InvalidShopId(raw_id.to_string()))?;

        Self::new(id, domain)
    }

    /// The shop's numeric id.
    #[must_use]
    pub const fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    /// The shop's storefront domain.
    #[must_use]
    pub fn shop_domain(&self) -> &str {
        &self.shop_domain
    }
}
