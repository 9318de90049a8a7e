//! Core types for the Cyberbiz shopping MCP server.

pub mod catalog;
pub mod id;
pub mod product;
pub mod search;
pub mod tenant;

pub use catalog::{Genre, SortKey, StoreType, UnknownVariant};
pub use id::*;
pub use product::{
    Product, ProductDescription, ProductOption, ProductVariant, ProductVariantPhoto,
};
pub use search::{
    CandidateMatch, DEFAULT_LIMIT, MAX_LIMIT, PriceRange, SearchMode, SearchQuery, SearchQueryError,
};
pub use tenant::{SHOP_DOMAIN_HEADER, SHOP_ID_HEADER, TenantIdentity, TenantIdentityError};
