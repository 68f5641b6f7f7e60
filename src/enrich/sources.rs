//! Collaborator contracts for the enrichment pipeline.
//!
//! Each trait is the boundary to a remote source the core does not own:
//! the paginated giveaway listing, the profile page, the owned-games and
//! progress endpoints, bundle pages, and group membership listings. The
//! core is format-agnostic over whatever the implementations scrape or
//! decode, provided they return these shapes.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{OwnedSet, Record};

// == Owned Set Result ==
/// Outcome of enumerating what an external identity owns.
///
/// `Restricted` means the upstream profile refused enumeration; the caller
/// caches that as a sentinel instead of retrying every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedSetResult {
    /// Item id → usage minutes
    Owned(OwnedSet),
    /// The profile could not be enumerated
    Restricted,
}

// == Scanner ==
/// Paginated source of giveaway records for one page path.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Fetches one page of parsed records. An empty page means the source
    /// is exhausted; the core decides how far to follow pagination.
    async fn fetch_page(&self, page_key: &str, page_index: u32) -> Result<Vec<Record>>;
}

// == Profile Resolver ==
/// Resolves a winner name to its external identity handle.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Returns the external id, or `NotFound` when no linkable identity
    /// exists for the name.
    async fn resolve_external_identity(&self, name: &str) -> Result<String>;
}

// == Owned Set Fetcher ==
/// Enumerates the items an external identity owns.
#[async_trait]
pub trait OwnedSetFetcher: Send + Sync {
    async fn fetch_owned_set(&self, external_id: &str) -> Result<OwnedSetResult>;
}

// == Item Progress Fetcher ==
/// Fetches one item's progress for an external identity.
#[async_trait]
pub trait ItemProgressFetcher: Send + Sync {
    /// Returns `"done/total"`, or `"N/A"` when the item exposes no
    /// progress.
    async fn fetch_item_progress(&self, external_id: &str, item_id: u32) -> Result<String>;
}

// == Bundle Resolver ==
/// Resolves a bundle id to its member item ids.
#[async_trait]
pub trait BundleResolver: Send + Sync {
    /// Returns the member items, possibly empty.
    async fn resolve_bundle_items(&self, bundle_id: u32) -> Result<Vec<u32>>;
}

// == Membership Lister ==
/// Paginated listing of a group's member identities.
#[async_trait]
pub trait MembershipLister: Send + Sync {
    /// Fetches one page of member names. An empty page means the listing is
    /// exhausted.
    async fn fetch_members_page(&self, group_key: &str, page_index: u32) -> Result<Vec<String>>;
}
