//! Giveaway record model
//!
//! Defines the scanned record shape shared by the page cache and the
//! enrichment pipeline.

use serde::{Deserialize, Serialize};

// == Prize Reference ==
/// What a giveaway hands out: a single item or a bundle of items.
///
/// Discriminated explicitly so a record is always exactly one of the two;
/// downstream code matches instead of probing nullable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PrizeRef {
    /// Single item, keyed by its item id
    App(u32),
    /// Bundle, resolved lazily to member item ids
    Sub(u32),
}

// == Record ==
/// One scanned giveaway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identity: the giveaway URL when present, else a synthetic
    /// `name@ts` key for identity-less items
    pub gid: String,
    /// Display name
    pub name: String,
    /// Single item or bundle
    pub prize: PrizeRef,
    /// Event timestamp in epoch seconds, source-authoritative
    pub ts: u64,
    /// Restricted-access giveaway (invite/whitelist only)
    pub invite_only: bool,
    /// Creator identity when known
    pub creator: Option<String>,
    /// Ordered winner identities
    pub winners: Vec<String>,
}

impl Record {
    /// Derives a stable `gid` for a scanned item.
    ///
    /// A giveaway with a URL keeps it verbatim; items without one get a
    /// synthetic key combining name and timestamp, which is stable across
    /// rescans of the same source row.
    pub fn derive_gid(url: Option<&str>, name: &str, ts: u64) -> String {
        match url {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => format!("{}@{}", name, ts),
        }
    }

    /// Creates a record, deriving its `gid` from the optional source URL.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        url: Option<&str>,
        name: impl Into<String>,
        prize: PrizeRef,
        ts: u64,
        invite_only: bool,
        creator: Option<String>,
        winners: Vec<String>,
    ) -> Self {
        let name = name.into();
        Self {
            gid: Self::derive_gid(url, &name, ts),
            name,
            prize,
            ts,
            invite_only,
            creator,
            winners,
        }
    }
}

// == Enriched Record ==
/// A `(record, winner)` pair with the data fetched for that winner.
///
/// `None` values mean the winner's profile was restricted or unresolvable,
/// or the fetch failed; the distinction is logged, not modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// The merged record this enrichment belongs to
    pub record: Record,
    /// The winner this row describes
    pub winner: String,
    /// Minutes the winner has used the prize, summed over bundle members
    pub playtime_minutes: Option<u64>,
    /// Progress as `"done/total"`, `"N/A"` when unavailable
    pub progress: Option<String>,
}
