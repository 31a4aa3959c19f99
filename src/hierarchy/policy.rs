//! Policy Resolver: effective `(scope, level)` for an organization node and
//! data category, plus the named preset catalog.
//!
//! The type-based default table is a pure function: tokens are minted against
//! it whenever no explicit policy row exists, so its output must be stable.

use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::organization::OrgType;
use crate::models::policy::{AccessLevel, DataCategory, PolicyInput, SharingScope};

use super::store::OrganizationStore;

/// Type-based default policy for a category when no explicit row exists.
///
/// GROUP shares everything group-wide. BRAND narrows ANALYTICS to group-level
/// summaries and keeps the rest brand-scoped. HOTEL keeps everything to
/// itself. DEPARTMENT gets read-only guest-facing data, full operational
/// data, and analytics consumption only.
pub fn default_policy(org_type: OrgType, category: DataCategory) -> (SharingScope, AccessLevel) {
    match org_type {
        OrgType::Group => (SharingScope::Group, AccessLevel::Full),
        OrgType::Brand => match category {
            DataCategory::Analytics => (SharingScope::Group, AccessLevel::SummaryOnly),
            _ => (SharingScope::Brand, AccessLevel::Full),
        },
        OrgType::Hotel => (SharingScope::Hotel, AccessLevel::Full),
        OrgType::Department => match category {
            DataCategory::Customer | DataCategory::Reservation | DataCategory::Financial => {
                (SharingScope::Department, AccessLevel::ReadOnly)
            }
            DataCategory::Analytics => (SharingScope::Department, AccessLevel::AnalyticsOnly),
            DataCategory::Staff | DataCategory::Inventory => {
                (SharingScope::Department, AccessLevel::Full)
            }
        },
    }
}

/// Read-through resolution: explicit row first, type default otherwise.
#[derive(Clone)]
pub struct PolicyResolver {
    store: OrganizationStore,
}

impl PolicyResolver {
    pub fn new(store: OrganizationStore) -> Self {
        Self { store }
    }

    pub async fn effective_policy(
        &self,
        organization_id: Uuid,
        org_type: OrgType,
        category: DataCategory,
    ) -> AppResult<(SharingScope, AccessLevel)> {
        match self.store.find_policy(organization_id, category).await? {
            Some(row) => Ok((row.sharing_scope, row.access_level)),
            None => Ok(default_policy(org_type, category)),
        }
    }
}

/// Expand a named preset into its per-category policy bundle. Returns None
/// for an unknown preset id.
pub fn preset_policies(preset_id: &str) -> Option<Vec<PolicyInput>> {
    let bundle: Vec<(DataCategory, SharingScope, AccessLevel)> = match preset_id {
        // Every category visible and writable across the whole group.
        "complete-integration" => DataCategory::ALL
            .into_iter()
            .map(|c| (c, SharingScope::Group, AccessLevel::Full))
            .collect(),
        // Brands operate independently; only analytics summaries roll up.
        "brand-separation" => DataCategory::ALL
            .into_iter()
            .map(|c| match c {
                DataCategory::Analytics => (c, SharingScope::Group, AccessLevel::SummaryOnly),
                _ => (c, SharingScope::Brand, AccessLevel::Full),
            })
            .collect(),
        // Each hotel is an island.
        "hotel-independence" => DataCategory::ALL
            .into_iter()
            .map(|c| (c, SharingScope::Hotel, AccessLevel::Full))
            .collect(),
        _ => return None,
    };

    Some(
        bundle
            .into_iter()
            .map(|(data_category, sharing_scope, access_level)| PolicyInput {
                data_category,
                sharing_scope,
                access_level,
                conditions: None,
            })
            .collect(),
    )
}

pub const PRESET_IDS: [&str; 3] = [
    "complete-integration",
    "brand-separation",
    "hotel-independence",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_defaults_to_group_wide_full() {
        for category in DataCategory::ALL {
            assert_eq!(
                default_policy(OrgType::Group, category),
                (SharingScope::Group, AccessLevel::Full)
            );
        }
    }

    #[test]
    fn brand_narrows_only_analytics() {
        assert_eq!(
            default_policy(OrgType::Brand, DataCategory::Analytics),
            (SharingScope::Group, AccessLevel::SummaryOnly)
        );
        assert_eq!(
            default_policy(OrgType::Brand, DataCategory::Customer),
            (SharingScope::Brand, AccessLevel::Full)
        );
        assert_eq!(
            default_policy(OrgType::Brand, DataCategory::Financial),
            (SharingScope::Brand, AccessLevel::Full)
        );
    }

    #[test]
    fn hotel_keeps_everything_hotel_scoped() {
        for category in DataCategory::ALL {
            assert_eq!(
                default_policy(OrgType::Hotel, category),
                (SharingScope::Hotel, AccessLevel::Full)
            );
        }
    }

    #[test]
    fn department_splits_guest_facing_from_operational() {
        assert_eq!(
            default_policy(OrgType::Department, DataCategory::Customer),
            (SharingScope::Department, AccessLevel::ReadOnly)
        );
        assert_eq!(
            default_policy(OrgType::Department, DataCategory::Reservation),
            (SharingScope::Department, AccessLevel::ReadOnly)
        );
        assert_eq!(
            default_policy(OrgType::Department, DataCategory::Staff),
            (SharingScope::Department, AccessLevel::Full)
        );
        assert_eq!(
            default_policy(OrgType::Department, DataCategory::Inventory),
            (SharingScope::Department, AccessLevel::Full)
        );
        assert_eq!(
            default_policy(OrgType::Department, DataCategory::Analytics),
            (SharingScope::Department, AccessLevel::AnalyticsOnly)
        );
    }

    #[test]
    fn hotel_independence_preset_is_hotel_full_for_all_six() {
        let bundle = preset_policies("hotel-independence").unwrap();
        assert_eq!(bundle.len(), DataCategory::ALL.len());
        for input in bundle {
            assert_eq!(input.sharing_scope, SharingScope::Hotel);
            assert_eq!(input.access_level, AccessLevel::Full);
        }
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(preset_policies("no-such-preset").is_none());
    }
}
