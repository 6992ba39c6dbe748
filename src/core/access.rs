//! Location-scoped access control.
//!
//! Every report query is restricted to the caller's [`LocationScope`]. The scope is
//! resolved once per request from the caller's [`AccessProfile`] and the locations
//! they asked for, then carried inside the filter context so that every aggregate in
//! a response sees exactly the same location predicate.

use crate::errors::{Error, Result};
use serde::Serialize;

/// Sentinel a caller sends to mean "every location I may see".
pub const ALL_LOCATIONS: &str = "all";

/// What a caller may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessProfile {
    /// Caller identity
    pub user_id: i64,
    /// Login name
    pub username: String,
    /// Admins see every location and may use the console and loader
    pub is_admin: bool,
    /// Permitted locations; ignored for admins
    pub allowed_locations: Vec<String>,
}

impl AccessProfile {
    /// Whether the caller may view rows for `location`.
    #[must_use]
    pub fn can_access_location(&self, location: &str) -> bool {
        self.is_admin || self.allowed_locations.iter().any(|l| l == location)
    }

    /// Fails with [`Error::AccessDenied`] unless the caller is an admin.
    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(Error::AccessDenied {
                reason: format!("only administrators may {action}"),
            })
        }
    }
}

/// The authoritative location restriction for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "locations", rename_all = "snake_case")]
pub enum LocationScope {
    /// No location predicate at all (admins only)
    Unrestricted,
    /// Rows must belong to one of these locations; never empty
    Only(Vec<String>),
}

impl LocationScope {
    /// Locations to filter by, or `None` when unrestricted.
    #[must_use]
    pub fn locations(&self) -> Option<&[String]> {
        match self {
            Self::Unrestricted => None,
            Self::Only(locations) => Some(locations),
        }
    }

    /// Locations sorted for use in cache keys; empty when unrestricted.
    #[must_use]
    pub fn sorted(&self) -> Vec<String> {
        let mut locations = self.locations().map(<[String]>::to_vec).unwrap_or_default();
        locations.sort();
        locations
    }
}

/// Outcome of resolving the requested locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLocations {
    /// Scope every query of the request must use
    pub scope: LocationScope,
    /// Requested locations that were dropped because the caller may not see them
    pub denied: Vec<String>,
}

impl ResolvedLocations {
    /// Advisory message naming the denied locations, if any were dropped.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        if self.denied.is_empty() {
            None
        } else {
            Some(format!("Access denied to: {}", self.denied.join(", ")))
        }
    }
}

fn wants_everything(requested: &[String]) -> bool {
    requested.is_empty() || requested.iter().any(|l| l == ALL_LOCATIONS)
}

/// Resolves the caller's requested locations into the scope every query must use.
///
/// The `"all"` sentinel deliberately means two different things:
/// - for an admin it lifts the location predicate entirely;
/// - for anyone else it expands to their full permitted list, never beyond it.
///
/// Non-admin requests are intersected with the permitted list. Dropped locations are
/// reported in [`ResolvedLocations::denied`] and do not fail the request. If nothing
/// survives, the request fails with [`Error::AccessDenied`].
pub fn resolve_locations(
    profile: &AccessProfile,
    requested: &[String],
) -> Result<ResolvedLocations> {
    if profile.is_admin {
        let scope = if wants_everything(requested) {
            LocationScope::Unrestricted
        } else {
            LocationScope::Only(requested.to_vec())
        };
        return Ok(ResolvedLocations {
            scope,
            denied: Vec::new(),
        });
    }

    let (granted, denied) = if wants_everything(requested) {
        (profile.allowed_locations.clone(), Vec::new())
    } else {
        let mut granted = Vec::new();
        let mut denied = Vec::new();
        for location in requested {
            let bucket = if profile.can_access_location(location) {
                &mut granted
            } else {
                &mut denied
            };
            if !bucket.contains(location) {
                bucket.push(location.clone());
            }
        }
        (granted, denied)
    };

    if !denied.is_empty() {
        tracing::warn!(
            user_id = profile.user_id,
            "Access denied to requested locations: {}",
            denied.join(", ")
        );
    }

    if granted.is_empty() {
        return Err(Error::AccessDenied {
            reason: format!(
                "user {} has no viewable locations for this request",
                profile.username
            ),
        });
    }

    Ok(ResolvedLocations {
        scope: LocationScope::Only(granted),
        denied,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn restricted(allowed: &[&str]) -> AccessProfile {
        AccessProfile {
            user_id: 2,
            username: "clerk".to_string(),
            is_admin: false,
            allowed_locations: strings(allowed),
        }
    }

    fn admin() -> AccessProfile {
        AccessProfile {
            user_id: 1,
            username: "root".to_string(),
            is_admin: true,
            allowed_locations: Vec::new(),
        }
    }

    #[test]
    fn test_admin_all_is_unrestricted() {
        let resolved = resolve_locations(&admin(), &strings(&["all"])).unwrap();
        assert_eq!(resolved.scope, LocationScope::Unrestricted);

        let resolved = resolve_locations(&admin(), &[]).unwrap();
        assert_eq!(resolved.scope, LocationScope::Unrestricted);
    }

    #[test]
    fn test_admin_specific_locations_are_kept_verbatim() {
        let resolved = resolve_locations(&admin(), &strings(&["X", "Y"])).unwrap();
        assert_eq!(resolved.scope, LocationScope::Only(strings(&["X", "Y"])));
        assert!(resolved.warning().is_none());
    }

    // Same sentinel, different meaning: a non-admin asking for "all" gets their own
    // list, not the whole chain.
    #[test]
    fn test_non_admin_all_expands_to_permitted_list() {
        let profile = restricted(&["A", "B"]);
        let resolved = resolve_locations(&profile, &strings(&["all"])).unwrap();
        assert_eq!(resolved.scope, LocationScope::Only(strings(&["A", "B"])));

        let resolved = resolve_locations(&profile, &[]).unwrap();
        assert_eq!(resolved.scope, LocationScope::Only(strings(&["A", "B"])));
    }

    #[test]
    fn test_non_admin_partial_request_warns() {
        let profile = restricted(&["A", "B"]);
        let resolved = resolve_locations(&profile, &strings(&["B", "C"])).unwrap();
        assert_eq!(resolved.scope, LocationScope::Only(strings(&["B"])));
        assert_eq!(resolved.denied, strings(&["C"]));
        assert_eq!(resolved.warning().unwrap(), "Access denied to: C");
    }

    #[test]
    fn test_non_admin_fully_denied_request_fails() {
        let profile = restricted(&["A", "B"]);
        let result = resolve_locations(&profile, &strings(&["C"]));
        assert!(matches!(result, Err(Error::AccessDenied { .. })));
    }

    #[test]
    fn test_non_admin_without_locations_fails() {
        let profile = restricted(&[]);
        let result = resolve_locations(&profile, &strings(&["all"]));
        assert!(matches!(result, Err(Error::AccessDenied { .. })));
    }

    #[test]
    fn test_non_admin_scope_is_always_permitted_subset() {
        let profile = restricted(&["A", "B", "C"]);
        let requests = [
            strings(&["A"]),
            strings(&["A", "Z"]),
            strings(&["C", "C", "B"]),
            strings(&["all", "Z"]),
            strings(&["Z"]),
            Vec::new(),
        ];
        for request in &requests {
            match resolve_locations(&profile, request) {
                Ok(resolved) => {
                    let locations = resolved.scope.locations().unwrap();
                    assert!(!locations.is_empty());
                    assert!(locations.iter().all(|l| profile.can_access_location(l)));
                }
                Err(e) => assert!(matches!(e, Error::AccessDenied { .. })),
            }
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(admin().require_admin("run queries").is_ok());
        assert!(matches!(
            restricted(&["A"]).require_admin("run queries"),
            Err(Error::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_sorted_scope() {
        let scope = LocationScope::Only(strings(&["b", "a"]));
        assert_eq!(scope.sorted(), strings(&["a", "b"]));
        assert!(LocationScope::Unrestricted.sorted().is_empty());
    }
}
