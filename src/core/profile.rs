//! Access profile storage.
//!
//! Profiles are provisioned with an account and edited by administrators; they
//! are never deleted while the account exists.

use crate::{
    core::access::AccessProfile,
    entities::{AccessProfile as AccessProfileEntity, access_profile},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};

impl TryFrom<access_profile::Model> for AccessProfile {
    type Error = Error;

    fn try_from(model: access_profile::Model) -> Result<Self> {
        let allowed_locations: Vec<String> = serde_json::from_value(model.allowed_locations)?;
        Ok(Self {
            user_id: model.user_id,
            username: model.username,
            is_admin: model.is_admin,
            allowed_locations,
        })
    }
}

/// Creates the profile for a newly provisioned account.
pub async fn create_profile(
    db: &DatabaseConnection,
    user_id: i64,
    username: &str,
    is_admin: bool,
    allowed_locations: &[String],
) -> Result<AccessProfile> {
    if username.trim().is_empty() {
        return Err(Error::Config {
            message: "Username cannot be empty".to_string(),
        });
    }

    let profile = access_profile::ActiveModel {
        user_id: Set(user_id),
        username: Set(username.trim().to_string()),
        is_admin: Set(is_admin),
        allowed_locations: Set(serde_json::to_value(allowed_locations)?),
    };
    let model = profile.insert(db).await?;
    tracing::info!(
        user_id,
        is_admin,
        "Provisioned access profile with {} locations",
        allowed_locations.len()
    );
    model.try_into()
}

/// Looks up a profile, returning `None` if the account has none.
pub async fn get_profile(db: &DatabaseConnection, user_id: i64) -> Result<Option<AccessProfile>> {
    AccessProfileEntity::find_by_id(user_id)
        .one(db)
        .await?
        .map(AccessProfile::try_from)
        .transpose()
}

/// Looks up a profile, failing with [`Error::ProfileNotFound`] if missing.
pub async fn require_profile(db: &DatabaseConnection, user_id: i64) -> Result<AccessProfile> {
    get_profile(db, user_id)
        .await?
        .ok_or(Error::ProfileNotFound { user_id })
}

/// Changes the admin flag and/or the permitted locations.
pub async fn update_profile(
    db: &DatabaseConnection,
    user_id: i64,
    is_admin: Option<bool>,
    allowed_locations: Option<&[String]>,
) -> Result<AccessProfile> {
    let model = AccessProfileEntity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::ProfileNotFound { user_id })?;
    if is_admin.is_none() && allowed_locations.is_none() {
        return model.try_into();
    }

    let mut active: access_profile::ActiveModel = model.into();
    if let Some(is_admin) = is_admin {
        active.is_admin = Set(is_admin);
    }
    if let Some(locations) = allowed_locations {
        active.allowed_locations = Set(serde_json::to_value(locations)?);
    }
    let updated = active.update(db).await?;
    tracing::info!(user_id, "Updated access profile");
    updated.try_into()
}

/// Every profile, ordered by username.
pub async fn list_profiles(db: &DatabaseConnection) -> Result<Vec<AccessProfile>> {
    AccessProfileEntity::find()
        .order_by_asc(access_profile::Column::Username)
        .all(db)
        .await?
        .into_iter()
        .map(AccessProfile::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_create_and_fetch_profile() -> Result<()> {
        let db = setup_test_db().await?;
        let locations = vec!["A".to_string(), "B".to_string()];
        create_profile(&db, 7, " clerk ", false, &locations).await?;

        let profile = require_profile(&db, 7).await?;
        assert_eq!(profile.username, "clerk");
        assert!(!profile.is_admin);
        assert_eq!(profile.allowed_locations, locations);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_profile_is_fatal() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(get_profile(&db, 99).await?.is_none());

        let err = require_profile(&db, 99).await.err();
        assert!(matches!(err, Some(Error::ProfileNotFound { user_id: 99 })));
        assert!(err.is_some_and(|e| e.is_request_fatal()));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_profile() -> Result<()> {
        let db = setup_test_db().await?;
        create_profile(&db, 1, "manager", false, &["A".to_string()]).await?;

        let updated = update_profile(&db, 1, Some(true), Some(&["A".to_string(), "C".to_string()][..]))
            .await?;
        assert!(updated.is_admin);
        assert_eq!(updated.allowed_locations.len(), 2);

        let untouched = update_profile(&db, 1, None, None).await?;
        assert_eq!(untouched, updated);

        let missing = update_profile(&db, 2, Some(true), None).await;
        assert!(matches!(missing, Err(Error::ProfileNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_profiles_sorted() -> Result<()> {
        let db = setup_test_db().await?;
        create_profile(&db, 2, "zed", false, &["A".to_string()]).await?;
        create_profile(&db, 1, "amy", true, &[]).await?;

        let names: Vec<String> = list_profiles(&db).await?.into_iter().map(|p| p.username).collect();
        assert_eq!(names, vec!["amy".to_string(), "zed".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_username_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let result = create_profile(&db, 3, "  ", false, &[]).await;
        assert!(matches!(result, Err(Error::Config { .. })));
        Ok(())
    }
}
