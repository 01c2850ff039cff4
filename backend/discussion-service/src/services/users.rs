/// User service: profiles, roles and admin grants
use chrono::Utc;
use doc_store::{
    encode, run_transaction, Fields, Query, RetryPolicy, SharedStore,
    SortDirection, Transaction,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{models::timestamp, paths, Role, UserProfile};
use crate::error::{Result, ServiceError};
use crate::metrics::record_error;
use crate::middleware::{ensure_admin, ensure_can_modify, Actor, Identity};
use crate::services::{clean_text, require_id};

const MAX_DISPLAY_NAME_CHARS: usize = 100;
const ANONYMOUS: &str = "Anonymous";

/// Profile fields a user may edit themselves. Role is not among them.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub banner_url: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    store: SharedStore,
    retry: RetryPolicy,
}

impl UserService {
    pub fn new(store: SharedStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Return the caller's profile, creating it with the `basic` role on
    /// first sight.
    pub async fn ensure_profile(&self, identity: &Identity) -> Result<UserProfile> {
        let uid = identity.user_id.to_string();
        let path = paths::user(&uid)?;

        let (profile, created) = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let path = path.clone();
            let uid = uid.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                if let Some(existing) = tx.get_as::<UserProfile>(&path).await? {
                    return Ok((existing, false));
                }

                let now = Utc::now();
                let profile = UserProfile {
                    uid,
                    display_name: identity
                        .display_name
                        .clone()
                        .filter(|name| !name.trim().is_empty())
                        .unwrap_or_else(|| ANONYMOUS.to_string()),
                    email: normalize_email(identity.email.as_deref().unwrap_or_default()),
                    photo_url: None,
                    banner_url: None,
                    role: Role::Basic,
                    created_at: now,
                    updated_at: now,
                };
                tx.create(path, encode(&profile)?);
                tx.commit().await?;
                Ok::<_, ServiceError>((profile, true))
            }
        })
        .await?;

        if created {
            info!(uid = %profile.uid, "User profile created");
        }
        Ok(profile)
    }

    /// Resolve the caller's role. A caller without a profile acts as `basic`.
    pub async fn actor(&self, identity: &Identity) -> Result<Actor> {
        let profile = self.ensure_profile(identity).await?;
        Ok(Actor::new(identity.user_id, profile.role, profile.display_name))
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserProfile> {
        require_id("User ID", uid)?;
        let doc = self
            .store
            .get(&paths::user(uid)?)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", uid))?;
        Ok(doc.decode()?)
    }

    /// Admin listing, optionally filtered by role, newest first.
    pub async fn list_users(&self, actor: &Actor, role: Option<Role>) -> Result<Vec<UserProfile>> {
        ensure_admin(actor)?;
        let mut query = Query::new(paths::users()?).order_by("createdAt", SortDirection::Descending);
        if let Some(role) = role {
            query = query.where_eq("role", role.as_str());
        }
        self.store
            .query(&query)
            .await?
            .iter()
            .map(|doc| doc.decode().map_err(ServiceError::from))
            .collect()
    }

    /// Edit display fields of a profile. Self or admin only.
    pub async fn update_profile(&self, actor: &Actor, uid: &str, patch: ProfilePatch) -> Result<UserProfile> {
        require_id("User ID", uid)?;
        ensure_can_modify(actor, uid, "profile")?;
        let display_name = patch
            .display_name
            .as_deref()
            .map(|name| clean_text("Display name", name, MAX_DISPLAY_NAME_CHARS))
            .transpose()?;

        let mut fields = Fields::new();
        if let Some(name) = &display_name {
            fields.insert("displayName".to_string(), Value::from(name.clone()));
        }
        if let Some(url) = &patch.photo_url {
            fields.insert("photoUrl".to_string(), Value::from(url.trim()));
        }
        if let Some(url) = &patch.banner_url {
            fields.insert("bannerUrl".to_string(), Value::from(url.trim()));
        }

        let result = self.patch_profile(uid, fields).await;
        match &result {
            Ok(_) => info!(uid, actor = %actor.user_id, "Profile updated"),
            Err(err) => record_error("update_profile", err.code()),
        }
        result
    }

    /// Promote the user registered under `email` to admin.
    pub async fn grant_admin(&self, actor: &Actor, email: &str) -> Result<String> {
        if !actor.is_admin() {
            warn!(actor = %actor.user_id, "Non-admin attempted to grant admin role");
            return Err(ServiceError::permission_denied("Only admins can add other admins."));
        }
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ServiceError::validation("validation/missing-fields", "Email is required"));
        }

        let query = Query::new(paths::users()?).where_eq("email", email.as_str()).limit(1);
        let target = self
            .store
            .query(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("User", &email))?;

        self.write_role(target.id(), Role::Admin).await?;
        info!(actor = %actor.user_id, target = %target.id(), "Admin role granted");
        Ok(format!("Success! {} has been made an admin.", email))
    }

    /// Change any user's role. Admin only.
    pub async fn set_role(&self, actor: &Actor, uid: &str, role: Role) -> Result<UserProfile> {
        ensure_admin(actor)?;
        require_id("User ID", uid)?;
        let profile = self.write_role(uid, role).await?;
        info!(actor = %actor.user_id, target = uid, role = %role, "Role updated");
        Ok(profile)
    }

    /// Remove a user's profile. Admin only; their posts and comments stay.
    pub async fn delete_user(&self, actor: &Actor, uid: &str) -> Result<()> {
        ensure_admin(actor)?;
        require_id("User ID", uid)?;
        let path = paths::user(uid)?;

        let result = run_transaction(&self.retry, || {
            let store = self.store.clone();
            let path = path.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                if tx.get(&path).await?.is_none() {
                    return Err(ServiceError::not_found("User", path.id()));
                }
                tx.delete(path);
                tx.commit().await?;
                Ok::<_, ServiceError>(())
            }
        })
        .await;

        match &result {
            Ok(()) => info!(actor = %actor.user_id, target = uid, "User deleted"),
            Err(err) => record_error("delete_user", err.code()),
        }
        result
    }

    async fn write_role(&self, uid: &str, role: Role) -> Result<UserProfile> {
        let mut fields = Fields::new();
        fields.insert("role".to_string(), Value::from(role.as_str()));
        self.patch_profile(uid, fields).await
    }

    async fn patch_profile(&self, uid: &str, fields: Fields) -> Result<UserProfile> {
        let path = paths::user(uid)?;

        run_transaction(&self.retry, || {
            let store = self.store.clone();
            let path = path.clone();
            let mut fields = fields.clone();
            async move {
                let mut tx = Transaction::begin(store.as_ref());
                let current = tx
                    .get(&path)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("User", path.id()))?;

                fields.insert(
                    "updatedAt".to_string(),
                    Value::from(timestamp::format(&Utc::now())),
                );
                let mut merged = current.data.clone();
                for (key, value) in &fields {
                    merged.insert(key.clone(), value.clone());
                }
                let profile: UserProfile = serde_json::from_value(Value::Object(merged))?;

                tx.update(path, fields, Vec::new());
                tx.commit().await?;
                Ok::<_, ServiceError>(profile)
            }
        })
        .await
    }
}

/// Emails are matched case-insensitively.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
