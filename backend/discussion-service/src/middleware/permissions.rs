/// Authorization for discussion-service
///
/// One predicate decides who may change a post, comment or profile: its
/// author, or an admin. Every mutation entry point goes through these helpers.
use uuid::Uuid;

use crate::domain::Role;
use crate::error::{Result, ServiceError};

/// Authenticated caller together with their stored role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub display_name: String,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            role,
            display_name: display_name.into(),
        }
    }

    pub fn id(&self) -> String {
        self.user_id.to_string()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Author or admin.
pub fn can_modify(actor: &Actor, author_id: &str) -> bool {
    actor.is_admin() || actor.id() == author_id
}

pub fn ensure_can_modify(actor: &Actor, author_id: &str, resource: &str) -> Result<()> {
    if can_modify(actor, author_id) {
        Ok(())
    } else {
        Err(ServiceError::permission_denied(format!(
            "You do not have permission to modify this {}",
            resource
        )))
    }
}

pub fn ensure_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::permission_denied("Only admins can perform this action"))
    }
}

/// Publishing posts needs the author or admin role.
pub fn ensure_can_publish(actor: &Actor) -> Result<()> {
    match actor.role {
        Role::Author | Role::Admin => Ok(()),
        Role::Basic => Err(ServiceError::permission_denied(
            "Only authors and admins can create posts",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor::new(Uuid::new_v4(), role, "Ada")
    }

    #[test]
    fn test_author_can_modify_own_content() {
        let author = actor(Role::Basic);
        assert!(can_modify(&author, &author.id()));
        assert!(ensure_can_modify(&author, &author.id(), "comment").is_ok());
    }

    #[test]
    fn test_other_user_cannot_modify() {
        let someone = actor(Role::Author);
        let err = ensure_can_modify(&someone, &Uuid::new_v4().to_string(), "comment").unwrap_err();
        assert_eq!(err.code(), "permission-denied");
    }

    #[test]
    fn test_admin_can_modify_anything() {
        let admin = actor(Role::Admin);
        assert!(can_modify(&admin, &Uuid::new_v4().to_string()));
        assert!(ensure_admin(&admin).is_ok());
    }

    #[test]
    fn test_publish_requires_author_or_admin() {
        assert!(ensure_can_publish(&actor(Role::Basic)).is_err());
        assert!(ensure_can_publish(&actor(Role::Author)).is_ok());
        assert!(ensure_can_publish(&actor(Role::Admin)).is_ok());
        assert!(ensure_admin(&actor(Role::Author)).is_err());
    }
}
