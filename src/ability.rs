//! Per-user, per-space capability evaluation.
//!
//! An [`Ability`] is computed fresh for every request from membership rows;
//! nothing is cached. Roles map to grants through a fixed policy:
//!
//! | Role   | Page   | Member | Settings |
//! |--------|--------|--------|----------|
//! | admin  | Manage | Manage | Manage   |
//! | writer | Manage | Read   | Read     |
//! | reader | Read   | Read   | Read     |
//!
//! `Manage` implies every other action on the same subject. A user with no
//! membership (or a space outside the caller's workspace) gets no grants.

use crate::db::PageError;
use crate::models::{RequestContext, SpaceRole};
use crate::repo;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, TryLockError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Edit,
    Manage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Page,
    Member,
    Settings,
}

/// The set of actions a user may perform within one space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ability {
    grants: BTreeSet<(Action, Subject)>,
}

impl Ability {
    /// An ability that denies everything.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::default()
    }

    /// Ability for the highest role a user holds, if any.
    pub fn for_role(role: Option<SpaceRole>) -> Self {
        let grants: &[(Action, Subject)] = match role {
            Some(SpaceRole::Admin) => &[
                (Action::Manage, Subject::Page),
                (Action::Manage, Subject::Member),
                (Action::Manage, Subject::Settings),
            ],
            Some(SpaceRole::Writer) => &[
                (Action::Manage, Subject::Page),
                (Action::Read, Subject::Member),
                (Action::Read, Subject::Settings),
            ],
            Some(SpaceRole::Reader) => &[
                (Action::Read, Subject::Page),
                (Action::Read, Subject::Member),
                (Action::Read, Subject::Settings),
            ],
            None => &[],
        };
        Self {
            grants: grants.iter().copied().collect(),
        }
    }

    pub fn can(&self, action: Action, subject: Subject) -> bool {
        self.grants.contains(&(Action::Manage, subject)) || self.grants.contains(&(action, subject))
    }

    pub fn cannot(&self, action: Action, subject: Subject) -> bool {
        !self.can(action, subject)
    }
}

/// Source of abilities. Implementations must be safe to call from two
/// threads at once: cross-space operations evaluate both spaces in parallel.
pub trait AbilityProvider: Sync {
    fn evaluate(&self, ctx: &RequestContext, space_id: &str) -> Result<Ability, PageError>;
}

/// Evaluates abilities from the `space_members` and `group_users` tables.
///
/// Holds its own connections so evaluations never interleave with the
/// caller's open transaction. Each connection serves one evaluation at a
/// time; give it two and the pair checked by cross-space operations runs in
/// parallel instead of queueing on one lock.
pub struct MembershipAbilities {
    conns: Vec<Mutex<Connection>>,
}

impl MembershipAbilities {
    pub fn new(conn: Connection) -> Self {
        Self {
            conns: vec![Mutex::new(conn)],
        }
    }

    /// Adds another connection to the same database.
    pub fn with_connection(mut self, conn: Connection) -> Self {
        self.conns.push(Mutex::new(conn));
        self
    }

    /// First idle connection, or waits on the first one when all are busy.
    fn acquire(&self) -> MutexGuard<'_, Connection> {
        for conn in &self.conns {
            match conn.try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(e)) => return e.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }
        }
        // `new` seeds one connection and nothing removes it.
        self.conns[0].lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AbilityProvider for MembershipAbilities {
    fn evaluate(&self, ctx: &RequestContext, space_id: &str) -> Result<Ability, PageError> {
        let conn = self.acquire();
        let role = repo::find_user_space_role(&conn, &ctx.workspace_id, space_id, &ctx.user_id)?;
        tracing::debug!(user = %ctx.user_id, space = %space_id, role = ?role, "evaluated ability");
        Ok(Ability::for_role(role))
    }
}

/// Fails with `Forbidden` unless the caller may perform `action` on `subject`
/// in `space_id`.
pub fn authorize<A: AbilityProvider + ?Sized>(
    provider: &A,
    ctx: &RequestContext,
    space_id: &str,
    action: Action,
    subject: Subject,
) -> Result<(), PageError> {
    let ability = provider.evaluate(ctx, space_id)?;
    if ability.cannot(action, subject) {
        tracing::warn!(user = %ctx.user_id, space = %space_id, ?action, ?subject, "ability denied");
        return Err(PageError::Forbidden);
    }
    Ok(())
}

/// Evaluates two spaces concurrently and waits for both results.
pub fn evaluate_pair<A: AbilityProvider + ?Sized>(
    provider: &A,
    ctx: &RequestContext,
    first: &str,
    second: &str,
) -> Result<(Ability, Ability), PageError> {
    std::thread::scope(|scope| {
        let a = scope.spawn(|| provider.evaluate(ctx, first));
        let b = scope.spawn(|| provider.evaluate(ctx, second));
        let a = a.join().unwrap_or_else(|e| std::panic::resume_unwind(e));
        let b = b.join().unwrap_or_else(|e| std::panic::resume_unwind(e));
        Ok((a?, b?))
    })
}

/// In-memory role assignments for service tests.
#[cfg(test)]
#[derive(Default)]
pub struct RoleTable {
    roles: std::collections::HashMap<(String, String), SpaceRole>,
    evaluated: Mutex<Vec<String>>,
}

#[cfg(test)]
impl RoleTable {
    pub fn grant(mut self, user_id: &str, space_id: &str, role: SpaceRole) -> Self {
        self.roles.insert((user_id.to_string(), space_id.to_string()), role);
        self
    }

    /// Space ids evaluated so far, in call order.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl AbilityProvider for RoleTable {
    fn evaluate(&self, ctx: &RequestContext, space_id: &str) -> Result<Ability, PageError> {
        self.evaluated.lock().unwrap().push(space_id.to_string());
        let role = self
            .roles
            .get(&(ctx.user_id.clone(), space_id.to_string()))
            .copied();
        Ok(Ability::for_role(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_test_db;

    fn ctx(user: &str) -> RequestContext {
        RequestContext {
            user_id: user.to_string(),
            workspace_id: "ws".to_string(),
        }
    }

    #[test]
    fn no_role_denies_everything() {
        let ability = Ability::for_role(None);
        for action in [Action::Read, Action::Create, Action::Edit, Action::Manage] {
            assert!(ability.cannot(action, Subject::Page));
        }
        assert_eq!(ability, Ability::none());
    }

    #[test]
    fn reader_can_only_read_pages() {
        let ability = Ability::for_role(Some(SpaceRole::Reader));
        assert!(ability.can(Action::Read, Subject::Page));
        assert!(ability.cannot(Action::Create, Subject::Page));
        assert!(ability.cannot(Action::Edit, Subject::Page));
        assert!(ability.cannot(Action::Manage, Subject::Page));
    }

    #[test]
    fn writer_manages_pages_but_not_members() {
        let ability = Ability::for_role(Some(SpaceRole::Writer));
        for action in [Action::Read, Action::Create, Action::Edit, Action::Manage] {
            assert!(ability.can(action, Subject::Page));
        }
        assert!(ability.can(Action::Read, Subject::Member));
        assert!(ability.cannot(Action::Manage, Subject::Member));
        assert!(ability.cannot(Action::Edit, Subject::Settings));
    }

    #[test]
    fn admin_manages_everything() {
        let ability = Ability::for_role(Some(SpaceRole::Admin));
        for subject in [Subject::Page, Subject::Member, Subject::Settings] {
            assert!(ability.can(Action::Manage, subject));
            assert!(ability.can(Action::Edit, subject));
        }
    }

    #[test]
    fn membership_abilities_read_direct_roles() {
        let conn = open_test_db();
        let space = repo::create_space(&conn, "ws", "docs", "Docs", "", "t").unwrap();
        repo::grant_role(&conn, &space.id, "alice", SpaceRole::Writer, "t").unwrap();

        let abilities = MembershipAbilities::new(conn);
        let alice = abilities.evaluate(&ctx("alice"), &space.id).unwrap();
        assert!(alice.can(Action::Edit, Subject::Page));

        let bob = abilities.evaluate(&ctx("bob"), &space.id).unwrap();
        assert!(bob.cannot(Action::Read, Subject::Page));
    }

    #[test]
    fn membership_abilities_take_highest_group_role() {
        let conn = open_test_db();
        let space = repo::create_space(&conn, "ws", "docs", "Docs", "", "t").unwrap();
        repo::grant_role(&conn, &space.id, "carol", SpaceRole::Reader, "t").unwrap();
        repo::add_group_user(&conn, "editors", "carol").unwrap();
        repo::grant_group_role(&conn, &space.id, "editors", SpaceRole::Admin, "t").unwrap();

        let abilities = MembershipAbilities::new(conn);
        let carol = abilities.evaluate(&ctx("carol"), &space.id).unwrap();
        assert!(carol.can(Action::Manage, Subject::Member));
    }

    #[test]
    fn membership_abilities_deny_other_workspaces() {
        let conn = open_test_db();
        let space = repo::create_space(&conn, "other-ws", "docs", "Docs", "", "t").unwrap();
        repo::grant_role(&conn, &space.id, "alice", SpaceRole::Admin, "t").unwrap();

        let abilities = MembershipAbilities::new(conn);
        let alice = abilities.evaluate(&ctx("alice"), &space.id).unwrap();
        assert_eq!(alice, Ability::none());
    }

    #[test]
    fn membership_abilities_recompute_after_revoke() {
        let conn = open_test_db();
        let space = repo::create_space(&conn, "ws", "docs", "Docs", "", "t").unwrap();
        repo::grant_role(&conn, &space.id, "alice", SpaceRole::Writer, "t").unwrap();
        let abilities = MembershipAbilities::new(conn);
        assert!(abilities.evaluate(&ctx("alice"), &space.id).unwrap().can(Action::Edit, Subject::Page));

        {
            let conn = abilities.conns[0].lock().unwrap();
            repo::revoke_role(&conn, &space.id, "alice").unwrap();
        }
        assert!(abilities.evaluate(&ctx("alice"), &space.id).unwrap().cannot(Action::Read, Subject::Page));
    }

    #[test]
    fn membership_abilities_skip_a_busy_connection() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("abilities.db");
        let mut conn = crate::db::open_connection_at(&path).unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        let s1 = repo::create_space(&conn, "ws", "one", "One", "", "t").unwrap();
        let s2 = repo::create_space(&conn, "ws", "two", "Two", "", "t").unwrap();
        repo::grant_role(&conn, &s1.id, "alice", SpaceRole::Writer, "t").unwrap();
        repo::grant_role(&conn, &s2.id, "alice", SpaceRole::Reader, "t").unwrap();
        let abilities =
            MembershipAbilities::new(conn).with_connection(crate::db::open_connection_at(&path).unwrap());

        {
            // With a single connection this evaluation would block forever.
            let _busy = abilities.conns[0].lock().unwrap();
            let alice = abilities.evaluate(&ctx("alice"), &s1.id).unwrap();
            assert!(alice.can(Action::Edit, Subject::Page));
        }

        let (first, second) = evaluate_pair(&abilities, &ctx("alice"), &s1.id, &s2.id).unwrap();
        assert!(first.can(Action::Edit, Subject::Page));
        assert!(second.cannot(Action::Edit, Subject::Page));
    }

    #[test]
    fn authorize_maps_denial_to_forbidden() {
        let roles = RoleTable::default().grant("alice", "s1", SpaceRole::Reader);
        assert!(authorize(&roles, &ctx("alice"), "s1", Action::Read, Subject::Page).is_ok());
        let denied = authorize(&roles, &ctx("alice"), "s1", Action::Edit, Subject::Page);
        assert!(matches!(denied, Err(PageError::Forbidden)));
    }

    #[test]
    fn evaluate_pair_returns_both_abilities() {
        let roles = RoleTable::default()
            .grant("alice", "s1", SpaceRole::Writer)
            .grant("alice", "s2", SpaceRole::Reader);
        let (first, second) = evaluate_pair(&roles, &ctx("alice"), "s1", "s2").unwrap();
        assert!(first.can(Action::Edit, Subject::Page));
        assert!(second.cannot(Action::Edit, Subject::Page));

        let mut evaluated = roles.evaluated();
        evaluated.sort();
        assert_eq!(evaluated, vec!["s1", "s2"]);
    }
}
