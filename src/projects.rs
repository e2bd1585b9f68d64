use diesel::prelude::*;
use thiserror::Error;
use uuid::Uuid;

use crate::schema::{
    groups, hits_in_projects, invite_tokens, projects, users_in_groups,
    users_in_projects,
};
use crate::validation::is_valid_project_name;

#[derive(Queryable, Clone, Debug)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Queryable, Clone, Debug)]
pub struct Group {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("invalid project name: {0}")]
    InvalidName(String),
    #[error("a project named \"{0}\" already exists")]
    Duplicate(String),
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("unknown invite token")]
    Unknown,
    #[error("invite token has been deactivated")]
    Inactive,
}

pub fn create_project(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Project, ProjectError> {
    is_valid_project_name(name).map_err(ProjectError::InvalidName)?;

    let taken: i64 = projects::table
        .filter(projects::name.eq(name))
        .count()
        .get_result(conn)
        .unwrap();
    if taken > 0 {
        return Err(ProjectError::Duplicate(name.to_string()));
    }

    let id = Uuid::now_v7().to_string();
    diesel::insert_into(projects::table)
        .values((projects::id.eq(&id), projects::name.eq(name)))
        .execute(conn)
        .unwrap();
    tracing::info!(name, "created project");
    Ok(Project {
        id,
        name: name.to_string(),
    })
}

pub fn load_project_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Option<Project> {
    projects::table
        .filter(projects::name.eq(name))
        .first(conn)
        .optional()
        .expect("failed to load project")
}

pub fn add_user(
    conn: &mut SqliteConnection,
    project_id: &str,
    user_id: &str,
) {
    let already: i64 = users_in_projects::table
        .filter(users_in_projects::project_id.eq(project_id))
        .filter(users_in_projects::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .unwrap();
    if already > 0 {
        return;
    }
    diesel::insert_into(users_in_projects::table)
        .values((
            users_in_projects::id.eq(Uuid::now_v7().to_string()),
            users_in_projects::project_id.eq(project_id),
            users_in_projects::user_id.eq(user_id),
        ))
        .execute(conn)
        .unwrap();
}

pub fn add_hit(conn: &mut SqliteConnection, project_id: &str, hit_id: &str) {
    diesel::insert_into(hits_in_projects::table)
        .values((
            hits_in_projects::id.eq(Uuid::now_v7().to_string()),
            hits_in_projects::project_id.eq(project_id),
            hits_in_projects::hit_id.eq(hit_id),
        ))
        .execute(conn)
        .unwrap();
}

pub fn create_group(conn: &mut SqliteConnection, name: &str) -> Group {
    let id = Uuid::now_v7().to_string();
    diesel::insert_into(groups::table)
        .values((groups::id.eq(&id), groups::name.eq(name)))
        .execute(conn)
        .unwrap();
    Group {
        id,
        name: name.to_string(),
    }
}

pub fn group_members(
    conn: &mut SqliteConnection,
    group_id: &str,
) -> Vec<String> {
    users_in_groups::table
        .filter(users_in_groups::group_id.eq(group_id))
        .select(users_in_groups::user_id)
        .load(conn)
        .expect("failed to load group members")
}

/// Mints a single-use invite token for a group. The token deactivates on
/// redemption.
pub fn create_invite(conn: &mut SqliteConnection, group_id: &str) -> String {
    let token = Uuid::new_v4().to_string();
    diesel::insert_into(invite_tokens::table)
        .values((
            invite_tokens::id.eq(Uuid::now_v7().to_string()),
            invite_tokens::group_id.eq(group_id),
            invite_tokens::token.eq(&token),
            invite_tokens::active.eq(true),
        ))
        .execute(conn)
        .unwrap();
    token
}

pub fn deactivate_invite(conn: &mut SqliteConnection, token: &str) {
    diesel::update(
        invite_tokens::table.filter(invite_tokens::token.eq(token)),
    )
    .set(invite_tokens::active.eq(false))
    .execute(conn)
    .unwrap();
}

/// Adds the user to the group behind an invite token and burns the token.
/// Returns the group id so callers can report where the user landed.
pub fn redeem_invite(
    conn: &mut SqliteConnection,
    token: &str,
    user_id: &str,
) -> Result<String, InviteError> {
    let row: Option<(String, bool)> = invite_tokens::table
        .filter(invite_tokens::token.eq(token))
        .select((invite_tokens::group_id, invite_tokens::active))
        .first(conn)
        .optional()
        .unwrap();

    let (group_id, active) = row.ok_or(InviteError::Unknown)?;
    if !active {
        return Err(InviteError::Inactive);
    }

    let already: i64 = users_in_groups::table
        .filter(users_in_groups::group_id.eq(&group_id))
        .filter(users_in_groups::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .unwrap();
    if already == 0 {
        diesel::insert_into(users_in_groups::table)
            .values((
                users_in_groups::id.eq(Uuid::now_v7().to_string()),
                users_in_groups::group_id.eq(&group_id),
                users_in_groups::user_id.eq(user_id),
            ))
            .execute(conn)
            .unwrap();
    }
    deactivate_invite(conn, token);
    tracing::info!(user_id, group_id, "redeemed invite token");
    Ok(group_id)
}
