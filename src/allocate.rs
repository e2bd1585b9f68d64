//! Deterministic assignment of HITs to annotators. An assignment is a row
//! in `user_hit_mappings`; a user holds at most one live assignment per
//! project and language pair, and re-requesting the same assignment is a
//! no-op which returns the HIT already held.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::config::CampaignConfig;
use crate::hits::Hit;
use crate::schema::{
    groups, hits, hits_in_projects, user_hit_mappings, users_in_groups,
    users_in_projects,
};
use crate::validation::is_language_pair;

/// Returns the HIT the user should work on next within a project, creating
/// a `user_hit_mappings` row if none is live yet. `None` means there is no
/// eligible work left.
///
/// The user must be a member of the project and of the group named after
/// the language pair; groups double as capability markers, so a user not
/// in `ces2eng` never receives Czech-to-English work.
///
/// A HIT is eligible when it is active, not reserved for crowd workers,
/// not completed, matches the requested language pair, belongs to the
/// project, has not already been completed by this user, and still has
/// headroom under `max_users_per_hit` (counting completed users together
/// with live assignments of other users). Among eligible HITs the one with
/// the fewest live assignments wins; ties break on the oldest `assigned`
/// timestamp (never-assigned first), then on id. Selection and the mapping
/// insert run in one transaction so concurrent calls cannot both pass the
/// headroom check.
pub fn next_task(
    conn: &mut SqliteConnection,
    user_id: &str,
    project_id: &str,
    language_pair: &str,
    config: &CampaignConfig,
) -> Option<Hit> {
    if !is_language_pair(language_pair) {
        tracing::debug!(language_pair, "not a language-pair code");
        return None;
    }

    let is_member: i64 = users_in_projects::table
        .filter(users_in_projects::project_id.eq(project_id))
        .filter(users_in_projects::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .unwrap();
    if is_member == 0 {
        tracing::debug!(user_id, project_id, "not a project member");
        return None;
    }

    let qualified: i64 = users_in_groups::table
        .inner_join(groups::table.on(groups::id.eq(users_in_groups::group_id)))
        .filter(users_in_groups::user_id.eq(user_id))
        .filter(groups::name.eq(language_pair))
        .count()
        .get_result(conn)
        .unwrap();
    if qualified == 0 {
        tracing::debug!(user_id, language_pair, "not in language-pair group");
        return None;
    }

    let assigned_id = conn
        .transaction::<Option<String>, diesel::result::Error, _>(|conn| {
            // Re-entrancy: hand back the HIT already held, sweeping mappings
            // which point at HITs the user has since completed or which were
            // deactivated.
            loop {
                let held: Option<String> = user_hit_mappings::table
                    .inner_join(
                        hits::table.on(hits::id.eq(user_hit_mappings::hit_id)),
                    )
                    .filter(user_hit_mappings::user_id.eq(user_id))
                    .filter(user_hit_mappings::project_id.eq(project_id))
                    .filter(hits::language_pair.eq(language_pair))
                    .order_by(user_hit_mappings::created_at.asc())
                    .select(user_hit_mappings::hit_id)
                    .first(conn)
                    .optional()?;
                let Some(hit_id) = held else { break };

                let hit = crate::hits::load_hit(conn, &hit_id).unwrap();
                let done_by_user = crate::hits::completed_users(conn, &hit_id)
                    .contains(&user_id.to_string());
                if hit.active && !hit.completed && !done_by_user {
                    return Ok(Some(hit_id));
                }

                tracing::debug!(user_id, hit_id, "sweeping stale mapping");
                diesel::delete(
                    user_hit_mappings::table
                        .filter(user_hit_mappings::user_id.eq(user_id))
                        .filter(user_hit_mappings::project_id.eq(project_id))
                        .filter(user_hit_mappings::hit_id.eq(&hit_id)),
                )
                .execute(conn)?;
            }

            let candidates: Vec<Hit> = hits::table
                .inner_join(
                    hits_in_projects::table
                        .on(hits_in_projects::hit_id.eq(hits::id)),
                )
                .filter(hits_in_projects::project_id.eq(project_id))
                .filter(hits::active.eq(true))
                .filter(hits::mturk_only.eq(false))
                .filter(hits::completed.eq(false))
                .filter(hits::language_pair.eq(language_pair))
                .select((
                    hits::id,
                    hits::block_id,
                    hits::hit_xml,
                    hits::language_pair,
                    hits::active,
                    hits::mturk_only,
                    hits::completed,
                    hits::assigned,
                    hits::finished,
                ))
                .load(conn)?;

            let mut eligible: Vec<(usize, Option<NaiveDateTime>, Hit)> =
                Vec::new();
            for hit in candidates {
                let completed_users =
                    crate::hits::completed_users(conn, &hit.id);
                if completed_users.contains(&user_id.to_string()) {
                    continue;
                }

                let live: Vec<String> = user_hit_mappings::table
                    .filter(user_hit_mappings::hit_id.eq(&hit.id))
                    .select(user_hit_mappings::user_id)
                    .distinct()
                    .load(conn)?;
                let load = live
                    .iter()
                    .filter(|u| !completed_users.contains(u))
                    .count();
                if (completed_users.len() + load) as i64
                    >= config.max_users_per_hit
                {
                    continue;
                }
                eligible.push((load, hit.assigned, hit));
            }

            eligible.sort_by(|a, b| {
                a.0.cmp(&b.0)
                    .then_with(|| match (a.1, b.1) {
                        (None, None) => std::cmp::Ordering::Equal,
                        (None, Some(_)) => std::cmp::Ordering::Less,
                        (Some(_), None) => std::cmp::Ordering::Greater,
                        (Some(x), Some(y)) => x.cmp(&y),
                    })
                    .then_with(|| a.2.id.cmp(&b.2.id))
            });

            let Some((_, _, hit)) = eligible.into_iter().next() else {
                return Ok(None);
            };
            let now = Utc::now().naive_utc();

            diesel::insert_into(user_hit_mappings::table)
                .values((
                    user_hit_mappings::id.eq(Uuid::now_v7().to_string()),
                    user_hit_mappings::user_id.eq(user_id),
                    user_hit_mappings::project_id.eq(project_id),
                    user_hit_mappings::hit_id.eq(&hit.id),
                    user_hit_mappings::created_at.eq(now),
                ))
                .execute(conn)?;
            diesel::update(hits::table.filter(hits::id.eq(&hit.id)))
                .set(hits::assigned.eq(now))
                .execute(conn)?;

            tracing::info!(user_id, project_id, hit_id = %hit.id, "assigned HIT");
            Ok(Some(hit.id))
        })
        .expect("failed to record assignment");

    let hit_id = assigned_id?;
    crate::hits::load_hit(conn, &hit_id)
}

/// Users who currently hold a live assignment for the HIT but have not
/// completed it yet.
pub fn live_users(conn: &mut SqliteConnection, hit_id: &str) -> Vec<String> {
    let completed = crate::hits::completed_users(conn, hit_id);
    let live: Vec<String> = user_hit_mappings::table
        .filter(user_hit_mappings::hit_id.eq(hit_id))
        .select(user_hit_mappings::user_id)
        .distinct()
        .load(conn)
        .unwrap();
    live.into_iter().filter(|u| !completed.contains(u)).collect()
}
