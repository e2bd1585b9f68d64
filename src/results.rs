use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::allocate;
use crate::config::CampaignConfig;
use crate::hits::RankingTask;
use crate::schema::{
    hit_users, hits, hits_in_projects, ranking_results, ranking_tasks,
    user_hit_mappings, users_in_projects,
};

/// Sentinel stored in `raw_result` when the annotator skipped the item.
pub const SKIPPED: &str = "SKIPPED";

#[derive(Queryable, Clone, Debug)]
pub struct RankingResult {
    pub id: String,
    pub item_id: String,
    pub user_id: String,
    pub raw_result: String,
    pub duration_seconds: Option<i64>,
    pub completed_at: NaiveDateTime,
}

impl RankingResult {
    /// Parsed rank sequence, one entry per translation slot. `None` for
    /// skipped results and for raw values which fail to parse.
    pub fn ranks(&self) -> Option<Vec<i64>> {
        if self.raw_result == SKIPPED {
            return None;
        }
        self.raw_result
            .split(',')
            .map(|r| r.trim().parse::<i64>().ok())
            .collect()
    }

    /// Number of systems judged by this result, counting every member of
    /// a multi-system tie.
    pub fn system_count(&self, fields: &crate::hits::parse::ItemFields) -> usize {
        fields
            .systems()
            .iter()
            .map(|s| s.split(',').count())
            .sum()
    }
}

/// Creates or updates the result of `user` for `item`, then runs the
/// post-save bookkeeping: once the user has judged every item of the HIT,
/// they are recorded as a completed user, their live assignment is
/// removed, batch completion is re-evaluated and the next assignment is
/// computed eagerly.
pub fn submit_result(
    conn: &mut SqliteConnection,
    item: &RankingTask,
    user_id: &str,
    duration_seconds: Option<i64>,
    raw_result: &str,
    config: &CampaignConfig,
) -> RankingResult {
    let now = Utc::now().naive_utc();

    let existing: Option<String> = ranking_results::table
        .filter(ranking_results::item_id.eq(&item.id))
        .filter(ranking_results::user_id.eq(user_id))
        .select(ranking_results::id)
        .first(conn)
        .optional()
        .unwrap();

    let result_id = match existing {
        Some(result_id) => {
            diesel::update(
                ranking_results::table
                    .filter(ranking_results::id.eq(&result_id)),
            )
            .set((
                ranking_results::raw_result.eq(raw_result),
                ranking_results::duration_seconds.eq(duration_seconds),
                ranking_results::completed_at.eq(now),
            ))
            .execute(conn)
            .unwrap();
            result_id
        }
        None => {
            let result_id = Uuid::now_v7().to_string();
            diesel::insert_into(ranking_results::table)
                .values((
                    ranking_results::id.eq(&result_id),
                    ranking_results::item_id.eq(&item.id),
                    ranking_results::user_id.eq(user_id),
                    ranking_results::raw_result.eq(raw_result),
                    ranking_results::duration_seconds.eq(duration_seconds),
                    ranking_results::completed_at.eq(now),
                ))
                .execute(conn)
                .unwrap();
            result_id
        }
    };

    tracing::debug!(user_id, item_id = %item.id, raw_result, "stored result");

    after_result_saved(conn, &item.hit_id, user_id, config);

    ranking_results::table
        .filter(ranking_results::id.eq(result_id))
        .first::<RankingResult>(conn)
        .unwrap()
}

/// Post-save callback, invoked by the service layer right after a result
/// is persisted. Also resolves the double-submission race: re-running it
/// only cleans up mappings, it never rejects.
fn after_result_saved(
    conn: &mut SqliteConnection,
    hit_id: &str,
    user_id: &str,
    config: &CampaignConfig,
) {
    let item_count: i64 = ranking_tasks::table
        .filter(ranking_tasks::hit_id.eq(hit_id))
        .count()
        .get_result(conn)
        .unwrap();

    let result_count: i64 = ranking_results::table
        .inner_join(
            ranking_tasks::table
                .on(ranking_tasks::id.eq(ranking_results::item_id)),
        )
        .filter(ranking_tasks::hit_id.eq(hit_id))
        .filter(ranking_results::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .unwrap();

    if result_count < item_count {
        return;
    }

    // The user has judged every item of the HIT.
    let already_recorded: i64 = hit_users::table
        .filter(hit_users::hit_id.eq(hit_id))
        .filter(hit_users::user_id.eq(user_id))
        .count()
        .get_result(conn)
        .unwrap();
    if already_recorded == 0 {
        diesel::insert_into(hit_users::table)
            .values((
                hit_users::id.eq(Uuid::now_v7().to_string()),
                hit_users::hit_id.eq(hit_id),
                hit_users::user_id.eq(user_id),
            ))
            .execute(conn)
            .unwrap();
    }

    let language_pair: String = hits::table
        .filter(hits::id.eq(hit_id))
        .select(hits::language_pair)
        .first(conn)
        .unwrap();

    for project_id in projects_of_hit_with_user(conn, hit_id, user_id) {
        tracing::debug!(
            user_id,
            hit_id,
            project_id,
            "removing stale user/HIT mapping"
        );
        diesel::delete(
            user_hit_mappings::table
                .filter(user_hit_mappings::user_id.eq(user_id))
                .filter(user_hit_mappings::project_id.eq(&project_id))
                .filter(user_hit_mappings::hit_id.eq(hit_id)),
        )
        .execute(conn)
        .unwrap();
        let _ = allocate::next_task(
            conn,
            user_id,
            &project_id,
            &language_pair,
            config,
        );
    }

    crate::hits::update_completion(conn, hit_id, config);
}

/// Deletes a result and runs the post-delete bookkeeping: the user no
/// longer counts as having completed the HIT, so the completion flag may
/// revert and a fresh assignment is computed.
pub fn delete_result(
    conn: &mut SqliteConnection,
    result: &RankingResult,
    config: &CampaignConfig,
) {
    diesel::delete(
        ranking_results::table.filter(ranking_results::id.eq(&result.id)),
    )
    .execute(conn)
    .unwrap();

    let hit_id: String = ranking_tasks::table
        .filter(ranking_tasks::id.eq(&result.item_id))
        .select(ranking_tasks::hit_id)
        .first(conn)
        .unwrap();

    tracing::debug!(
        user_id = %result.user_id,
        hit_id,
        "removing user from completed HIT"
    );
    diesel::delete(
        hit_users::table
            .filter(hit_users::hit_id.eq(&hit_id))
            .filter(hit_users::user_id.eq(&result.user_id)),
    )
    .execute(conn)
    .unwrap();

    crate::hits::update_completion(conn, &hit_id, config);

    let language_pair: String = hits::table
        .filter(hits::id.eq(&hit_id))
        .select(hits::language_pair)
        .first(conn)
        .unwrap();

    for project_id in
        projects_of_hit_with_user(conn, &hit_id, &result.user_id)
    {
        let _ = allocate::next_task(
            conn,
            &result.user_id,
            &project_id,
            &language_pair,
            config,
        );
    }
}

/// Results of every user for a single item.
pub fn results_of_item(
    conn: &mut SqliteConnection,
    item_id: &str,
) -> Vec<RankingResult> {
    ranking_results::table
        .filter(ranking_results::item_id.eq(item_id))
        .order_by(ranking_results::id.asc())
        .load(conn)
        .expect("failed to load results")
}

/// Projects which contain the HIT and have the user as a member.
fn projects_of_hit_with_user(
    conn: &mut SqliteConnection,
    hit_id: &str,
    user_id: &str,
) -> Vec<String> {
    hits_in_projects::table
        .inner_join(
            users_in_projects::table.on(users_in_projects::project_id
                .eq(hits_in_projects::project_id)),
        )
        .filter(hits_in_projects::hit_id.eq(hit_id))
        .filter(users_in_projects::user_id.eq(user_id))
        .select(hits_in_projects::project_id)
        .load(conn)
        .unwrap()
}
