//! Timed key/value status snapshots and the campaign statistics derived
//! from them. Snapshot writes are suppressed when the value has not
//! changed, so the log of a key reads as its value history.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::config::CampaignConfig;
use crate::schema::{
    groups, hit_users, hits, ranking_results, timed_key_value_data,
};

#[derive(Queryable, Clone, Debug)]
pub struct TimedKeyValue {
    pub id: String,
    pub key: String,
    pub value: String,
    pub date_and_time: NaiveDateTime,
}

/// Appends a snapshot for `key` unless the most recent snapshot already
/// holds `value`.
pub fn update_if_changed(conn: &mut SqliteConnection, key: &str, value: &str) {
    let latest: Option<String> = timed_key_value_data::table
        .filter(timed_key_value_data::key.eq(key))
        .order_by((
            timed_key_value_data::date_and_time.desc(),
            timed_key_value_data::id.desc(),
        ))
        .select(timed_key_value_data::value)
        .first(conn)
        .optional()
        .unwrap();

    if latest.as_deref() == Some(value) {
        return;
    }

    diesel::insert_into(timed_key_value_data::table)
        .values((
            timed_key_value_data::id.eq(Uuid::now_v7().to_string()),
            timed_key_value_data::key.eq(key),
            timed_key_value_data::value.eq(value),
            timed_key_value_data::date_and_time.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .unwrap();
    tracing::debug!(key, value, "recorded status snapshot");
}

/// Snapshot history of one key, oldest first.
pub fn status_log(
    conn: &mut SqliteConnection,
    key: &str,
) -> Vec<TimedKeyValue> {
    timed_key_value_data::table
        .filter(timed_key_value_data::key.eq(key))
        .order_by((
            timed_key_value_data::date_and_time.asc(),
            timed_key_value_data::id.asc(),
        ))
        .load(conn)
        .expect("failed to load status log")
}

/// Campaign-wide statistics, written as snapshots and returned for
/// immediate display.
pub fn global_stats(
    conn: &mut SqliteConnection,
    config: &CampaignConfig,
) -> IndexMap<&'static str, String> {
    let active_users =
        crate::users::active_users(conn, config.active_window_days).len();
    let group_count: i64 =
        groups::table.count().get_result(conn).unwrap();
    let hits_completed: i64 = hits::table
        .filter(hits::completed.eq(true))
        .count()
        .get_result(conn)
        .unwrap();
    let hits_remaining =
        crate::hits::compute_remaining_hits(conn, None, config);
    let result_count: i64 =
        ranking_results::table.count().get_result(conn).unwrap();

    // Pairwise comparisons implied by the stored results: C(n, 2) over
    // each result's expanded system count.
    let mut comparisons: u64 = 0;
    let results: Vec<crate::results::RankingResult> =
        ranking_results::table.load(conn).unwrap();
    for result in &results {
        if result.ranks().is_none() {
            continue;
        }
        let data = crate::export::load_result(conn, result);
        let n = result.system_count(&data.item) as u64;
        comparisons += n * n.saturating_sub(1) / 2;
    }

    let durations: Vec<Option<i64>> = ranking_results::table
        .select(ranking_results::duration_seconds)
        .load(conn)
        .unwrap();
    let duration_total: i64 = durations.iter().flatten().sum();
    let duration_per_task =
        duration_total as f64 / (result_count.max(1)) as f64;
    let completed_hit_count: i64 =
        hit_users::table.count().get_result(conn).unwrap();
    let duration_per_hit =
        duration_total as f64 / (completed_hit_count.max(1)) as f64;

    let stats: IndexMap<&'static str, String> = IndexMap::from([
        ("users", active_users.to_string()),
        ("groups", group_count.to_string()),
        ("hits_completed", hits_completed.to_string()),
        ("hits_remaining", hits_remaining.to_string()),
        ("ranking_results", result_count.to_string()),
        ("system_comparisons", comparisons.to_string()),
        ("duration_per_hit", format!("{duration_per_hit:.2}")),
        ("duration_per_task", format!("{duration_per_task:.2}")),
        ("duration_total", duration_total.to_string()),
    ]);
    for (key, value) in &stats {
        update_if_changed(conn, key, value);
    }
    stats
}

#[derive(Clone, Debug, PartialEq)]
pub struct LanguagePairStats {
    pub language_pair: String,
    pub source_name: String,
    pub target_name: String,
    pub completed: i64,
    pub remaining: i64,
}

/// Per-language-pair completion counts, over the pairs actually present in
/// the HIT table.
pub fn language_pair_stats(
    conn: &mut SqliteConnection,
    config: &CampaignConfig,
) -> Vec<LanguagePairStats> {
    let pairs: Vec<String> = hits::table
        .select(hits::language_pair)
        .distinct()
        .order_by(hits::language_pair.asc())
        .load(conn)
        .unwrap();

    pairs
        .into_iter()
        .map(|language_pair| {
            let completed: i64 = hits::table
                .filter(hits::language_pair.eq(&language_pair))
                .filter(hits::completed.eq(true))
                .count()
                .get_result(conn)
                .unwrap();
            let remaining = crate::hits::compute_remaining_hits(
                conn,
                Some(&language_pair),
                config,
            );
            let (source_name, target_name) =
                crate::languages::pair_display_names(&language_pair);
            LanguagePairStats {
                language_pair,
                source_name,
                target_name,
                completed,
                remaining,
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupStats {
    pub group: String,
    pub completed: i64,
    pub required: i64,
    pub total_seconds: f64,
}

/// Per-group completion against the configured HIT requirements, with a
/// trailing totals row.
pub fn group_stats(
    conn: &mut SqliteConnection,
    config: &CampaignConfig,
) -> Vec<GroupStats> {
    let group_rows: Vec<(String, String)> = groups::table
        .select((groups::id, groups::name))
        .order_by(groups::name.asc())
        .load(conn)
        .unwrap();

    let mut rows = Vec::new();
    let mut total = GroupStats {
        group: "Total".to_string(),
        completed: 0,
        required: 0,
        total_seconds: 0.0,
    };
    for (group_id, name) in group_rows {
        let members = crate::projects::group_members(conn, &group_id);
        let (completed, _, total_seconds) =
            crate::hits::compute_status_for_group(conn, &members, None, None);
        let required =
            config.group_hit_requirements.get(&name).copied().unwrap_or(0);
        total.completed += completed;
        total.required += required;
        total.total_seconds += total_seconds;
        rows.push(GroupStats {
            group: name,
            completed,
            required,
            total_seconds,
        });
    }
    rows.push(total);
    rows
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserStats {
    pub username: String,
    pub completed: i64,
    pub average_seconds: f64,
    pub total_seconds: f64,
}

/// Per-user completion counts and durations, ordered by username.
pub fn user_stats(conn: &mut SqliteConnection) -> Vec<UserStats> {
    let users: Vec<(String, String)> = crate::schema::users::table
        .select((crate::schema::users::id, crate::schema::users::username))
        .order_by(crate::schema::users::username.asc())
        .load(conn)
        .unwrap();

    users
        .into_iter()
        .map(|(user_id, username)| {
            let (completed, average_seconds, total_seconds) =
                crate::hits::compute_status_for_user(
                    conn, &user_id, None, None,
                );
            UserStats {
                username,
                completed,
                average_seconds,
                total_seconds,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures;

    #[test]
    fn unchanged_snapshots_are_suppressed() {
        let pool = crate::test::pool();
        let mut conn = pool.get().unwrap();

        update_if_changed(&mut conn, "stats", "v1");
        update_if_changed(&mut conn, "stats", "v1");
        update_if_changed(&mut conn, "stats", "v2");

        let log = status_log(&mut conn, "stats");
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].value, "v1");
        assert_eq!(log[1].value, "v2");
    }

    #[test]
    fn snapshots_of_different_keys_do_not_interfere() {
        let pool = crate::test::pool();
        let mut conn = pool.get().unwrap();

        update_if_changed(&mut conn, "a", "v");
        update_if_changed(&mut conn, "b", "v");
        update_if_changed(&mut conn, "a", "v");
        assert_eq!(status_log(&mut conn, "a").len(), 1);
        assert_eq!(status_log(&mut conn, "b").len(), 1);
    }

    #[test]
    fn global_stats_count_the_campaign() {
        let pool = crate::test::pool();
        let mut conn = pool.get().unwrap();
        let config = CampaignConfig::default();

        let scene = fixtures::campaign(&mut conn);
        let items = crate::hits::items_of_hit(&mut conn, &scene.hit_id);
        for item in &items {
            crate::results::submit_result(
                &mut conn,
                item,
                &scene.user_id,
                Some(10),
                "1,2,3,4,5",
                &config,
            );
        }

        let stats = global_stats(&mut conn, &config);
        assert_eq!(stats["hits_completed"], "1");
        assert_eq!(stats["hits_remaining"], "0");
        assert_eq!(stats["ranking_results"], "3");
        // 3 results x C(5, 2).
        assert_eq!(stats["system_comparisons"], "30");
        assert_eq!(stats["duration_total"], "30");

        // Snapshots were written once and do not repeat.
        global_stats(&mut conn, &config);
        assert_eq!(status_log(&mut conn, "ranking_results").len(), 1);
    }

    #[test]
    fn language_pair_stats_cover_each_stored_pair() {
        let pool = crate::test::pool();
        let mut conn = pool.get().unwrap();
        let config = CampaignConfig::default();

        fixtures::campaign(&mut conn);
        let stats = language_pair_stats(&mut conn, &config);
        assert_eq!(
            stats,
            vec![LanguagePairStats {
                language_pair: "ces2eng".to_string(),
                source_name: "Czech".to_string(),
                target_name: "English".to_string(),
                completed: 0,
                remaining: 1,
            }]
        );
    }

    #[test]
    fn group_stats_include_a_totals_row() {
        let pool = crate::test::pool();
        let mut conn = pool.get().unwrap();
        let mut config = CampaignConfig::default();
        config
            .group_hit_requirements
            .insert("researchers".to_string(), 100);

        let group = crate::projects::create_group(&mut conn, "researchers");
        let user_id = fixtures::user(&mut conn, "ann");
        let token = crate::projects::create_invite(&mut conn, &group.id);
        crate::projects::redeem_invite(&mut conn, &token, &user_id).unwrap();

        let stats = group_stats(&mut conn, &config);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].group, "researchers");
        assert_eq!(stats[0].required, 100);
        assert_eq!(stats[1].group, "Total");
        assert_eq!(stats[1].required, 100);
    }
}
