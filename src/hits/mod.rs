use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::config::CampaignConfig;
use crate::hits::parse::{AttributeMap, ItemFields, XmlError};
use crate::schema::{
    hit_users, hits, hits_in_projects, ranking_results, ranking_tasks,
    users_in_projects,
};

pub mod parse;

/// One batch of annotation work ("HIT", after the Mechanical-Turk term).
/// The attribute map is derived from `hit_xml` and never persisted.
#[derive(Queryable, Clone, Debug)]
pub struct Hit {
    pub id: String,
    pub block_id: i64,
    pub hit_xml: String,
    pub language_pair: String,
    pub active: bool,
    pub mturk_only: bool,
    pub completed: bool,
    pub assigned: Option<NaiveDateTime>,
    pub finished: Option<NaiveDateTime>,
}

impl Hit {
    /// Batch-level attributes, recomputed from the stored XML. Malformed
    /// XML is reported through a synthetic `error` attribute.
    pub fn attributes(&self) -> AttributeMap {
        parse::hit_attributes(&self.hit_xml)
    }
}

#[derive(Queryable, Clone, Debug)]
pub struct RankingTask {
    pub id: String,
    pub hit_id: String,
    pub seq: i64,
    pub item_xml: String,
}

impl RankingTask {
    pub fn fields(&self) -> ItemFields {
        parse::item_fields(&self.item_xml)
    }
}

/// Allocates a fresh 8-character hex id which is not yet taken by any HIT.
pub fn create_hit_id(conn: &mut SqliteConnection) -> String {
    loop {
        let candidate = Uuid::new_v4().simple().to_string()[..8].to_string();
        let taken: i64 = hits::table
            .filter(hits::id.eq(&candidate))
            .count()
            .get_result(conn)
            .unwrap();
        if taken == 0 {
            return candidate;
        }
    }
}

/// Validates and stores a HIT, synthesizing one `ranking_tasks` row per
/// `<seg>` child in document order. Optionally attaches the HIT to a
/// project.
pub fn create_hit(
    conn: &mut SqliteConnection,
    hit_xml: &str,
    mturk_only: bool,
    project_id: Option<&str>,
) -> Result<Hit, XmlError> {
    parse::validate_hit(hit_xml)?;

    let attributes = parse::hit_attributes(hit_xml);
    let block_id: i64 = attributes["block-id"].parse().unwrap();
    let language_pair = format!(
        "{}2{}",
        attributes["source-language"], attributes["target-language"]
    );

    let items = parse::split_hit(hit_xml)?;

    let hit_id = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let hit_id = create_hit_id(conn);
            diesel::insert_into(hits::table)
                .values((
                    hits::id.eq(&hit_id),
                    hits::block_id.eq(block_id),
                    hits::hit_xml.eq(hit_xml),
                    hits::language_pair.eq(&language_pair),
                    hits::active.eq(true),
                    hits::mturk_only.eq(mturk_only),
                    hits::completed.eq(false),
                    hits::assigned.eq(None::<NaiveDateTime>),
                    hits::finished.eq(None::<NaiveDateTime>),
                ))
                .execute(conn)?;

            for (seq, item_xml) in items.iter().enumerate() {
                diesel::insert_into(ranking_tasks::table)
                    .values((
                        ranking_tasks::id.eq(Uuid::now_v7().to_string()),
                        ranking_tasks::hit_id.eq(&hit_id),
                        ranking_tasks::seq.eq(seq as i64),
                        ranking_tasks::item_xml.eq(item_xml),
                    ))
                    .execute(conn)?;
            }

            if let Some(project_id) = project_id {
                diesel::insert_into(hits_in_projects::table)
                    .values((
                        hits_in_projects::id.eq(Uuid::now_v7().to_string()),
                        hits_in_projects::project_id.eq(project_id),
                        hits_in_projects::hit_id.eq(&hit_id),
                    ))
                    .execute(conn)?;
            }

            Ok(hit_id)
        })
        .expect("failed to store HIT");

    tracing::info!(hit_id, language_pair, "imported HIT");

    Ok(load_hit(conn, &hit_id).unwrap())
}

pub fn load_hit(conn: &mut SqliteConnection, hit_id: &str) -> Option<Hit> {
    hits::table
        .filter(hits::id.eq(hit_id))
        .first::<Hit>(conn)
        .optional()
        .expect("failed to load HIT")
}

/// Items of a HIT in document order.
pub fn items_of_hit(
    conn: &mut SqliteConnection,
    hit_id: &str,
) -> Vec<RankingTask> {
    ranking_tasks::table
        .filter(ranking_tasks::hit_id.eq(hit_id))
        .order_by(ranking_tasks::seq.asc())
        .load::<RankingTask>(conn)
        .expect("failed to load ranking tasks")
}

/// Users who have completed the HIT (submitted a result for each item).
pub fn completed_users(
    conn: &mut SqliteConnection,
    hit_id: &str,
) -> Vec<String> {
    hit_users::table
        .filter(hit_users::hit_id.eq(hit_id))
        .select(hit_users::user_id)
        .load::<String>(conn)
        .expect("failed to load HIT users")
}

/// Recomputes the `completed` flag (enough distinct users) and the
/// `finished` timestamp (latest result completion). Idempotent; safe to
/// re-run after any result mutation.
pub fn update_completion(
    conn: &mut SqliteConnection,
    hit_id: &str,
    config: &CampaignConfig,
) {
    let user_count: i64 = hit_users::table
        .filter(hit_users::hit_id.eq(hit_id))
        .count()
        .get_result(conn)
        .unwrap();

    let finished: Option<NaiveDateTime> = ranking_results::table
        .inner_join(
            ranking_tasks::table
                .on(ranking_tasks::id.eq(ranking_results::item_id)),
        )
        .filter(ranking_tasks::hit_id.eq(hit_id))
        .select(diesel::dsl::max(ranking_results::completed_at))
        .first(conn)
        .unwrap();

    diesel::update(hits::table.filter(hits::id.eq(hit_id)))
        .set((
            hits::completed.eq(user_count >= config.max_users_per_hit),
            hits::finished.eq(finished),
        ))
        .execute(conn)
        .unwrap();
}

/// Counts HITs which still need annotators, optionally constrained to one
/// language pair. Open HITs which already reached the required user count
/// are swept to completed along the way.
pub fn compute_remaining_hits(
    conn: &mut SqliteConnection,
    language_pair: Option<&str>,
    config: &CampaignConfig,
) -> i64 {
    let mut query = hits::table
        .filter(hits::active.eq(true))
        .filter(hits::mturk_only.eq(false))
        .filter(hits::completed.eq(false))
        .into_boxed();
    if let Some(language_pair) = language_pair {
        query = query.filter(hits::language_pair.eq(language_pair));
    }
    let open = query.load::<Hit>(conn).expect("failed to load open HITs");

    let mut available = 0;
    for hit in open {
        let users: i64 = hit_users::table
            .filter(hit_users::hit_id.eq(&hit.id))
            .count()
            .get_result(conn)
            .unwrap();
        if users < config.max_users_per_hit {
            available += 1;
        } else {
            update_completion(conn, &hit.id, config);
        }
    }
    available
}

/// Completion status of one user: (completed HITs, average seconds per
/// HIT, total seconds).
pub fn compute_status_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    project_id: Option<&str>,
    language_pair: Option<&str>,
) -> (i64, f64, f64) {
    let mut query = hit_users::table
        .inner_join(hits::table.on(hits::id.eq(hit_users::hit_id)))
        .filter(hit_users::user_id.eq(user_id))
        .select(hits::id)
        .into_boxed();
    if let Some(language_pair) = language_pair {
        query = query.filter(hits::language_pair.eq(language_pair));
    }
    let mut hit_ids = query.load::<String>(conn).unwrap();

    if let Some(project_id) = project_id {
        let project_hits: Vec<String> = hits_in_projects::table
            .filter(hits_in_projects::project_id.eq(project_id))
            .select(hits_in_projects::hit_id)
            .load(conn)
            .unwrap();
        hit_ids.retain(|id| project_hits.contains(id));
    }

    let mut total_seconds = 0.0;
    for hit_id in &hit_ids {
        let durations: Vec<Option<i64>> = ranking_results::table
            .inner_join(
                ranking_tasks::table
                    .on(ranking_tasks::id.eq(ranking_results::item_id)),
            )
            .filter(ranking_tasks::hit_id.eq(hit_id))
            .filter(ranking_results::user_id.eq(user_id))
            .select(ranking_results::duration_seconds)
            .load(conn)
            .unwrap();
        total_seconds +=
            durations.iter().flatten().sum::<i64>() as f64;
    }

    let completed = hit_ids.len() as i64;
    let average = total_seconds / (completed.max(1) as f64);
    (completed, average, total_seconds)
}

/// Summed completion status over every member of a group.
pub fn compute_status_for_group(
    conn: &mut SqliteConnection,
    member_ids: &[String],
    project_id: Option<&str>,
    language_pair: Option<&str>,
) -> (i64, f64, f64) {
    let mut combined = (0i64, 0.0f64, 0.0f64);
    for user_id in member_ids {
        let status =
            compute_status_for_user(conn, user_id, project_id, language_pair);
        combined.0 += status.0;
        combined.2 += status.2;
    }
    combined.1 = combined.2 / (combined.0.max(1) as f64);
    combined
}

/// Users eligible for a HIT in a given project: project members only.
pub fn project_members(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Vec<String> {
    users_in_projects::table
        .filter(users_in_projects::project_id.eq(project_id))
        .select(users_in_projects::user_id)
        .load(conn)
        .expect("failed to load project members")
}
