//! Shared test harness: an in-memory database pool with migrations
//! applied, plus fixtures for building small annotation campaigns.

use diesel_migrations::MigrationHarness;

use crate::state::DbPool;

pub fn pool() -> DbPool {
    let pool = crate::state::open_pool(":memory:");
    pool.get()
        .unwrap()
        .run_pending_migrations(crate::MIGRATIONS)
        .unwrap();
    pool
}


pub mod fixtures {
    use chrono::Utc;
    use diesel::prelude::*;
    use uuid::Uuid;

    use crate::results::RankingResult;
    use crate::schema::{groups, users, users_in_groups, users_in_projects};

    /// Three-item HIT in the import format: block 17, Czech to English,
    /// five systems per item, sources numbered 3, 4, 5.
    pub const HIT_XML: &str = r#"<hit block-id="17" source-language="ces" target-language="eng">
  <seg id="3" doc-id="lidovky-7">
    <source id="3">Plze&#328;sk&#253; soud zamítl žalobu.</source>
    <reference id="3">The Pilsen court dismissed the suit.</reference>
    <translation system="sysA">The Pilsen court rejected the lawsuit.</translation>
    <translation system="sysB">Pilsen court the suit dismissed.</translation>
    <translation system="sysC">The court in Pilsen dismissed the suit.</translation>
    <translation system="sysD">Pilsen court dismissed a lawsuit.</translation>
    <translation system="sysE">The Pilsen court has dismissed the action.</translation>
  </seg>
  <seg id="4" doc-id="lidovky-7">
    <source id="4">Rozhodnutí padlo ve čtvrtek.</source>
    <reference id="4">The decision came on Thursday.</reference>
    <translation system="sysA">The decision fell on Thursday.</translation>
    <translation system="sysB">The decision was made on Thursday.</translation>
    <translation system="sysC">Decision came Thursday.</translation>
    <translation system="sysD">The ruling came on Thursday.</translation>
    <translation system="sysE">A decision fell on the Thursday.</translation>
  </seg>
  <seg id="5" doc-id="lidovky-7">
    <source id="5">Strany se mohou odvolat.</source>
    <reference id="5">The parties may appeal.</reference>
    <translation system="sysA">The parties can appeal.</translation>
    <translation system="sysB">Parties may appeal.</translation>
    <translation system="sysC">The sides are allowed to appeal.</translation>
    <translation system="sysD">The parties may lodge an appeal.</translation>
    <translation system="sysE">The parties can to appeal.</translation>
  </seg>
</hit>"#;

    /// A segment where two systems produced identical output and share a
    /// translation slot.
    pub const TIED_SEG_XML: &str = r#"<seg id="9">
  <source id="9">Dobrý den.</source>
  <translation system="sysA,sysB">Good day.</translation>
  <translation system="sysC">Hello.</translation>
  <translation system="sysD">Good morning.</translation>
</seg>"#;

    pub fn result_with_raw(raw_result: &str) -> RankingResult {
        RankingResult {
            id: Uuid::now_v7().to_string(),
            item_id: "item".to_string(),
            user_id: "user".to_string(),
            raw_result: raw_result.to_string(),
            duration_seconds: Some(1),
            completed_at: Utc::now().naive_utc(),
        }
    }

    pub fn user(conn: &mut SqliteConnection, username: &str) -> String {
        let id = Uuid::now_v7().to_string();
        diesel::insert_into(users::table)
            .values((
                users::id.eq(&id),
                users::username.eq(username),
                users::email.eq(format!("{username}@example.com")),
                users::created_at.eq(Utc::now().naive_utc()),
                users::last_login.eq(None::<chrono::NaiveDateTime>),
            ))
            .execute(conn)
            .unwrap();
        id
    }

    pub fn join_project(
        conn: &mut SqliteConnection,
        user_id: &str,
        project_id: &str,
    ) {
        diesel::insert_into(users_in_projects::table)
            .values((
                users_in_projects::id.eq(Uuid::now_v7().to_string()),
                users_in_projects::user_id.eq(user_id),
                users_in_projects::project_id.eq(project_id),
            ))
            .execute(conn)
            .unwrap();
    }

    /// Marks the user as capable of the language pair by joining them to
    /// the group of that name, creating the group on first use.
    pub fn qualify(
        conn: &mut SqliteConnection,
        user_id: &str,
        language_pair: &str,
    ) {
        let group_id: String = groups::table
            .filter(groups::name.eq(language_pair))
            .select(groups::id)
            .first(conn)
            .optional()
            .unwrap()
            .unwrap_or_else(|| {
                crate::projects::create_group(conn, language_pair).id
            });
        diesel::insert_into(users_in_groups::table)
            .values((
                users_in_groups::id.eq(Uuid::now_v7().to_string()),
                users_in_groups::user_id.eq(user_id),
                users_in_groups::group_id.eq(group_id),
            ))
            .execute(conn)
            .unwrap();
    }

    pub struct Campaign {
        pub user_id: String,
        pub project_id: String,
        pub hit_id: String,
    }

    /// One project with one member (qualified for ces2eng) and one HIT
    /// attached.
    pub fn campaign(conn: &mut SqliteConnection) -> Campaign {
        let user_id = user(conn, "annotator");
        let project =
            crate::projects::create_project(conn, "wmt16-news").unwrap();
        join_project(conn, &user_id, &project.id);
        qualify(conn, &user_id, "ces2eng");
        let hit = crate::hits::create_hit(
            conn,
            HIT_XML,
            false,
            Some(&project.id),
        )
        .unwrap();
        Campaign {
            user_id,
            project_id: project.id,
            hit_id: hit.id,
        }
    }
}
