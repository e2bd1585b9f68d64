//! Export of ranking results into the external formats consumed by the
//! evaluation-campaign tooling: ranking XML, the WMT flat CSV, pairwise
//! comparison CSV, and Artstein & Poesio (2007) agreement triples. All
//! functions are pure over a [`ResultData`] snapshot; the `hit_*` helpers
//! load the snapshots from the database first.

use diesel::prelude::*;
use indexmap::IndexSet;
use itertools::Itertools;

use crate::hits::parse::{AttributeMap, ItemFields};
use crate::hits::{self, Hit};
use crate::languages;
use crate::results::RankingResult;
use crate::schema::{ranking_results, ranking_tasks, users};

pub mod agreement;

pub use agreement::{AgreementScores, AnnotationTask};

/// Everything needed to export one ranking result, loaded up front so the
/// export functions stay pure.
#[derive(Clone, Debug)]
pub struct ResultData {
    pub item_id: String,
    pub hit_attributes: AttributeMap,
    pub item: ItemFields,
    pub judge: String,
    pub ranks: Option<Vec<i64>>,
    pub duration_seconds: Option<i64>,
}

pub fn load_result(
    conn: &mut SqliteConnection,
    result: &RankingResult,
) -> ResultData {
    let item: crate::hits::RankingTask = ranking_tasks::table
        .filter(ranking_tasks::id.eq(&result.item_id))
        .first(conn)
        .expect("failed to load item");
    let hit = hits::load_hit(conn, &item.hit_id).expect("failed to load HIT");
    let judge: String = users::table
        .filter(users::id.eq(&result.user_id))
        .select(users::username)
        .first(conn)
        .expect("failed to load judge");

    ResultData {
        item_id: item.id.clone(),
        hit_attributes: hit.attributes(),
        item: item.fields(),
        judge,
        ranks: result.ranks(),
        duration_seconds: result.duration_seconds,
    }
}

impl ResultData {
    fn language_names(&self) -> (String, String) {
        let src = self
            .hit_attributes
            .get("source-language")
            .cloned()
            .unwrap_or_default();
        let trg = self
            .hit_attributes
            .get("target-language")
            .cloned()
            .unwrap_or_default();
        (
            languages::display_name(&src).to_string(),
            languages::display_name(&trg).to_string(),
        )
    }

    /// Comma-joined system name of each translation slot, plus the slot's
    /// rank. Skipped results rank every slot -1.
    fn slots(&self) -> Vec<(String, i64)> {
        let systems = self.item.systems();
        match &self.ranks {
            Some(ranks) if ranks.len() == systems.len() => {
                systems.into_iter().zip(ranks.iter().copied()).collect()
            }
            _ => systems.into_iter().map(|s| (s, -1)).collect(),
        }
    }

    /// Renders the result into the fixed ranking-XML template. `skipped`
    /// is true exactly when no parsed ranks are available.
    pub fn to_ranking_xml(&self) -> String {
        let skipped = self.ranks.is_none();
        let attributes = format_attributes(&self.item.attributes);
        let duration = self.duration_seconds.unwrap_or(0);

        let mut out = String::new();
        out.push_str(&format!(
            "<ranking-result{attributes} user=\"{}\" duration=\"{duration}\" \
             skipped=\"{skipped}\">\n",
            self.judge
        ));
        if !skipped {
            let ranks = self.ranks.as_ref().unwrap();
            for (index, (_, attrs)) in self.item.translations.iter().enumerate()
            {
                out.push_str(&format!(
                    "  <translation{} rank=\"{}\" />\n",
                    format_attributes(attrs),
                    ranks.get(index).copied().unwrap_or(-1)
                ));
            }
        }
        out.push_str("</ranking-result>");
        out
    }

    /// WMT flat CSV rows: one row per block of five candidate slots, padded
    /// with `PLACEHOLDER`/-1 when the slot count is not a multiple of five.
    /// With `expand_multi_systems` a tied slot becomes one entry per
    /// constituent system, each inheriting the shared rank.
    pub fn flat_rows(&self, expand_multi_systems: bool) -> Vec<Vec<String>> {
        let (src_name, trg_name) = self.language_names();
        let src_index = self.item.source_index();
        let base = vec![
            src_name,
            trg_name,
            src_index.clone(),
            "-1".to_string(),
            src_index,
            self.judge.clone(),
        ];

        let mut names = Vec::new();
        let mut ranks = Vec::new();
        for (system, rank) in self.slots() {
            if expand_multi_systems {
                for single in system.split(',') {
                    names.push(single.to_string());
                    ranks.push(rank.to_string());
                }
            } else {
                names.push(system.replace(',', "+"));
                ranks.push(rank.to_string());
            }
        }
        while names.len() % 5 != 0 {
            names.push("PLACEHOLDER".to_string());
            ranks.push("-1".to_string());
        }

        let mut rows = Vec::new();
        for block in 0..names.len() / 5 {
            let mut row = base.clone();
            for index in block * 5..block * 5 + 5 {
                row.push("-1".to_string());
                row.push(names[index].clone());
            }
            for index in block * 5..block * 5 + 5 {
                row.push(ranks[index].clone());
            }
            rows.push(row);
        }
        rows
    }

    pub fn to_flat_csv(&self, expand_multi_systems: bool) -> String {
        rows_to_csv(self.flat_rows(expand_multi_systems))
    }

    /// Pairwise comparison rows: the cross product of constituent systems
    /// for every unordered pair of distinct system-groups, plus intra-tie
    /// equal-rank rows. Duplicates are suppressed; order is first-seen.
    /// `None` for skipped results.
    pub fn to_pairwise_csv(&self) -> Option<String> {
        self.ranks.as_ref()?;

        let (src_name, trg_name) = self.language_names();
        let src_index = self.item.source_index();
        let base = vec![
            src_name,
            trg_name,
            src_index.clone(),
            src_index,
            self.judge.clone(),
        ];

        let groups: IndexSet<(String, i64)> = self
            .slots()
            .into_iter()
            .map(|(system, rank)| (system.replace(',', "+"), rank))
            .collect();

        let mut rows: IndexSet<Vec<String>> = IndexSet::new();
        let mut push = |rows: &mut IndexSet<Vec<String>>,
                        a: &str,
                        rank_a: i64,
                        b: &str,
                        rank_b: i64| {
            let mut row = base.clone();
            row.push(a.to_string());
            row.push(rank_a.to_string());
            row.push(b.to_string());
            row.push(rank_b.to_string());
            row.push(self.item_id.clone());
            rows.insert(row);
        };

        for ((group_a, rank_a), (group_b, rank_b)) in
            groups.iter().tuple_combinations()
        {
            for single_a in group_a.split('+') {
                for single_b in group_b.split('+') {
                    push(&mut rows, single_a, *rank_a, single_b, *rank_b);
                }
            }
            for (group, rank) in [(group_a, rank_a), (group_b, rank_b)] {
                for (tied_a, tied_b) in group.split('+').tuple_combinations()
                {
                    push(&mut rows, tied_a, *rank, tied_b, *rank);
                }
            }
        }

        Some(rows_to_csv(rows.into_iter().collect()))
    }

    /// Artstein & Poesio triples `judge,srcIndex.a.b,sysA<op>sysB` over
    /// every unordered pair of candidate slots. The operator compares the
    /// stored ranks numerically, so the better (lower) rank emits `<`.
    /// `None` for skipped results.
    pub fn to_apf(&self) -> Option<Vec<String>> {
        let ranks = self.ranks.as_ref()?;
        let systems = self.item.systems();
        if ranks.len() != systems.len() {
            return None;
        }
        let src_index = self.item.source_index();

        let mut triples = Vec::new();
        for (a, b) in (0..systems.len()).tuple_combinations() {
            let verdict = match ranks[a].cmp(&ranks[b]) {
                std::cmp::Ordering::Greater => '>',
                std::cmp::Ordering::Less => '<',
                std::cmp::Ordering::Equal => '=',
            };
            for (system_a, system_b) in systems[a]
                .split(',')
                .cartesian_product(systems[b].split(',').collect::<Vec<_>>())
            {
                triples.push(format!(
                    "{},{}.{}.{},{system_a}{verdict}{system_b}",
                    self.judge,
                    src_index,
                    a + 1,
                    b + 1
                ));
            }
        }
        Some(triples)
    }

    /// Minimal per-result ranking CSV. The upstream consumers never settled
    /// on the column set, so the contract exists but the rendering does
    /// not.
    pub fn to_ranking_csv(&self) -> String {
        todo!("ranking CSV column set is not finalized")
    }
}

fn format_attributes(attributes: &AttributeMap) -> String {
    attributes
        .iter()
        .map(|(k, v)| format!(" {k}=\"{v}\""))
        .collect()
}

fn rows_to_csv(rows: Vec<Vec<String>>) -> String {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(&row).expect("failed to write CSV row");
    }
    String::from_utf8(writer.into_inner().expect("failed to flush CSV"))
        .expect("CSV output is not UTF-8")
}

fn results_of_hit(
    conn: &mut SqliteConnection,
    hit_id: &str,
) -> Vec<ResultData> {
    let results: Vec<RankingResult> = ranking_results::table
        .inner_join(
            ranking_tasks::table
                .on(ranking_tasks::id.eq(ranking_results::item_id)),
        )
        .filter(ranking_tasks::hit_id.eq(hit_id))
        .order_by((ranking_tasks::seq.asc(), ranking_results::id.asc()))
        .select((
            ranking_results::id,
            ranking_results::item_id,
            ranking_results::user_id,
            ranking_results::raw_result,
            ranking_results::duration_seconds,
            ranking_results::completed_at,
        ))
        .load(conn)
        .expect("failed to load HIT results");
    results
        .iter()
        .map(|result| load_result(conn, result))
        .collect()
}

/// Renders a whole HIT with every stored result as XML.
pub fn hit_to_xml(conn: &mut SqliteConnection, hit: &Hit) -> String {
    let attributes = format_attributes(&hit.attributes());
    let mut out = format!("<hit id=\"{}\"{attributes}>\n", hit.id);
    for data in results_of_hit(conn, &hit.id) {
        out.push_str(&format!(
            "  <ranking-task source-id=\"{}\">\n",
            data.item.source_index()
        ));
        for line in data.to_ranking_xml().lines() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("  </ranking-task>\n");
    }
    out.push_str("</hit>");
    out
}

/// Concatenated agreement triples over every result of the HIT. Skipped
/// results contribute nothing.
pub fn hit_to_apf(conn: &mut SqliteConnection, hit: &Hit) -> Vec<String> {
    results_of_hit(conn, &hit.id)
        .iter()
        .filter_map(ResultData::to_apf)
        .flatten()
        .collect()
}

/// Alpha, kappa, pi and Bennett's S over the HIT's agreement triples.
/// `None` when there are no triples or any score is degenerate (single
/// coder, no variation).
pub fn agreement_scores(
    conn: &mut SqliteConnection,
    hit: &Hit,
) -> Option<AgreementScores> {
    let triples: Vec<(String, String, String)> = hit_to_apf(conn, hit)
        .iter()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ',');
            Some((
                parts.next()?.to_string(),
                parts.next()?.to_string(),
                parts.next()?.to_string(),
            ))
        })
        .collect();
    if triples.is_empty() {
        return None;
    }
    AnnotationTask::new(triples).scores()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CampaignConfig;
    use crate::test::fixtures;

    fn data_with_ranks(raw: &str) -> ResultData {
        let items = crate::hits::parse::split_hit(fixtures::HIT_XML).unwrap();
        let result = fixtures::result_with_raw(raw);
        ResultData {
            item_id: "item-1".to_string(),
            hit_attributes: crate::hits::parse::hit_attributes(
                fixtures::HIT_XML,
            ),
            item: crate::hits::parse::item_fields(&items[0]),
            judge: "alice".to_string(),
            ranks: result.ranks(),
            duration_seconds: Some(30),
        }
    }

    fn tied_data(raw: &str) -> ResultData {
        let result = fixtures::result_with_raw(raw);
        ResultData {
            item_id: "item-9".to_string(),
            hit_attributes: crate::hits::parse::hit_attributes(
                fixtures::HIT_XML,
            ),
            item: crate::hits::parse::item_fields(fixtures::TIED_SEG_XML),
            judge: "alice".to_string(),
            ranks: result.ranks(),
            duration_seconds: Some(30),
        }
    }

    #[test]
    fn ranking_xml_marks_skipped_results() {
        let xml = data_with_ranks(crate::results::SKIPPED).to_ranking_xml();
        assert!(xml.contains("skipped=\"true\""));
        assert!(!xml.contains("<translation"));

        let xml = data_with_ranks("1,2,3,4,5").to_ranking_xml();
        assert!(xml.contains("skipped=\"false\""));
        assert_eq!(xml.matches("<translation").count(), 5);
        assert!(xml.contains("rank=\"1\""));
        assert!(xml.contains("user=\"alice\""));
    }

    #[test]
    fn flat_csv_has_one_row_per_block_of_five() {
        let rows = data_with_ranks("1,2,3,4,5").flat_rows(false);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(
            &row[..6],
            &["Czech", "English", "3", "-1", "3", "alice"]
        );
        assert_eq!(row[7], "sysA");
        assert_eq!(row[15], "sysE");
        assert_eq!(&row[16..], &["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn flat_csv_pads_partial_blocks_with_placeholder() {
        // 3 slots -> padded to 5.
        let rows = tied_data("1,2,3").flat_rows(false);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row[7], "sysA+sysB");
        assert_eq!(row[13], "PLACEHOLDER");
        assert_eq!(row[15], "PLACEHOLDER");
        assert_eq!(&row[16..], &["1", "2", "3", "-1", "-1"]);

        // Expansion yields 4 systems, still one padded row.
        let rows = tied_data("1,2,3").flat_rows(true);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row[7], "sysA");
        assert_eq!(row[9], "sysB");
        assert_eq!(&row[16..], &["1", "1", "2", "3", "-1"]);
    }

    #[test]
    fn flat_csv_expansion_can_spill_into_a_second_row() {
        // 5 slots, one tied pair -> 6 expanded systems -> 2 rows.
        let data = ResultData {
            item: crate::hits::parse::item_fields(
                r#"<seg id="2">
                  <source id="2">x</source>
                  <translation system="sysA,sysB">a</translation>
                  <translation system="sysC">b</translation>
                  <translation system="sysD">c</translation>
                  <translation system="sysE">d</translation>
                  <translation system="sysF">e</translation>
                </seg>"#,
            ),
            ..data_with_ranks("1,2,3,4,5")
        };
        let rows = data.flat_rows(true);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][7], "sysF");
        assert_eq!(rows[1][9], "PLACEHOLDER");
        assert_eq!(&rows[1][16..], &["5", "-1", "-1", "-1", "-1"]);
    }

    #[test]
    fn skipped_results_export_with_all_ranks_minus_one() {
        let rows = data_with_ranks(crate::results::SKIPPED).flat_rows(false);
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][16..], &["-1", "-1", "-1", "-1", "-1"]);
    }

    #[test]
    fn pairwise_csv_is_none_when_skipped() {
        assert!(data_with_ranks(crate::results::SKIPPED)
            .to_pairwise_csv()
            .is_none());
    }

    #[test]
    fn pairwise_csv_never_repeats_a_row() {
        let csv = tied_data("1,2,3").to_pairwise_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        let unique: IndexSet<&str> = lines.iter().copied().collect();
        assert_eq!(lines.len(), unique.len());
    }

    #[test]
    fn pairwise_csv_expands_ties_into_equal_rank_rows() {
        let csv = tied_data("1,2,3").to_pairwise_csv().unwrap();
        // Cross-group: (A,C) (B,C) (A,D) (B,D) (C,D); intra-tie: (A,B).
        assert_eq!(csv.lines().count(), 6);
        assert!(csv
            .lines()
            .any(|l| l.contains("sysA,1,sysB,1")));
    }

    #[test]
    fn apf_emits_all_slot_pair_triples() {
        let triples = data_with_ranks("1,2,3,4,5").to_apf().unwrap();
        // C(5,2) pairs, single-system slots.
        assert_eq!(triples.len(), 10);
        assert_eq!(triples[0], "alice,3.1.2,sysA<sysB");
        assert!(triples.contains(&"alice,3.4.5,sysD<sysE".to_string()));

        let tied = tied_data("1,1,2").to_apf().unwrap();
        // Slot pairs (1,2),(1,3),(2,3) with |A|x|B| = 2+2+1 systems.
        assert_eq!(tied.len(), 5);
        assert!(tied.contains(&"alice,9.1.2,sysA=sysC".to_string()));
        assert!(tied.contains(&"alice,9.2.3,sysC<sysD".to_string()));
    }

    #[test]
    fn apf_is_none_when_skipped() {
        assert!(data_with_ranks(crate::results::SKIPPED).to_apf().is_none());
    }

    #[test]
    fn hit_level_exports_cover_every_result() {
        let pool = crate::test::pool();
        let mut conn = pool.get().unwrap();
        let config = CampaignConfig {
            max_users_per_hit: 2,
            ..Default::default()
        };

        let scene = fixtures::campaign(&mut conn);
        let bob = fixtures::user(&mut conn, "bob");
        fixtures::join_project(&mut conn, &bob, &scene.project_id);

        let items = crate::hits::items_of_hit(&mut conn, &scene.hit_id);
        for item in &items {
            for user in [&scene.user_id, &bob] {
                crate::results::submit_result(
                    &mut conn,
                    item,
                    user,
                    Some(10),
                    "1,2,3,4,5",
                    &config,
                );
            }
        }

        let hit = crate::hits::load_hit(&mut conn, &scene.hit_id).unwrap();
        let apf = hit_to_apf(&mut conn, &hit);
        // 3 items x 2 judges x C(5,2).
        assert_eq!(apf.len(), 60);

        let xml = hit_to_xml(&mut conn, &hit);
        assert_eq!(xml.matches("<ranking-result").count(), 6);

        // Perfect agreement between the two judges.
        let scores = agreement_scores(&mut conn, &hit).unwrap();
        assert_eq!(scores.alpha, 1.0);
        assert_eq!(scores.kappa, 1.0);
        assert_eq!(scores.pi, 1.0);
        assert_eq!(scores.s, 1.0);
    }

    #[test]
    fn agreement_is_none_for_a_single_coder() {
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

        let hit = crate::hits::load_hit(&mut conn, &scene.hit_id).unwrap();
        assert!(agreement_scores(&mut conn, &hit).is_none());
    }
}
