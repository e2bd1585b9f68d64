//! Exports stored ranking results to stdout in one of the campaign
//! formats.

use clap::{Parser, ValueEnum};
use diesel::prelude::*;
use rankeval::export;
use rankeval::hits::Hit;
use rankeval::projects;
use rankeval::schema::{hits, hits_in_projects};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// WMT flat CSV, one row per block of five candidate slots.
    Flat,
    /// Pairwise system comparison CSV.
    Pairwise,
    /// Ranking result XML.
    Xml,
    /// Artstein & Poesio agreement triples.
    Apf,
    /// Per-HIT agreement scores as JSON.
    Agreement,
}

#[derive(Parser)]
pub struct ExportResults {
    #[clap(long, value_enum)]
    format: Format,
    /// Expand tied multi-system slots into one flat-CSV entry per
    /// constituent system.
    #[clap(long)]
    expand_multi_systems: bool,
    /// Restrict the export to HITs of this project (by name).
    #[clap(long)]
    project: Option<String>,
    #[clap(long)]
    database_url: Option<String>,
}

fn main() {
    tracing_subscriber::fmt().init();
    let args = ExportResults::parse();

    let db_url = if let Some(url) = args.database_url {
        url
    } else {
        std::env::var("DATABASE_URL").expect(
            "please either set `DATABASE_URL` or pass the `--database-url` flag",
        )
    };
    let mut conn = diesel::SqliteConnection::establish(&db_url).unwrap();

    let selected: Vec<Hit> = match args.project.as_deref() {
        Some(name) => {
            let project = projects::load_project_by_name(&mut conn, name)
                .unwrap_or_else(|| panic!("unknown project {name:?}"));
            hits::table
                .inner_join(
                    hits_in_projects::table
                        .on(hits_in_projects::hit_id.eq(hits::id)),
                )
                .filter(hits_in_projects::project_id.eq(project.id))
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
                .order_by(hits::id.asc())
                .load(&mut conn)
                .unwrap()
        }
        None => hits::table
            .order_by(hits::id.asc())
            .load(&mut conn)
            .unwrap(),
    };

    for hit in &selected {
        match args.format {
            Format::Xml => println!("{}", export::hit_to_xml(&mut conn, hit)),
            Format::Apf => {
                for line in export::hit_to_apf(&mut conn, hit) {
                    println!("{line}");
                }
            }
            Format::Agreement => {
                let scores = export::agreement_scores(&mut conn, hit);
                println!(
                    "{}",
                    serde_json::json!({
                        "hit": hit.id,
                        "scores": scores,
                    })
                );
            }
            Format::Flat | Format::Pairwise => {
                for item in rankeval::hits::items_of_hit(&mut conn, &hit.id) {
                    for result in
                        rankeval::results::results_of_item(&mut conn, &item.id)
                    {
                        let data = export::load_result(&mut conn, &result);
                        match args.format {
                            Format::Flat => print!(
                                "{}",
                                data.to_flat_csv(args.expand_multi_systems)
                            ),
                            Format::Pairwise => {
                                if let Some(csv) = data.to_pairwise_csv() {
                                    print!("{csv}");
                                }
                            }
                            _ => unreachable!(),
                        }
                    }
                }
            }
        }
    }
}
